use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mockito::Matcher;
use serde_json::json;
use test_utils::user_fixture;
use tokio::sync::mpsc;

use super::resolve_session;
use super::PlanDecision;
use super::WatchOptions;
use super::WatchOutcome;
use super::Watcher;
use crate::domain::models::AgentName;
use crate::domain::models::AgentUpdate;
use crate::domain::models::Event;
use crate::domain::models::Navigation;
use crate::domain::models::Plan;
use crate::domain::models::ResearchSession;
use crate::domain::models::SessionStatus;
use crate::domain::models::StreamMessage;
use crate::domain::models::TOKEN_KEY;
use crate::domain::models::USER_KEY;
use crate::domain::services::AuthStore;
use crate::infrastructure::api::ApiClient;
use crate::infrastructure::storage::MemoryStorage;

fn api(url: &str) -> Arc<ApiClient> {
    let storage =
        MemoryStorage::with_entries(&[(TOKEN_KEY, "token123"), (USER_KEY, user_fixture())]);
    let store = AuthStore::new(Box::new(storage));
    store.init();
    return Arc::new(ApiClient::new(url, Arc::new(store)));
}

fn options(follow: bool) -> WatchOptions {
    return WatchOptions {
        interactive: false,
        follow,
        plan_decision: None,
        poll_interval: Duration::from_millis(50),
        viewer_url: "https://docs.google.com/viewer".to_string(),
    };
}

fn session(status: SessionStatus) -> ResearchSession {
    return ResearchSession {
        id: "s-1".to_string(),
        topic: "Quantum computing in cryptography".to_string(),
        status,
        ..Default::default()
    };
}

fn awaiting_session() -> ResearchSession {
    let mut awaiting = session(SessionStatus::AwaitingApproval);
    awaiting.plan = Some(Plan {
        sections: vec!["Introduction".to_string()],
        ..Default::default()
    });
    return awaiting;
}

fn session_body(status: &str) -> String {
    return format!(
        r#"{{"_id": "s-1", "topic": "Quantum computing in cryptography", "status": "{status}", "agent_updates": []}}"#
    );
}

mod resolve {
    use super::*;

    #[tokio::test]
    async fn it_rejects_missing_ids_without_a_request() {
        let api = api("http://127.0.0.1:9");

        for id in ["", "  ", "undefined"] {
            let err = resolve_session(&api, id).await.unwrap_err();
            assert_eq!(err.to_string(), "Session not found");
        }
    }

    #[tokio::test]
    async fn it_maps_a_404_to_session_not_found() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/research/session/gone")
            .with_status(404)
            .with_body(r#"{"detail": "Session not found"}"#)
            .create_async()
            .await;

        let err = resolve_session(&api(&server.url()), "gone").await.unwrap_err();
        assert_eq!(err.to_string(), "Session not found");

        return Ok(());
    }
}

mod events {
    use super::*;

    #[tokio::test]
    async fn it_tracks_stream_and_connection_events() -> Result<()> {
        let mut watcher = Watcher::new(api("http://127.0.0.1:9"), "s-1", options(false));

        assert_eq!(watcher.handle_event(Event::StreamConnected()).await?, None);
        watcher
            .handle_event(Event::Stream(StreamMessage::History {
                updates: vec![AgentUpdate::new(AgentName::Manager, "plan", "t1")],
            }))
            .await?;
        watcher
            .handle_event(Event::Stream(StreamMessage::AgentUpdate {
                update: AgentUpdate::new(AgentName::Researcher, "search", "t2"),
            }))
            .await?;

        assert!(watcher.view().connected());
        assert_eq!(watcher.view().updates().len(), 2);

        watcher.handle_event(Event::StreamDisconnected()).await?;
        assert!(!watcher.view().connected());

        return Ok(());
    }

    #[tokio::test]
    async fn it_finishes_when_the_report_becomes_ready() -> Result<()> {
        let mut watcher = Watcher::new(api("http://127.0.0.1:9"), "s-1", options(false));

        let first = watcher
            .handle_event(Event::SessionSnapshot(session(SessionStatus::Researching)))
            .await?;
        assert_eq!(first, None);

        watcher
            .handle_event(Event::PollFailed("connection refused".to_string()))
            .await?;
        assert_eq!(
            watcher.view().status(),
            Some(SessionStatus::Researching)
        );

        let done = watcher
            .handle_event(Event::SessionSnapshot(session(SessionStatus::Completed)))
            .await?;
        assert_eq!(done, Some(WatchOutcome::Completed));

        return Ok(());
    }

    #[tokio::test]
    async fn it_keeps_following_after_completion() -> Result<()> {
        let mut watcher = Watcher::new(api("http://127.0.0.1:9"), "s-1", options(true));

        watcher
            .handle_event(Event::SessionSnapshot(session(SessionStatus::Writing)))
            .await?;
        let done = watcher
            .handle_event(Event::SessionSnapshot(session(SessionStatus::Completed)))
            .await?;

        assert_eq!(done, None);

        return Ok(());
    }

    #[tokio::test]
    async fn it_stops_on_failure() -> Result<()> {
        let mut watcher = Watcher::new(api("http://127.0.0.1:9"), "s-1", options(true));

        let res = watcher
            .handle_event(Event::SessionSnapshot(session(SessionStatus::Failed)))
            .await?;

        assert_eq!(res, Some(WatchOutcome::Failed));

        return Ok(());
    }

    #[tokio::test]
    async fn it_leaves_a_pending_plan_alone_without_input() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let approve_mock = server
            .mock("POST", "/api/research/approve")
            .expect(0)
            .create_async()
            .await;

        let mut watcher = Watcher::new(api(&server.url()), "s-1", options(false));

        let res = watcher
            .handle_event(Event::SessionSnapshot(awaiting_session()))
            .await?;

        assert_eq!(res, None);
        approve_mock.assert_async().await;

        return Ok(());
    }

    #[tokio::test]
    async fn it_approves_a_plan_and_refetches_the_session() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let approve_mock = server
            .mock("POST", "/api/research/approve")
            .match_body(Matcher::Json(json!({
                "session_id": "s-1",
                "approved": true,
                "modifications": null
            })))
            .with_status(200)
            .with_body(r#"{"message": "Plan approved"}"#)
            .create_async()
            .await;
        let session_mock = server
            .mock("GET", "/api/research/session/s-1")
            .with_status(200)
            .with_body(session_body("researching"))
            .expect(1)
            .create_async()
            .await;

        let mut opts = options(false);
        opts.plan_decision = Some(PlanDecision::Approve);
        let mut watcher = Watcher::new(api(&server.url()), "s-1", opts);

        let res = watcher
            .handle_event(Event::SessionSnapshot(awaiting_session()))
            .await?;

        assert_eq!(res, None);
        assert_eq!(watcher.view().status(), Some(SessionStatus::Researching));
        approve_mock.assert_async().await;
        session_mock.assert_async().await;

        return Ok(());
    }

    #[tokio::test]
    async fn it_stops_after_rejecting_a_plan() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let approve_mock = server
            .mock("POST", "/api/research/approve")
            .match_body(Matcher::Json(json!({
                "session_id": "s-1",
                "approved": false,
                "modifications": null
            })))
            .with_status(200)
            .with_body(r#"{"message": "Plan rejected"}"#)
            .create_async()
            .await;
        let session_mock = server
            .mock("GET", "/api/research/session/s-1")
            .expect(0)
            .create_async()
            .await;

        let mut opts = options(false);
        opts.plan_decision = Some(PlanDecision::Reject);
        let mut watcher = Watcher::new(api(&server.url()), "s-1", opts);

        let res = watcher
            .handle_event(Event::SessionSnapshot(awaiting_session()))
            .await?;

        assert_eq!(res, Some(WatchOutcome::Rejected));
        approve_mock.assert_async().await;
        session_mock.assert_async().await;

        return Ok(());
    }

    #[tokio::test]
    async fn it_stops_when_the_plan_prompt_is_interrupted() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let approve_mock = server
            .mock("POST", "/api/research/approve")
            .expect(0)
            .create_async()
            .await;

        let mut opts = options(false);
        opts.plan_decision = Some(PlanDecision::Interrupted);
        let mut watcher = Watcher::new(api(&server.url()), "s-1", opts);

        let res = watcher
            .handle_event(Event::SessionSnapshot(awaiting_session()))
            .await?;

        assert_eq!(res, Some(WatchOutcome::Interrupted));
        approve_mock.assert_async().await;

        return Ok(());
    }

    #[test]
    fn it_follows_new_activity_with_agent_counts() {
        let mut watcher = Watcher::new(api("http://127.0.0.1:9"), "s-1", options(false));
        watcher.view.apply_stream(StreamMessage::History {
            updates: vec![
                AgentUpdate::new(AgentName::Manager, "plan", "t1"),
                AgentUpdate::new(AgentName::Researcher, "search", "t2"),
            ],
        });

        let lines = watcher.unseen_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("Manager: 1 | Researcher: 1 | Writer: 0 | Critique: 0"));

        assert!(watcher.unseen_lines().is_empty());
    }
}

mod run {
    use super::*;

    #[tokio::test]
    async fn it_returns_at_once_for_a_finished_session() -> Result<()> {
        let (_nav_tx, nav_rx) = mpsc::unbounded_channel::<Navigation>();
        let watcher = Watcher::new(api("http://127.0.0.1:9"), "s-1", options(false));

        let outcome = watcher
            .run(session(SessionStatus::Completed), nav_rx)
            .await?;

        assert_eq!(outcome, WatchOutcome::Completed);

        return Ok(());
    }

    #[tokio::test]
    async fn it_polls_until_completion() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let poll_mock = server
            .mock("GET", "/api/research/session/s-1")
            .with_status(200)
            .with_body(session_body("completed"))
            .expect_at_least(1)
            .create_async()
            .await;

        let (_nav_tx, nav_rx) = mpsc::unbounded_channel::<Navigation>();
        let watcher = Watcher::new(api(&server.url()), "s-1", options(false));

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            watcher.run(session(SessionStatus::Researching), nav_rx),
        )
        .await??;

        assert_eq!(outcome, WatchOutcome::Completed);
        poll_mock.assert_async().await;

        return Ok(());
    }

    #[tokio::test]
    async fn it_keeps_polling_with_a_zero_interval() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/research/session/s-1")
            .with_status(200)
            .with_body(session_body("completed"))
            .create_async()
            .await;

        let (_nav_tx, nav_rx) = mpsc::unbounded_channel::<Navigation>();
        let mut opts = options(false);
        opts.poll_interval = Duration::ZERO;
        let watcher = Watcher::new(api(&server.url()), "s-1", opts);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            watcher.run(session(SessionStatus::Researching), nav_rx),
        )
        .await??;

        assert_eq!(outcome, WatchOutcome::Completed);

        return Ok(());
    }

    #[tokio::test]
    async fn it_stops_when_sign_in_is_required() -> Result<()> {
        let (nav_tx, nav_rx) = mpsc::unbounded_channel::<Navigation>();
        let mut opts = options(false);
        opts.poll_interval = Duration::from_secs(60);
        let watcher = Watcher::new(api("http://127.0.0.1:9"), "s-1", opts);

        nav_tx.send(Navigation::SignIn)?;
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            watcher.run(session(SessionStatus::Researching), nav_rx),
        )
        .await??;

        assert_eq!(outcome, WatchOutcome::SignedOut);

        return Ok(());
    }
}
