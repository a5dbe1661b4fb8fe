#[cfg(test)]
#[path = "watch_test.rs"]
mod tests;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Result;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use tokio::sync::mpsc;
use tokio::task;
use tokio::task::JoinHandle;
use yansi::Paint;

use super::render;
use crate::domain::models::Event;
use crate::domain::models::Navigation;
use crate::domain::models::Plan;
use crate::domain::models::ResearchSession;
use crate::domain::models::SessionStatus;
use crate::domain::services::Notice;
use crate::domain::services::SessionView;
use crate::infrastructure::api::ApiClient;
use crate::infrastructure::stream::LiveChannel;

#[derive(Clone, Debug)]
pub struct WatchOptions {
    pub interactive: bool,
    pub follow: bool,
    /// Answers a pending plan without prompting.
    pub plan_decision: Option<PlanDecision>,
    pub poll_interval: Duration,
    pub viewer_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchOutcome {
    Completed,
    Failed,
    Interrupted,
    Rejected,
    SignedOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanDecision {
    Approve,
    Reject,
    Skip,
    Interrupted,
}

/// Fetches a session, mapping a missing one to the message shown instead of
/// the dashboard.
pub async fn resolve_session(api: &ApiClient, session_id: &str) -> Result<ResearchSession> {
    let session_id = session_id.trim();
    if session_id.is_empty() || session_id == "undefined" {
        bail!("Session not found");
    }

    match api.get_session(session_id).await {
        Ok(session) => return Ok(session),
        Err(err) if err.is_not_found() => bail!("Session not found"),
        Err(err) => return Err(err.into()),
    }
}

fn spawn_poller(
    api: Arc<ApiClient>,
    session_id: String,
    period: Duration,
    tx: mpsc::UnboundedSender<Event>,
) -> JoinHandle<()> {
    return tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately and the caller already holds a
        // fresh snapshot.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let event = match api.get_session(&session_id).await {
                Ok(session) => Event::SessionSnapshot(session),
                Err(err) => Event::PollFailed(err.to_string()),
            };

            if tx.send(event).is_err() {
                return;
            }
        }
    });
}

async fn prompt_plan() -> Result<PlanDecision> {
    let choice = task::spawn_blocking(|| {
        return Select::with_theme(&ColorfulTheme::default())
            .with_prompt("How would you like to proceed?")
            .default(0)
            .items(&["Approve & Continue", "Reject"])
            .interact_opt();
    })
    .await?;

    match choice {
        Ok(Some(0)) => return Ok(PlanDecision::Approve),
        Ok(Some(_)) => return Ok(PlanDecision::Reject),
        Ok(None) => return Ok(PlanDecision::Skip),
        Err(dialoguer::Error::IO(err)) if err.kind() == io::ErrorKind::Interrupted => {
            return Ok(PlanDecision::Interrupted);
        }
        Err(err) => return Err(err.into()),
    }
}

/// Drives a single session's dashboard. Owns the view and turns events and
/// notices into terminal output.
pub struct Watcher {
    api: Arc<ApiClient>,
    session_id: String,
    opts: WatchOptions,
    view: SessionView,
}

impl Watcher {
    pub fn new(api: Arc<ApiClient>, session_id: &str, opts: WatchOptions) -> Watcher {
        return Watcher {
            api,
            session_id: session_id.to_string(),
            opts,
            view: SessionView::new(),
        };
    }

    pub fn view(&self) -> &SessionView {
        return &self.view;
    }

    /// Renders updates not shown yet, followed by the per-agent counts when
    /// anything new arrived.
    fn unseen_lines(&mut self) -> Vec<String> {
        let mut lines = self
            .view
            .take_unseen()
            .iter()
            .map(|update| return format!("{}\n", render::activity_card(update)))
            .collect::<Vec<String>>();

        if !lines.is_empty() {
            lines.push(format!(
                "{}\n",
                Paint::new(render::agent_summary_line(self.view.summary())).dimmed()
            ));
        }

        return lines;
    }

    fn print_unseen(&mut self) {
        for line in self.unseen_lines() {
            println!("{line}");
        }
    }

    async fn decide(&self, plan: &Plan) -> Result<PlanDecision> {
        println!("{}\n", Paint::yellow(render::plan_panel(plan)));

        if let Some(decision) = self.opts.plan_decision {
            return Ok(decision);
        }

        if !self.opts.interactive {
            println!(
                "Run `quill research approve {id}` or `quill research reject {id}` to continue.\n",
                id = self.session_id
            );
            return Ok(PlanDecision::Skip);
        }

        return prompt_plan().await;
    }

    async fn handle_plan(&mut self, plan: Plan) -> Result<Option<WatchOutcome>> {
        let approved = match self.decide(&plan).await? {
            PlanDecision::Skip => return Ok(None),
            PlanDecision::Interrupted => return Ok(Some(WatchOutcome::Interrupted)),
            PlanDecision::Approve => true,
            PlanDecision::Reject => false,
        };

        if let Err(err) = self
            .api
            .approve_plan(&self.session_id, approved, None)
            .await
        {
            tracing::error!(error = ?err, approved, "Failed to submit plan decision");
            eprintln!("{}", Paint::red(format!("Failed to submit decision: {err}")));
            if err.is_unauthorized() {
                return Ok(Some(WatchOutcome::SignedOut));
            }
            return Ok(None);
        }

        if !approved {
            println!("Plan rejected. You can start a new research session.");
            return Ok(Some(WatchOutcome::Rejected));
        }

        println!("{}\n", Paint::green("Plan approved. Research is continuing."));
        return Ok(None);
    }

    /// Applies a snapshot and reacts to whatever notices it raised.
    pub async fn apply_snapshot(&mut self, session: ResearchSession) -> Result<Option<WatchOutcome>> {
        let mut pending = self.view.apply_snapshot(session);
        self.print_unseen();

        while !pending.is_empty() {
            let notice = pending.remove(0);
            match notice {
                Notice::PlanAwaitingApproval(plan) => {
                    let outcome = self.handle_plan(plan).await?;
                    if outcome.is_some() {
                        return Ok(outcome);
                    }

                    // Approval only shows up on the next snapshot, so fetch it
                    // now rather than waiting on the poller.
                    match self.api.get_session(&self.session_id).await {
                        Ok(session) => {
                            pending.extend(self.view.apply_snapshot(session));
                            self.print_unseen();
                        }
                        Err(err) => self.view.poll_failed(&err.to_string()),
                    }
                }
                Notice::DownloadReady => {
                    if let Some(session) = self.view.session() {
                        let url = self.api.report_url(session, &self.opts.viewer_url);
                        println!("{}\n", Paint::green(render::download_notice(session, &url)));
                    }
                    if !self.opts.follow {
                        return Ok(Some(WatchOutcome::Completed));
                    }
                }
                Notice::Failed => {
                    eprintln!("{}", Paint::red("Research failed."));
                    return Ok(Some(WatchOutcome::Failed));
                }
            }
        }

        return Ok(None);
    }

    pub async fn handle_event(&mut self, event: Event) -> Result<Option<WatchOutcome>> {
        match event {
            Event::SessionSnapshot(session) => return self.apply_snapshot(session).await,
            Event::PollFailed(err) => {
                self.view.poll_failed(&err);
            }
            Event::StreamConnected() => {
                self.view.set_connected(true);
                println!("{}", Paint::new("Live updates connected").dimmed());
            }
            Event::StreamDisconnected() => {
                self.view.set_connected(false);
                println!(
                    "{}",
                    Paint::new("Live updates disconnected, continuing with polling").dimmed()
                );
            }
            Event::Stream(message) => {
                self.view.apply_stream(message);
                self.print_unseen();
            }
        }

        return Ok(None);
    }

    fn print_header(&self, session: &ResearchSession) {
        println!(
            "{} {}",
            Paint::new(&session.topic).bold(),
            render::paint_status(session.status)
        );
        println!("{}\n", Paint::new(format!("ID: {}", session.id)).dimmed());
    }

    /// Watches until the session finishes, the user stops it, or the stored
    /// sign-in is rejected. Polling and the live channel run side by side and
    /// are both torn down on exit.
    pub async fn run(
        mut self,
        initial: ResearchSession,
        mut navigation: mpsc::UnboundedReceiver<Navigation>,
    ) -> Result<WatchOutcome> {
        self.print_header(&initial);

        let already_completed = initial.status == SessionStatus::Completed;
        if let Some(outcome) = self.apply_snapshot(initial).await? {
            return Ok(outcome);
        }
        if already_completed && !self.opts.follow {
            if let Some(session) = self.view.session() {
                let url = self.api.report_url(session, &self.opts.viewer_url);
                println!("{}\n", Paint::green(render::download_notice(session, &url)));
            }
            return Ok(WatchOutcome::Completed);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let poller = spawn_poller(
            self.api.clone(),
            self.session_id.to_string(),
            self.opts.poll_interval,
            tx.clone(),
        );
        let channel = LiveChannel::open(&self.api.stream_url(&self.session_id), tx);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let res = loop {
            tokio::select! {
                _ = &mut ctrl_c => break Ok(WatchOutcome::Interrupted),
                Some(Navigation::SignIn) = navigation.recv() => break Ok(WatchOutcome::SignedOut),
                event = rx.recv() => {
                    let event = match event {
                        Some(event) => event,
                        None => break Err(anyhow!("Lost both session polling and live updates")),
                    };
                    match self.handle_event(event).await {
                        Ok(Some(outcome)) => break Ok(outcome),
                        Ok(None) => {}
                        Err(err) => break Err(err),
                    }
                }
            }
        };

        poller.abort();
        channel.shutdown().await;

        tracing::debug!(session_id = %self.session_id, outcome = ?res.as_ref().ok(), "Stopped watching session");
        return res;
    }
}
