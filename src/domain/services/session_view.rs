#[cfg(test)]
#[path = "session_view_test.rs"]
mod tests;

use std::collections::HashSet;

use super::merge_updates;
use super::summarize;
use super::AgentSummary;
use super::LiveUpdates;
use crate::domain::models::AgentUpdate;
use crate::domain::models::Plan;
use crate::domain::models::ResearchSession;
use crate::domain::models::SessionStatus;
use crate::domain::models::StreamMessage;

/// One-time prompts raised by a status change.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    DownloadReady,
    PlanAwaitingApproval(Plan),
    Failed,
}

/// State behind a session dashboard: the latest polled snapshot, the live
/// buffer, and the merged sequence derived from both.
#[derive(Debug, Default)]
pub struct SessionView {
    session: Option<ResearchSession>,
    live: LiveUpdates,
    merged: Vec<AgentUpdate>,
    summary: AgentSummary,
    last_status: Option<SessionStatus>,
    plan_notified: bool,
    download_notified: bool,
    emitted: HashSet<String>,
}

impl SessionView {
    pub fn new() -> SessionView {
        return SessionView::default();
    }

    fn recompute(&mut self) {
        let history = self
            .session
            .as_ref()
            .map(|session| return session.agent_updates.as_slice());
        self.merged = merge_updates(history, self.live.updates());
        self.summary = summarize(&self.merged);
    }

    fn notices_for(&mut self, session: &ResearchSession) -> Vec<Notice> {
        let mut notices = vec![];
        let previous = self.last_status;

        if session.status == SessionStatus::Completed
            && !self.download_notified
            && matches!(previous, Some(status) if status != SessionStatus::Completed)
        {
            self.download_notified = true;
            notices.push(Notice::DownloadReady);
        }

        match session.pending_plan() {
            Some(plan) if !self.plan_notified => {
                self.plan_notified = true;
                notices.push(Notice::PlanAwaitingApproval(plan.clone()));
            }
            Some(_) => {}
            None => self.plan_notified = false,
        }

        if session.status == SessionStatus::Failed && previous != Some(SessionStatus::Failed) {
            notices.push(Notice::Failed);
        }

        self.last_status = Some(session.status);
        return notices;
    }

    /// Replaces the snapshot wholesale and returns the notices this
    /// transition raised.
    pub fn apply_snapshot(&mut self, session: ResearchSession) -> Vec<Notice> {
        let notices = self.notices_for(&session);
        tracing::debug!(
            session_id = %session.id,
            status = %session.status,
            updates = session.agent_updates.len(),
            "Applied session snapshot"
        );

        self.session = Some(session);
        self.recompute();
        return notices;
    }

    pub fn apply_stream(&mut self, message: StreamMessage) {
        if self.live.apply(message) {
            self.recompute();
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.live.set_connected(connected);
    }

    /// The previous snapshot stays in place.
    pub fn poll_failed(&self, error: &str) {
        tracing::error!(error, "Failed to refresh session");
    }

    /// Merged updates that have not been handed out yet, in merged order.
    pub fn take_unseen(&mut self) -> Vec<AgentUpdate> {
        let mut unseen = vec![];
        for update in &self.merged {
            if self.emitted.insert(update.timestamp.to_string()) {
                unseen.push(update.clone());
            }
        }

        return unseen;
    }

    pub fn session(&self) -> Option<&ResearchSession> {
        return self.session.as_ref();
    }

    pub fn status(&self) -> Option<SessionStatus> {
        return self.last_status;
    }

    pub fn updates(&self) -> &[AgentUpdate] {
        return &self.merged;
    }

    pub fn summary(&self) -> &AgentSummary {
        return &self.summary;
    }

    pub fn connected(&self) -> bool {
        return self.live.connected();
    }
}
