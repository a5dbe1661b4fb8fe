use serde_derive::Deserialize;
use serde_derive::Serialize;
use strum::EnumIter;

use super::AgentUpdate;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Planning,
    AwaitingApproval,
    Researching,
    Writing,
    Reviewing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        return matches!(self, SessionStatus::Completed | SessionStatus::Failed);
    }
}

impl Default for SessionStatus {
    fn default() -> SessionStatus {
        return SessionStatus::Pending;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub research_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_sources: Option<u64>,
}

/// Server-side snapshot of a research session. The client never edits one in
/// place; each fetch replaces the previous snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchSession {
    #[serde(alias = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub topic: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub plan_approved: bool,
    #[serde(default)]
    pub agent_updates: Vec<AgentUpdate>,
    #[serde(default)]
    pub cloudinary_url: Option<String>,
    #[serde(default)]
    pub final_report_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl ResearchSession {
    /// A plan is pending when the session is paused on it and nobody has
    /// approved it yet.
    pub fn pending_plan(&self) -> Option<&Plan> {
        if self.status != SessionStatus::AwaitingApproval || self.plan_approved {
            return None;
        }

        return self.plan.as_ref();
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResearchRequest {
    pub topic: String,
    pub user_id: String,
    pub constraints: Option<String>,
    pub scope: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResearchResponse {
    pub session_id: String,
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub session_id: String,
    pub approved: bool,
    pub modifications: Option<String>,
}
