#[cfg(test)]
#[path = "agent_update_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use strum::EnumIter;

use super::Plan;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentName {
    Manager,
    Researcher,
    Writer,
    Critique,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// Loosely structured payload attached to an update. Only used for display,
/// so every field is optional and unknown keys are retained in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_sources: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_issues: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub agent: AgentName,
    pub action: String,
    #[serde(default)]
    pub details: UpdateDetails,
    /// Raw server timestamp. Doubles as the update's identity when merging
    /// history with the live stream, so it is compared as a string.
    pub timestamp: String,
}

impl AgentUpdate {
    pub fn new(agent: AgentName, action: &str, timestamp: &str) -> AgentUpdate {
        return AgentUpdate {
            agent,
            action: action.to_string(),
            details: UpdateDetails::default(),
            timestamp: timestamp.to_string(),
        };
    }
}
