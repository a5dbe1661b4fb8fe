use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::AgentUpdate;

/// Frames pushed by the server on a session's stream. A `history` frame is
/// sent once after connecting, `agent_update` frames follow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    History {
        #[serde(default)]
        updates: Vec<AgentUpdate>,
    },
    AgentUpdate {
        update: AgentUpdate,
    },
    #[serde(other)]
    Unknown,
}
