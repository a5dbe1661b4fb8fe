use crate::domain::models::AgentUpdate;
use crate::domain::models::StreamMessage;

/// Buffer fed by a session's live channel.
#[derive(Clone, Debug, Default)]
pub struct LiveUpdates {
    updates: Vec<AgentUpdate>,
    connected: bool,
}

impl LiveUpdates {
    /// A history frame replaces the buffer, an update frame appends to it.
    /// Returns whether the buffer changed.
    pub fn apply(&mut self, message: StreamMessage) -> bool {
        match message {
            StreamMessage::History { updates } => {
                self.updates = updates;
                return true;
            }
            StreamMessage::AgentUpdate { update } => {
                self.updates.push(update);
                return true;
            }
            StreamMessage::Unknown => return false,
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn connected(&self) -> bool {
        return self.connected;
    }

    pub fn updates(&self) -> &[AgentUpdate] {
        return &self.updates;
    }
}
