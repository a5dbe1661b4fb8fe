#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;

use std::collections::BTreeMap;
use std::collections::HashSet;

use crate::domain::models::AgentName;
use crate::domain::models::AgentUpdate;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentActivity {
    pub count: usize,
    pub last_action: Option<String>,
}

pub type AgentSummary = BTreeMap<AgentName, AgentActivity>;

/// Combines a session snapshot's updates with the live buffer.
///
/// Without a snapshot the live buffer is returned as-is. Otherwise every
/// historical update comes first, followed by live updates whose timestamp is
/// not already in the history, each side keeping its own order. Two distinct
/// updates that share a timestamp collapse into the historical one.
pub fn merge_updates(history: Option<&[AgentUpdate]>, live: &[AgentUpdate]) -> Vec<AgentUpdate> {
    let history = match history {
        Some(history) => history,
        None => return live.to_vec(),
    };

    let seen = history
        .iter()
        .map(|update| return update.timestamp.as_str())
        .collect::<HashSet<&str>>();

    let mut merged = history.to_vec();
    merged.extend(
        live.iter()
            .filter(|update| return !seen.contains(update.timestamp.as_str()))
            .cloned(),
    );

    return merged;
}

/// Tallies updates per agent. `last_action` follows sequence order, not the
/// timestamps themselves.
pub fn summarize(updates: &[AgentUpdate]) -> AgentSummary {
    let mut summary = AgentSummary::new();
    for update in updates {
        let activity = summary.entry(update.agent).or_default();
        activity.count += 1;
        activity.last_action = Some(update.action.to_string());
    }

    return summary;
}
