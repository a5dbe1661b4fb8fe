use super::ResearchSession;
use super::StreamMessage;

/// Everything that can change a watched session's view, funnelled through a
/// single channel so state transitions happen in one place.
#[derive(Debug)]
pub enum Event {
    SessionSnapshot(ResearchSession),
    PollFailed(String),
    StreamConnected(),
    StreamDisconnected(),
    Stream(StreamMessage),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Navigation {
    SignIn,
}
