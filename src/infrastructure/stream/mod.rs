mod live_channel;

pub use live_channel::*;
