mod auth_store;
mod live_updates;
mod reconciler;
mod session_view;

pub use auth_store::*;
pub use live_updates::*;
pub use reconciler::*;
pub use session_view::*;
