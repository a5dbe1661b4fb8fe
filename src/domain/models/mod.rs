mod agent_update;
mod auth_api;
mod event;
mod research;
mod storage;
mod stream;
mod user;

pub use agent_update::*;
pub use auth_api::*;
pub use event::*;
pub use research::*;
pub use storage::*;
pub use stream::*;
pub use user::*;
