pub mod api;
pub mod storage;
pub mod stream;
