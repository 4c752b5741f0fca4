#[cfg(feature = "bench")]
pub mod bench;
pub mod bus;
pub mod db;
pub mod handlers;
pub mod retry;
pub mod types;
