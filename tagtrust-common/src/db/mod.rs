//! Database schema, connection setup and lock-retry helpers

pub mod init;
pub mod retry;

pub use init::*;
pub use retry::retry_on_lock;
