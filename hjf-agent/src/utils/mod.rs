//! Utility modules for the agent

pub mod db_retry;
pub mod text;

pub use db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
