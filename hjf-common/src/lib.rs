//! # Job Filer Common Library
//!
//! Shared code for the job filer crates:
//! - Error type (`Error`, `Result`)
//! - Event taxonomy and `EventBus`
//! - Config file discovery and data folder resolution

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
