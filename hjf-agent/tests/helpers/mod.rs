//! Test helper utilities
//!
//! Temp databases plus in-memory fakes for the browser, the oracle and the
//! source connectors.

#![allow(dead_code)]

pub mod db_utils;
pub mod fakes;

pub use db_utils::{create_test_db, insert_job_with_status, sample_posting, seed_profile};
pub use fakes::{
    candidate, hours_ago, test_source, ConnectorPlan, FakeFactory, FakeLauncher, FakePage, PageScript,
    ScriptedOracle, StaticDetector,
};
