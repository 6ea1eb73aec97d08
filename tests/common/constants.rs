//! Shared test constants

#![allow(dead_code)]

use std::time::Duration;

pub const ORG_SLUG: &str = "acme";
pub const DS_SLUG: &str = "survey";
pub const OTHER_DS_SLUG: &str = "census";

/// Upper bound when waiting for the engine to reach a state.
pub const STATE_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENGINE_WORKERS: usize = 2;
