//! Common test infrastructure
//!
//! Wires the real SQLite stores, the local job engine, the filesystem dataset
//! adapter and the in-memory cache into one isolated harness per test.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestHarness, ORG_SLUG, DS_SLUG};
//!
//! #[tokio::test(flavor = "multi_thread")]
//! async fn test_something() {
//!     let harness = TestHarness::start();
//!     let (internal_ref, ddb) = harness.create_dataset(ORG_SLUG, DS_SLUG);
//! }
//! ```

mod constants;
mod harness;
mod jobs;

// Public API - this is what tests import
pub use constants::*;
pub use harness::TestHarness;
#[allow(unused_imports)]
pub use jobs::{BlockingJob, Gate, QuickJob};
