//! Test jobs with controllable execution

#![allow(dead_code)]

use dataset_registry_jobs::background_jobs::{BackgroundJob, JobContext, JobError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Latch released by the test to let a [`BlockingJob`] finish.
#[derive(Clone, Default)]
pub struct Gate {
    open: Arc<AtomicBool>,
    entered: Arc<AtomicUsize>,
}

impl Gate {
    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of attempts that started executing.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

/// Holds its worker until the gate opens, or 30 seconds pass.
pub struct BlockingJob {
    gate: Gate,
}

impl BlockingJob {
    pub fn new(gate: Gate) -> Self {
        Self { gate }
    }
}

impl BackgroundJob for BlockingJob {
    fn name(&self) -> String {
        "Blocking test job".to_string()
    }

    fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        self.gate.entered.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(30);
        while !self.gate.is_open() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }
}

/// Completes immediately.
pub struct QuickJob {
    name: String,
}

impl QuickJob {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl BackgroundJob for QuickJob {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}
