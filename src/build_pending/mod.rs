//! Periodic scan that enqueues builds for datasets with pending files.

mod cache_state;
mod service;

pub use cache_state::{CacheState, CacheStateError, CACHE_STATE_VERSION};
pub use service::{
    BuildPendingService, BuildPendingStatus, ProcessingStats, AUTO_BUILD_USER_ID,
    BUILD_PENDING_CACHE_SEED,
};
