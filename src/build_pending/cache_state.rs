use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CACHE_STATE_VERSION: u32 = 1;

/// Per-dataset record of the last pending probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheState {
    pub version: u32,
    pub has_pending: bool,
    pub last_check: DateTime<Utc>,
    pub stamp_checksum: Option<String>,
}

#[derive(Debug, Error)]
pub enum CacheStateError {
    #[error("cache entry is empty")]
    Empty,
    #[error("cache entry is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported cache entry version {0}")]
    UnsupportedVersion(u32),
}

impl CacheState {
    pub fn new(has_pending: bool, last_check: DateTime<Utc>, stamp_checksum: Option<String>) -> Self {
        Self {
            version: CACHE_STATE_VERSION,
            has_pending,
            last_check,
            stamp_checksum,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheStateError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheStateError> {
        if bytes.is_empty() {
            return Err(CacheStateError::Empty);
        }
        let state: CacheState = serde_json::from_slice(bytes)?;
        if state.version != CACHE_STATE_VERSION {
            return Err(CacheStateError::UnsupportedVersion(state.version));
        }
        Ok(state)
    }
}
