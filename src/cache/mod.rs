//! Seeded read-through byte cache.

mod in_memory;

pub use in_memory::InMemoryCacheManager;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Produces the value for a key that is not cached yet.
pub type CacheFactory = Arc<dyn Fn(&str) -> Result<Vec<u8>> + Send + Sync>;

pub trait CacheManager: Send + Sync {
    /// Cached bytes for `key`, generating and storing them through the seed's
    /// factory on a miss. Fails for unregistered seeds.
    fn get(&self, seed: &str, key: &str) -> Result<Vec<u8>>;

    /// Store bytes with the seed's expiration. Fails for unregistered seeds.
    fn set(&self, seed: &str, key: &str, data: Vec<u8>) -> Result<()>;

    fn remove(&self, seed: &str, key: &str) -> Result<()>;

    fn is_registered(&self, seed: &str) -> bool;

    /// Register a seed. Registering the same seed twice fails.
    fn register(&self, seed: &str, factory: CacheFactory, expiration: Duration) -> Result<()>;
}
