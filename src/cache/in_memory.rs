use super::{CacheFactory, CacheManager};
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

struct Provider {
    factory: CacheFactory,
    expiration: Duration,
}

struct Entry {
    data: Vec<u8>,
    expires_at: Instant,
}

/// Process-local cache. Expiration is sliding: every hit extends the entry.
#[derive(Default)]
pub struct InMemoryCacheManager {
    providers: RwLock<HashMap<String, Provider>>,
    entries: Mutex<HashMap<String, Entry>>,
}

fn make_key(seed: &str, key: &str) -> String {
    format!(":{}:{}", seed, key)
}

impl InMemoryCacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("Cache entry table lock poisoned"))
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    fn provider(&self, seed: &str) -> Result<(CacheFactory, Duration)> {
        let providers = self
            .providers
            .read()
            .map_err(|_| anyhow!("Cache provider table lock poisoned"))?;
        match providers.get(seed) {
            Some(p) => Ok((p.factory.clone(), p.expiration)),
            None => bail!("No provider registered for seed: {}", seed),
        }
    }
}

impl CacheManager for InMemoryCacheManager {
    fn get(&self, seed: &str, key: &str) -> Result<Vec<u8>> {
        let (factory, expiration) = self.provider(seed)?;
        let full_key = make_key(seed, key);
        let now = Instant::now();

        {
            let mut entries = self.entries()?;
            match entries.get_mut(&full_key) {
                Some(entry) if entry.expires_at > now => {
                    entry.expires_at = now + expiration;
                    return Ok(entry.data.clone());
                }
                Some(_) => {
                    entries.remove(&full_key);
                }
                None => {}
            }
        }

        debug!("Cache miss for key: {}, generating data", full_key);
        let data = factory(key)?;
        self.entries()?.insert(
            full_key,
            Entry {
                data: data.clone(),
                expires_at: now + expiration,
            },
        );
        Ok(data)
    }

    fn set(&self, seed: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let (_, expiration) = self.provider(seed)?;
        let now = Instant::now();
        let mut entries = self.entries()?;

        // Keys that are never read again are reclaimed here
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!("Evicted {} expired cache entries", evicted);
        }

        entries.insert(
            make_key(seed, key),
            Entry {
                data,
                expires_at: now + expiration,
            },
        );
        Ok(())
    }

    fn remove(&self, seed: &str, key: &str) -> Result<()> {
        self.entries()?.remove(&make_key(seed, key));
        Ok(())
    }

    fn is_registered(&self, seed: &str) -> bool {
        self.providers
            .read()
            .map(|providers| providers.contains_key(seed))
            .unwrap_or(false)
    }

    fn register(&self, seed: &str, factory: CacheFactory, expiration: Duration) -> Result<()> {
        let mut providers = self
            .providers
            .write()
            .map_err(|_| anyhow!("Cache provider table lock poisoned"))?;
        if providers.contains_key(seed) {
            bail!("Cache seed '{}' is already registered", seed);
        }
        providers.insert(
            seed.to_string(),
            Provider {
                factory,
                expiration,
            },
        );
        debug!(
            "Registered cache provider for seed: {} with expiration: {:?}",
            seed, expiration
        );
        Ok(())
    }
}
