//! Standings cache owned by the UI-facing layer.
//!
//! The engine only ever calls `invalidate`; it never reads or fills entries.

use crate::{EngineResult, Standing};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Division(String),
    Pool(String),
    Team(String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Division(id) => write!(f, "standings:division:{id}"),
            CacheKey::Pool(id) => write!(f, "standings:pool:{id}"),
            CacheKey::Team(name) => write!(f, "standings:team:{name}"),
        }
    }
}

pub trait CacheInvalidator: Send + Sync + 'static {
    fn invalidate(&self, key: &CacheKey);
}

#[derive(Debug, Default)]
pub struct StandingsCache {
    entries: Mutex<HashMap<CacheKey, Vec<Standing>>>,
    /// Bumped on every invalidation so a computation that raced one is not cached.
    generation: AtomicU64,
}

impl StandingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Vec<Standing>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<Standing>> {
        self.entries().get(key).cloned()
    }

    pub fn is_cached(&self, key: &CacheKey) -> bool {
        self.entries().contains_key(key)
    }

    pub fn get_or_compute(&self, key: CacheKey, compute: impl FnOnce() -> Vec<Standing>) -> Vec<Standing> {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let value = compute();
        self.store_if_current(key, value.clone(), generation);
        value
    }

    /// Async variant for computations that read the store.
    pub async fn get_or_load<F, Fut>(&self, key: CacheKey, load: F) -> EngineResult<Vec<Standing>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Vec<Standing>>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let value = load().await?;
        self.store_if_current(key, value.clone(), generation);
        Ok(value)
    }

    fn store_if_current(&self, key: CacheKey, value: Vec<Standing>, generation: u64) {
        let mut entries = self.entries();
        if self.generation.load(Ordering::SeqCst) == generation {
            entries.insert(key, value);
        }
    }

    pub fn invalidations(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl CacheInvalidator for StandingsCache {
    fn invalidate(&self, key: &CacheKey) {
        let mut entries = self.entries();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if entries.remove(key).is_some() {
            log::debug!("invalidated {key}");
        }
    }
}
