use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

type Loader<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

struct Cached<T> {
    read_at: Instant,
    value: Arc<T>,
}

/// Read-through cache that reloads from a slow source once its TTL has elapsed.
pub struct FreshnessCache<T> {
    loader: Loader<T>,
    reload_lock: Mutex<()>,
    state: RwLock<Option<Cached<T>>>,
    // bumped by `invalidate`; loads started under an older value are not stored
    generation: AtomicU64,
}

impl<T> FreshnessCache<T> {
    pub fn new(loader: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            reload_lock: Mutex::new(()),
            state: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn get(&self, ttl: Duration) -> Result<Arc<T>> {
        self.get_at(ttl, Instant::now())
    }

    /// Returns the cached value, reloading first when older than `ttl` at `now`.
    pub fn get_at(&self, ttl: Duration, now: Instant) -> Result<Arc<T>> {
        if let Some(value) = self.fresh(ttl, now) {
            return Ok(value);
        }

        let _guard = self
            .reload_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // another caller may have reloaded while we waited
        if let Some(value) = self.fresh(ttl, now) {
            return Ok(value);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let value = Arc::new((self.loader)()?);
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!("cache invalidated during reload, result not stored");
            return Ok(value);
        }
        *state = Some(Cached {
            read_at: now,
            value: value.clone(),
        });
        tracing::debug!(ttl_secs = ttl.as_secs(), "cache reloaded");
        Ok(value)
    }

    /// Forces the next `get` to reload.
    pub fn invalidate(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.generation.fetch_add(1, Ordering::AcqRel);
        *state = None;
    }

    fn fresh(&self, ttl: Duration, now: Instant) -> Option<Arc<T>> {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state
            .as_ref()
            .filter(|cached| now.saturating_duration_since(cached.read_at) <= ttl)
            .map(|cached| cached.value.clone())
    }
}
