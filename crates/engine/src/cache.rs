use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lifecycle of one cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheState {
    /// Nothing has been computed yet.
    Empty,
    Fresh,
    /// Older than the TTL, invalidated by a cursor advance, or seeded from storage.
    Stale,
}

/// A payload read out of a `CacheGate`.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub payload: T,
    pub computed_at: DateTime<Utc>,
    pub state: CacheState,
}

struct Entry<T> {
    payload: T,
    computed_at: DateTime<Utc>,
    refreshed: Instant,
}

struct Slot<T> {
    entry: Option<Entry<T>>,
    invalidated: bool,
    /// Bumped on every successful store.
    generation: u64,
    last_refresh_failed: bool,
}

/// Staleness policy around one derived payload.
///
/// Reads never block on the slot for longer than a clone. Recomputation is
/// single-flight: `refresh` holds `flight` for the whole computation, and a
/// caller that queued behind a computation which finished after it arrived
/// takes that result instead of starting another one.
pub struct CacheGate<T> {
    ttl: Duration,
    slot: Mutex<Slot<T>>,
    flight: tokio::sync::Mutex<()>,
    background: Arc<AtomicBool>,
}

/// The claim on a gate's background refresh. Dropping it, also while a
/// panicking task unwinds, frees the slot.
pub struct BackgroundSlot {
    running: Arc<AtomicBool>,
}

impl Drop for BackgroundSlot {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl<T: Clone> CacheGate<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(Slot {
                entry: None,
                invalidated: false,
                generation: 0,
                last_refresh_failed: false,
            }),
            flight: tokio::sync::Mutex::new(()),
            background: Arc::new(AtomicBool::new(false)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_of(&self, slot: &Slot<T>) -> CacheState {
        match &slot.entry {
            None => CacheState::Empty,
            Some(_) if slot.invalidated => CacheState::Stale,
            Some(entry) if entry.refreshed.elapsed() > self.ttl => CacheState::Stale,
            Some(_) => CacheState::Fresh,
        }
    }

    pub fn state(&self) -> CacheState {
        let slot = self.slot();
        self.state_of(&slot)
    }

    /// The current payload with its state, without triggering anything.
    pub fn peek(&self) -> Option<Cached<T>> {
        let slot = self.slot();
        let state = self.state_of(&slot);
        slot.entry.as_ref().map(|entry| Cached {
            payload: entry.payload.clone(),
            computed_at: entry.computed_at,
            state,
        })
    }

    fn fresh(&self) -> Option<Cached<T>> {
        self.peek().filter(|cached| cached.state == CacheState::Fresh)
    }

    pub fn generation(&self) -> u64 {
        self.slot().generation
    }

    /// Whether the most recent recompute attempt failed.
    pub fn last_refresh_failed(&self) -> bool {
        self.slot().last_refresh_failed
    }

    /// Replaces the payload wholesale and marks it fresh.
    pub fn store(&self, payload: T) -> Cached<T> {
        let mut slot = self.slot();
        let computed_at = Utc::now();
        slot.entry = Some(Entry {
            payload: payload.clone(),
            computed_at,
            refreshed: Instant::now(),
        });
        slot.invalidated = false;
        slot.generation += 1;
        slot.last_refresh_failed = false;
        Cached {
            payload,
            computed_at,
            state: CacheState::Fresh,
        }
    }

    /// Installs a payload loaded from storage. It is served but starts stale.
    pub fn seed_stale(&self, payload: T, computed_at: DateTime<Utc>) {
        let mut slot = self.slot();
        if slot.entry.is_some() {
            return;
        }
        slot.entry = Some(Entry {
            payload,
            computed_at,
            refreshed: Instant::now(),
        });
        slot.invalidated = true;
    }

    pub fn invalidate(&self) {
        self.slot().invalidated = true;
    }

    /// Marks an existing payload fresh again without recomputing it.
    pub fn touch(&self) {
        let mut slot = self.slot();
        if let Some(entry) = slot.entry.as_mut() {
            entry.refreshed = Instant::now();
            slot.invalidated = false;
            slot.last_refresh_failed = false;
        }
    }

    /// Edits the payload in place, keeping its age and state.
    pub fn update(&self, edit: impl FnOnce(&mut T)) {
        if let Some(entry) = self.slot().entry.as_mut() {
            edit(&mut entry.payload);
        }
    }

    /// Returns a fresh payload, recomputing it at most once across concurrent callers.
    ///
    /// Without `force` a fresh payload is returned as is. With `force` the
    /// caller still accepts a computation that completed after it arrived.
    pub async fn refresh<F, Fut, E>(&self, force: bool, compute: F) -> Result<Cached<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let arrived = self.generation();
        if !force {
            if let Some(cached) = self.fresh() {
                return Ok(cached);
            }
        }

        let _flight = self.flight.lock().await;

        if self.generation() > arrived {
            if let Some(cached) = self.peek() {
                return Ok(cached);
            }
        }
        if !force {
            if let Some(cached) = self.fresh() {
                return Ok(cached);
            }
        }

        match compute().await {
            Ok(payload) => Ok(self.store(payload)),
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    /// Always computes, under the same flight lock as `refresh`, and never
    /// shares another caller's result.
    pub async fn recompute<F, Fut, E>(&self, compute: F) -> Result<Cached<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _flight = self.flight.lock().await;
        match compute().await {
            Ok(payload) => Ok(self.store(payload)),
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    /// Notes a failed attempt to refresh outside of `refresh`, e.g. a failed cursor check.
    pub fn record_failure(&self) {
        self.slot().last_refresh_failed = true;
    }

    /// Claims the single background refresh slot, or `None` when one is
    /// already running.
    pub fn try_begin_background(&self) -> Option<BackgroundSlot> {
        self.background
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BackgroundSlot {
                running: self.background.clone(),
            })
    }
}
