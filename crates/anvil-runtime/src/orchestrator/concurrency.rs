//! Provider- and model-scoped concurrency slots.
//!
//! Every key (a provider id, or `model:<id>` when a model has its own cap)
//! has a limit, and all keys share a global cap. Background tasks wait for
//! a slot in FIFO order, bounded by the acquire timeout. Foreground tasks
//! take a slot without waiting so the counts stay accurate.
//!
//! A granted slot is a [`SlotPermit`]; dropping it releases the slot and
//! hands it to the next eligible waiter.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anvil_settings::ConcurrencySettings;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::errors::RuntimeError;

/// Key reporting the global cap in [`ConcurrencyStatus::limits`].
pub const DEFAULT_KEY: &str = "__default__";
/// Key reporting the sum of active slots in [`ConcurrencyStatus::active`].
pub const TOTAL_KEY: &str = "__total__";

/// Snapshot of slot usage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConcurrencyStatus {
    /// Active slots per key, plus [`TOTAL_KEY`].
    pub active: BTreeMap<String, usize>,
    /// Configured caps, plus [`DEFAULT_KEY`].
    pub limits: BTreeMap<String, usize>,
    /// Waiters still queued.
    pub queued: usize,
}

struct Waiter {
    id: u64,
    key: String,
    tx: oneshot::Sender<SlotPermit>,
}

#[derive(Default)]
struct SlotState {
    active: HashMap<String, usize>,
    waiters: VecDeque<Waiter>,
    next_waiter: u64,
}

impl SlotState {
    fn total(&self) -> usize {
        self.active.values().sum()
    }

    fn active_for(&self, key: &str) -> usize {
        self.active.get(key).copied().unwrap_or(0)
    }

    fn increment(&mut self, key: &str) {
        *self.active.entry(key.to_owned()).or_insert(0) += 1;
    }

    fn decrement(&mut self, key: &str) -> bool {
        match self.active.get_mut(key) {
            Some(n) if *n > 1 => {
                *n -= 1;
                true
            }
            Some(_) => {
                let _ = self.active.remove(key);
                true
            }
            None => false,
        }
    }
}

struct Inner {
    limits: HashMap<String, usize>,
    global: usize,
    acquire_timeout: Duration,
    state: Mutex<SlotState>,
}

impl Inner {
    fn limit(&self, key: &str) -> usize {
        self.limits.get(key).copied().unwrap_or(self.global)
    }

    fn can_acquire(&self, state: &SlotState, key: &str) -> bool {
        state.active_for(key) < self.limit(key) && state.total() < self.global
    }

    fn release(self: &Arc<Self>, key: &str) {
        let mut state = self.state.lock();
        if !state.decrement(key) {
            warn!(key, "release called with no active slot");
            return;
        }
        debug!(key, active = state.total(), "concurrency slot released");
        self.drain(&mut state);
    }

    /// Hand freed slots to waiters, front of the queue first.
    fn drain(self: &Arc<Self>, state: &mut SlotState) {
        let mut i = 0;
        while i < state.waiters.len() && state.total() < self.global {
            if state.waiters[i].tx.is_closed() {
                let _ = state.waiters.remove(i);
                continue;
            }
            if !self.can_acquire(state, &state.waiters[i].key) {
                i += 1;
                continue;
            }
            let Some(waiter) = state.waiters.remove(i) else {
                break;
            };
            state.increment(&waiter.key);
            let permit = SlotPermit::new(self.clone(), waiter.key.clone());
            if let Err(mut unclaimed) = waiter.tx.send(permit) {
                unclaimed.disarm();
                let _ = state.decrement(&waiter.key);
            } else {
                debug!(key = %waiter.key, "queued task granted concurrency slot");
            }
        }
    }
}

/// A held concurrency slot. Released on drop.
pub struct SlotPermit {
    inner: Arc<Inner>,
    key: Option<String>,
}

impl SlotPermit {
    fn new(inner: Arc<Inner>, key: String) -> Self {
        Self {
            inner,
            key: Some(key),
        }
    }

    /// Key this slot counts against.
    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or_default()
    }

    fn disarm(&mut self) {
        self.key = None;
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.inner.release(&key);
        }
    }
}

impl std::fmt::Debug for SlotPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPermit").field("key", &self.key).finish()
    }
}

/// Counting semaphore keyed by provider or model.
#[derive(Clone)]
pub struct ConcurrencyManager {
    inner: Arc<Inner>,
}

impl ConcurrencyManager {
    /// Build from concurrency settings.
    pub fn new(settings: &ConcurrencySettings) -> Self {
        let mut limits: HashMap<String, usize> = settings
            .provider_concurrency
            .iter()
            .map(|(k, v)| (k.to_lowercase(), *v))
            .collect();
        for (model, limit) in &settings.model_concurrency {
            let _ = limits.insert(format!("model:{model}"), *limit);
        }
        Self {
            inner: Arc::new(Inner {
                limits,
                global: settings.default_concurrency,
                acquire_timeout: Duration::from_millis(settings.acquire_timeout_ms),
                state: Mutex::new(SlotState::default()),
            }),
        }
    }

    /// Key a task with this provider and model counts against: the model's
    /// own key when it has a cap, otherwise the provider.
    pub fn key_for(&self, provider: &str, model: Option<&str>) -> String {
        if let Some(model) = model {
            let key = format!("model:{model}");
            if self.inner.limits.contains_key(&key) {
                return key;
            }
        }
        provider.to_lowercase()
    }

    /// Cap for `key`, falling back to the global cap.
    pub fn limit(&self, key: &str) -> usize {
        self.inner.limit(key)
    }

    /// Wait for a slot on `key`.
    ///
    /// Fails with [`RuntimeError::ConcurrencyTimeout`] after the acquire
    /// timeout, or [`RuntimeError::Cancelled`] if the manager is shut down
    /// while waiting. Dropping the future gives up the place in the queue.
    pub async fn acquire(&self, key: &str) -> Result<SlotPermit, RuntimeError> {
        let (id, mut rx) = {
            let mut state = self.inner.state.lock();
            if self.inner.can_acquire(&state, key) {
                state.increment(key);
                debug!(key, active = state.total(), "concurrency slot acquired");
                return Ok(SlotPermit::new(self.inner.clone(), key.to_owned()));
            }
            let id = state.next_waiter;
            state.next_waiter += 1;
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter {
                id,
                key: key.to_owned(),
                tx,
            });
            debug!(key, queued = state.waiters.len(), "waiting for concurrency slot");
            (id, rx)
        };

        match tokio::time::timeout(self.inner.acquire_timeout, &mut rx).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(RuntimeError::Cancelled),
            Err(_) => {
                let still_queued = {
                    let mut state = self.inner.state.lock();
                    match state.waiters.iter().position(|w| w.id == id) {
                        Some(pos) => {
                            let _ = state.waiters.remove(pos);
                            true
                        }
                        None => false,
                    }
                };
                if !still_queued {
                    if let Ok(permit) = rx.try_recv() {
                        return Ok(permit);
                    }
                }
                let timeout_ms = u64::try_from(self.inner.acquire_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(key, timeout_ms, "timed out acquiring concurrency slot");
                Err(RuntimeError::ConcurrencyTimeout {
                    key: key.to_owned(),
                    timeout_ms,
                })
            }
        }
    }

    /// Take a slot on `key` without checking limits.
    pub fn acquire_unbounded(&self, key: &str) -> SlotPermit {
        let mut state = self.inner.state.lock();
        state.increment(key);
        debug!(key, active = state.total(), "concurrency slot taken without queueing");
        SlotPermit::new(self.inner.clone(), key.to_owned())
    }

    /// Current usage.
    pub fn status(&self) -> ConcurrencyStatus {
        let state = self.inner.state.lock();
        let mut active: BTreeMap<String, usize> =
            state.active.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let _ = active.insert(TOTAL_KEY.to_owned(), state.total());
        let mut limits: BTreeMap<String, usize> =
            self.inner.limits.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let _ = limits.insert(DEFAULT_KEY.to_owned(), self.inner.global);
        ConcurrencyStatus {
            active,
            limits,
            queued: state.waiters.iter().filter(|w| !w.tx.is_closed()).count(),
        }
    }

    /// Fail every waiter with [`RuntimeError::Cancelled`].
    pub fn close_waiters(&self) {
        let dropped = {
            let mut state = self.inner.state.lock();
            std::mem::take(&mut state.waiters)
        };
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "concurrency waiters dropped");
        }
    }
}

impl std::fmt::Debug for ConcurrencyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyManager")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn settings(global: usize, providers: &[(&str, usize)]) -> ConcurrencySettings {
        ConcurrencySettings {
            default_concurrency: global,
            provider_concurrency: providers.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect(),
            model_concurrency: [("big-model".to_owned(), 1)].into_iter().collect(),
            acquire_timeout_ms: 1_000,
            ..ConcurrencySettings::default()
        }
    }

    #[test]
    fn keys_prefer_model_caps() {
        let m = ConcurrencyManager::new(&settings(8, &[("anthropic", 3)]));
        assert_eq!(m.key_for("Anthropic", Some("big-model")), "model:big-model");
        assert_eq!(m.key_for("Anthropic", Some("small")), "anthropic");
        assert_eq!(m.key_for("openai", None), "openai");
        assert_eq!(m.limit("anthropic"), 3);
        assert_eq!(m.limit("unknown"), 8);
    }

    #[tokio::test]
    async fn acquire_and_release_update_counts() {
        let m = ConcurrencyManager::new(&settings(8, &[("anthropic", 2)]));
        let a = m.acquire("anthropic").await.unwrap();
        let b = m.acquire("anthropic").await.unwrap();
        let status = m.status();
        assert_eq!(status.active["anthropic"], 2);
        assert_eq!(status.active[TOTAL_KEY], 2);
        assert_eq!(status.limits[DEFAULT_KEY], 8);
        drop(a);
        drop(b);
        assert_eq!(m.status().active[TOTAL_KEY], 0);
        assert!(!m.status().active.contains_key("anthropic"));
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_times_out() {
        let m = ConcurrencyManager::new(&settings(8, &[("anthropic", 1)]));
        let _held = m.acquire("anthropic").await.unwrap();
        let err = m.acquire("anthropic").await.unwrap_err();
        assert_matches!(err, RuntimeError::ConcurrencyTimeout { ref key, timeout_ms: 1_000 } if key == "anthropic");
        assert_eq!(m.status().queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn released_slot_goes_to_first_waiter() {
        let m = ConcurrencyManager::new(&settings(8, &[("anthropic", 1)]));
        let held = m.acquire("anthropic").await.unwrap();

        let first = tokio::spawn({
            let m = m.clone();
            async move { m.acquire("anthropic").await.map(|p| p.key().to_owned()) }
        });
        tokio::task::yield_now().await;
        assert_eq!(m.status().queued, 1);

        drop(held);
        assert_eq!(first.await.unwrap().unwrap(), "anthropic");
        assert_eq!(m.status().queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn global_cap_spans_keys() {
        let m = ConcurrencyManager::new(&settings(1, &[("anthropic", 3), ("openai", 3)]));
        let held = m.acquire("anthropic").await.unwrap();
        let other = tokio::spawn({
            let m = m.clone();
            async move { m.acquire("openai").await.is_ok() }
        });
        tokio::task::yield_now().await;
        assert_eq!(m.status().queued, 1);
        drop(held);
        assert!(other.await.unwrap());
    }

    #[tokio::test]
    async fn unbounded_slots_count_but_ignore_limits() {
        let m = ConcurrencyManager::new(&settings(1, &[("anthropic", 1)]));
        let a = m.acquire_unbounded("anthropic");
        let b = m.acquire_unbounded("anthropic");
        assert_eq!(m.status().active[TOTAL_KEY], 2);
        drop((a, b));
        assert_eq!(m.status().active[TOTAL_KEY], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_wait_leaves_queue() {
        let m = ConcurrencyManager::new(&settings(8, &[("anthropic", 1)]));
        let held = m.acquire("anthropic").await.unwrap();
        let waiting = tokio::spawn({
            let m = m.clone();
            async move { m.acquire("anthropic").await.is_ok() }
        });
        tokio::task::yield_now().await;
        waiting.abort();
        let _ = waiting.await;
        assert_eq!(m.status().queued, 0);
        drop(held);
        assert_eq!(m.status().active[TOTAL_KEY], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_waiters_cancels_them() {
        let m = ConcurrencyManager::new(&settings(8, &[("anthropic", 1)]));
        let _held = m.acquire("anthropic").await.unwrap();
        let waiting = tokio::spawn({
            let m = m.clone();
            async move { m.acquire("anthropic").await }
        });
        tokio::task::yield_now().await;
        m.close_waiters();
        assert_matches!(waiting.await.unwrap(), Err(RuntimeError::Cancelled));
    }
}
