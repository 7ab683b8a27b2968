//! Admission ledger: per-client and global request bookkeeping.
//!
//! The ledger owns all mutable admission state. Queries (`admit_*`,
//! `verification_required`) are read-only; the caller decides whether to
//! record. Client entries live in a sharded map so checks for unrelated
//! clients never contend, while the single global timestamp sits behind
//! a read/write lock.
//!
//! # Memory Safety
//!
//! Entries are created lazily and evicted by [`AdmissionLedger::sweep`]
//! once both of their timestamps fall behind the retention horizon.
//! [`spawn_sweep_task`] runs the sweep off the request path.

use atelier_core::Clock;
use atelier_core::config::AdmissionConfig;
use dashmap::{DashMap, mapref::entry::Entry};
use std::{
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

/// Admission state for one client identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientState {
    /// Last admitted request, unset if the client has only verified.
    pub last_request_at: Option<Instant>,
    /// Last successful verification, unset until the first one.
    pub last_verified_at: Option<Instant>,
}

/// Throttle that rejected an atomic record attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Throttle {
    Global,
    Client,
}

/// Shared admission ledger.
#[derive(Clone)]
pub struct AdmissionLedger {
    inner: Arc<LedgerInner>,
}

struct LedgerInner {
    clients: DashMap<String, ClientState>,
    global_last_request: RwLock<Option<Instant>>,
    clock: Arc<dyn Clock>,
    global_interval: Duration,
    client_interval: Duration,
    verification_interval: Duration,
}

/// True if `since` is unset or at least `interval` before `now`.
fn elapsed_at_least(since: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match since {
        None => true,
        Some(t) => now.saturating_duration_since(t) >= interval,
    }
}

impl AdmissionLedger {
    /// Create a ledger with the configured intervals.
    pub fn new(config: &AdmissionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                clients: DashMap::new(),
                global_last_request: RwLock::new(None),
                clock,
                global_interval: config.global_interval(),
                client_interval: config.client_interval(),
                verification_interval: config.verification_interval(),
            }),
        }
    }

    fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    /// True if enough time has passed since the last admitted request of any client.
    pub fn admit_global(&self) -> bool {
        let last = *self
            .inner
            .global_last_request
            .read()
            .unwrap_or_else(|p| p.into_inner());
        elapsed_at_least(last, self.now(), self.inner.global_interval)
    }

    /// True if the client is unknown or its last admitted request is old enough.
    pub fn admit_client(&self, client_id: &str) -> bool {
        let last = self
            .inner
            .clients
            .get(client_id)
            .and_then(|state| state.last_request_at);
        elapsed_at_least(last, self.now(), self.inner.client_interval)
    }

    /// True if the client has no verification within the verification interval.
    pub fn verification_required(&self, client_id: &str) -> bool {
        let last = self
            .inner
            .clients
            .get(client_id)
            .and_then(|state| state.last_verified_at);
        elapsed_at_least(last, self.now(), self.inner.verification_interval)
    }

    /// Record an admitted request unconditionally.
    pub fn record_request(&self, client_id: &str) {
        let now = self.now();
        let mut global = self
            .inner
            .global_last_request
            .write()
            .unwrap_or_else(|p| p.into_inner());
        *global = Some(now);
        self.inner
            .clients
            .entry(client_id.to_string())
            .and_modify(|state| state.last_request_at = Some(now))
            .or_insert(ClientState {
                last_request_at: Some(now),
                last_verified_at: None,
            });
    }

    /// Re-check both throttles and record the request in one step.
    ///
    /// Closes the gap between a read-only check and the record for two
    /// requests racing through admission at the same moment. On rejection
    /// nothing is written.
    pub fn try_record_request(&self, client_id: &str) -> Result<(), Throttle> {
        let now = self.now();
        // Lock order is always global, then client shard.
        let mut global = self
            .inner
            .global_last_request
            .write()
            .unwrap_or_else(|p| p.into_inner());
        if !elapsed_at_least(*global, now, self.inner.global_interval) {
            return Err(Throttle::Global);
        }

        match self.inner.clients.entry(client_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if !elapsed_at_least(entry.get().last_request_at, now, self.inner.client_interval)
                {
                    return Err(Throttle::Client);
                }
                entry.get_mut().last_request_at = Some(now);
            }
            Entry::Vacant(entry) => {
                entry.insert(ClientState {
                    last_request_at: Some(now),
                    last_verified_at: None,
                });
            }
        }

        *global = Some(now);
        Ok(())
    }

    /// Record a successful verification for the client.
    pub fn record_verification(&self, client_id: &str) {
        let now = self.now();
        self.inner
            .clients
            .entry(client_id.to_string())
            .and_modify(|state| state.last_verified_at = Some(now))
            .or_insert(ClientState {
                last_request_at: None,
                last_verified_at: Some(now),
            });
    }

    /// Snapshot of one client's state.
    pub fn client_state(&self, client_id: &str) -> Option<ClientState> {
        self.inner.clients.get(client_id).map(|state| *state)
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.clients.is_empty()
    }

    /// Evict clients whose both timestamps are older than `retention`.
    /// Returns the number of entries evicted.
    ///
    /// Stale keys are collected first, then each is removed with `remove_if`
    /// so an entry touched between the scan and the removal survives.
    pub fn sweep(&self, retention: Duration) -> usize {
        let now = self.now();
        let is_stale = |state: &ClientState| {
            elapsed_at_least(state.last_request_at, now, retention)
                && elapsed_at_least(state.last_verified_at, now, retention)
        };

        let candidates: Vec<String> = self
            .inner
            .clients
            .iter()
            .filter(|entry| is_stale(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in candidates {
            if self
                .inner
                .clients
                .remove_if(&key, |_, state| is_stale(state))
                .is_some()
            {
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::debug!(
                evicted = evicted,
                remaining = self.inner.clients.len(),
                "Admission ledger sweep evicted stale clients"
            );
        }
        evicted
    }
}

/// Spawn a background task that periodically sweeps the ledger.
/// Returns a handle that can be used to stop the task.
pub fn spawn_sweep_task(
    ledger: AdmissionLedger,
    interval: Duration,
    retention: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = ledger.sweep(retention);
            crate::metrics::LEDGER_CLIENTS_EVICTED.inc_by(evicted as u64);
            crate::metrics::LEDGER_TRACKED_CLIENTS.set(ledger.len() as i64);
            if evicted > 0 {
                tracing::info!(evicted = evicted, "Admission ledger sweep task evicted stale clients");
            }
        }
    })
}
