//! The source-IP pool: round-robin rotation with per-address cooldown, and
//! batched parallel probe dispatch with early-exit.

use crate::utils::smtp::ProbeResult;

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

struct IpSlot {
    addr: IpAddr,
    /// Instant this slot was (or will be) handed out last.
    handed_out: Option<Instant>,
}

struct PoolState {
    slots: Vec<IpSlot>,
    cursor: usize,
}

/// The outcome of [`IpPool::verify_batch`]: every attempted probe, in
/// completion order, plus whether any of them succeeded.
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<ProbeResult>,
    pub found_valid: bool,
}

/// An ordered bank of local source addresses lent out round-robin.
///
/// Consecutive hand-outs of the same address are separated by at least the
/// configured cooldown; acquirers sleep the remainder outside the internal
/// lock. One in-flight probe per address at a time is enforced by shape:
/// `verify_batch` dispatches at most `width()` probes per batch, each with a
/// freshly acquired address.
pub struct IpPool {
    state: Mutex<PoolState>,
    cooldown: Duration,
    early_exit: bool,
}

impl IpPool {
    /// Builds a pool over the given addresses. The list must be non-empty
    /// (enforced by config validation before construction).
    pub fn new(addrs: Vec<IpAddr>, cooldown: Duration, early_exit: bool) -> Self {
        assert!(!addrs.is_empty(), "source IP pool cannot be empty");
        let slots = addrs
            .into_iter()
            .map(|addr| IpSlot {
                addr,
                handed_out: None,
            })
            .collect();
        Self {
            state: Mutex::new(PoolState { slots, cursor: 0 }),
            cooldown,
            early_exit,
        }
    }

    pub fn width(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Lends the next source address in rotation, sleeping out the remainder
    /// of its cooldown first.
    ///
    /// The slot is stamped with its hand-out instant while the lock is held,
    /// so a concurrent acquirer that wraps around to the same slot observes
    /// the full cooldown relative to this hand-out.
    pub async fn acquire(&self) -> IpAddr {
        let (addr, ready_at) = {
            let mut state = self.state.lock();
            let index = state.cursor;
            state.cursor = (state.cursor + 1) % state.slots.len();

            let now = Instant::now();
            let slot = &mut state.slots[index];
            let ready_at = match slot.handed_out {
                Some(previous) if previous + self.cooldown > now => previous + self.cooldown,
                _ => now,
            };
            slot.handed_out = Some(ready_at);
            (slot.addr, ready_at)
        };

        let wait = ready_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::trace!(target: "pool_task",
                "Source {} cooling down, sleeping {:?} before hand-out", addr, wait);
            tokio::time::sleep_until(ready_at).await;
        }
        addr
    }

    /// Probes `emails` in consecutive batches of the pool width.
    ///
    /// Every email in a batch runs in parallel with its own freshly acquired
    /// source address; results are collected in completion order. A batch
    /// always runs to completion, but once any completed batch contains a
    /// success, remaining batches are skipped when early-exit is enabled.
    pub async fn verify_batch<F, Fut>(&self, emails: &[String], probe_fn: F) -> BatchOutcome
    where
        F: Fn(String, IpAddr) -> Fut,
        Fut: Future<Output = ProbeResult>,
    {
        let width = self.width();
        let probe_fn = &probe_fn;
        let mut results = Vec::with_capacity(emails.len());
        let mut found_valid = false;

        for (batch_index, chunk) in emails.chunks(width).enumerate() {
            if found_valid && self.early_exit {
                let skipped = emails.len() - results.len();
                tracing::debug!(target: "pool_task",
                    "Early exit after batch {}: skipping {} remaining candidate(s)",
                    batch_index, skipped);
                break;
            }

            tracing::debug!(target: "pool_task",
                "Dispatching batch {} with {} probe(s)", batch_index + 1, chunk.len());

            let mut in_flight: FuturesUnordered<_> = chunk
                .iter()
                .map(|email| {
                    let email = email.clone();
                    async move {
                        let source_ip = self.acquire().await;
                        probe_fn(email, source_ip).await
                    }
                })
                .collect();

            // Drain the whole batch: dispatched probes run to completion even
            // after a peer reports success.
            while let Some(result) = in_flight.next().await {
                if result.valid {
                    found_valid = true;
                }
                results.push(result);
            }
        }

        BatchOutcome {
            results,
            found_valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::smtp::{ProbeReason, ProbeResult};
    use parking_lot::Mutex as SyncMutex;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn ip(last_octet: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet))
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_round_robin_order() {
        let pool = IpPool::new(vec![ip(1), ip(2), ip(3)], Duration::from_millis(500), true);
        assert_eq!(pool.acquire().await, ip(1));
        assert_eq!(pool.acquire().await, ip(2));
        assert_eq!(pool.acquire().await, ip(3));
        assert_eq!(pool.acquire().await, ip(1));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_cooldown_between_same_ip_acquisitions() {
        let pool = IpPool::new(vec![ip(1)], Duration::from_millis(500), true);
        let start = Instant::now();
        pool.acquire().await;
        pool.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
        pool.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_wide_pool_does_not_wait_within_one_cycle() {
        let pool = IpPool::new(vec![ip(1), ip(2)], Duration::from_millis(500), true);
        let start = Instant::now();
        pool.acquire().await;
        pool.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    fn fake_probe(
        accept: &'static [&'static str],
        counter: Arc<SyncMutex<HashMap<String, usize>>>,
    ) -> impl Fn(String, IpAddr) -> std::pin::Pin<Box<dyn Future<Output = ProbeResult> + Send>>
    {
        move |email: String, source_ip: IpAddr| {
            let counter = counter.clone();
            Box::pin(async move {
                *counter.lock().entry(email.clone()).or_insert(0) += 1;
                let mut result = if accept.contains(&email.as_str()) {
                    ProbeResult::accepted(&email, "250 OK")
                } else {
                    ProbeResult::rejected(&email, ProbeReason::InvalidRecipient, "550 no")
                };
                result.source_ip = Some(source_ip);
                result
            })
        }
    }

    fn emails(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_batch_early_exit_skips_later_batches() {
        let pool = IpPool::new(vec![ip(1), ip(2)], Duration::from_millis(500), true);
        let counter = Arc::new(SyncMutex::new(HashMap::new()));
        let candidates = emails(&["a@x.com", "b@x.com", "c@x.com", "d@x.com"]);

        let outcome = pool
            .verify_batch(&candidates, fake_probe(&["b@x.com"], counter.clone()))
            .await;

        assert!(outcome.found_valid);
        // First batch of two completed; the second batch never dispatched.
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(counter.lock().len(), 2);
        assert!(!counter.lock().contains_key("c@x.com"));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_batch_without_early_exit_probes_everything() {
        let pool = IpPool::new(vec![ip(1), ip(2)], Duration::from_millis(500), false);
        let counter = Arc::new(SyncMutex::new(HashMap::new()));
        let candidates = emails(&["a@x.com", "b@x.com", "c@x.com", "d@x.com"]);

        let outcome = pool
            .verify_batch(&candidates, fake_probe(&["a@x.com"], counter.clone()))
            .await;

        assert!(outcome.found_valid);
        assert_eq!(outcome.results.len(), 4);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_each_email_probed_at_most_once() {
        let pool = IpPool::new(vec![ip(1)], Duration::from_millis(500), true);
        let counter = Arc::new(SyncMutex::new(HashMap::new()));
        let candidates = emails(&["a@x.com", "b@x.com", "c@x.com"]);

        let outcome = pool
            .verify_batch(&candidates, fake_probe(&[], counter.clone()))
            .await;

        assert!(!outcome.found_valid);
        assert_eq!(outcome.results.len(), 3);
        assert!(counter.lock().values().all(|count| *count == 1));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_batch_preserves_every_attempted_address() {
        let pool = IpPool::new(vec![ip(1), ip(2), ip(3)], Duration::from_millis(500), true);
        let counter = Arc::new(SyncMutex::new(HashMap::new()));
        let candidates = emails(&["a@x.com", "b@x.com", "c@x.com"]);

        let outcome = pool
            .verify_batch(&candidates, fake_probe(&["a@x.com"], counter))
            .await;

        let mut seen: Vec<&str> = outcome.results.iter().map(|r| r.email.as_str()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec!["a@x.com", "b@x.com", "c@x.com"]);
    }
}
