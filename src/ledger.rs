//! Pre-paid batch ledger
//!
//! Batches are bundles of N calls bought up front at a discount. The ledger
//! issues them after a successful batch-purchase settlement, debits one call
//! per spend, and sweeps out expired entries in the background. Nothing is
//! persisted; a restart clears all batches.
//!
//! Each batch sits behind its own mutex inside the shared map, so the
//! check-and-decrement is linearizable: the number of successful debits of a
//! batch can never exceed its `total_calls`, no matter how many requests race.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::types::BatchDescriptor;

/// How long an issued batch stays spendable, in days
pub const BATCH_TTL_DAYS: i64 = 30;

/// Interval between expiry sweeps
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3_600);

#[derive(Debug, Clone)]
struct Batch {
    total_calls: u32,
    calls_remaining: u32,
    amount_paid: Decimal,
    expires_at: DateTime<Utc>,
}

impl Batch {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of a successful debit
#[derive(Debug, Clone, Copy)]
pub struct DebitReceipt {
    pub remaining: u32,
    pub total_calls: u32,
}

/// In-memory ledger of pre-paid call bundles
pub struct BatchLedger {
    batches: DashMap<String, Arc<Mutex<Batch>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Default for BatchLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            batches: DashMap::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// Issue a new batch with the standard TTL
    pub fn issue(&self, calls: u32, price: Decimal) -> BatchDescriptor {
        self.issue_with_expiry(
            calls,
            price,
            Utc::now() + chrono::Duration::days(BATCH_TTL_DAYS),
        )
    }

    /// Issue a batch with an explicit expiry
    pub(crate) fn issue_with_expiry(
        &self,
        calls: u32,
        price: Decimal,
        expires_at: DateTime<Utc>,
    ) -> BatchDescriptor {
        let batch_id = Uuid::new_v4().to_string();
        let batch = Batch {
            total_calls: calls,
            calls_remaining: calls,
            amount_paid: price,
            expires_at,
        };
        self.batches
            .insert(batch_id.clone(), Arc::new(Mutex::new(batch)));
        tracing::info!(batch_id = %batch_id, calls, %price, "batch issued");
        BatchDescriptor {
            batch_id,
            calls,
            calls_remaining: calls,
            amount_paid: price,
            expires_at,
        }
    }

    /// Atomically spend one call from a batch
    ///
    /// Returns `None` when the batch is missing, depleted, or expired.
    pub fn try_debit(&self, batch_id: &str) -> Option<DebitReceipt> {
        let entry = self.batches.get(batch_id)?;
        let mut batch = entry.lock().expect("batch lock poisoned");
        if batch.is_expired(Utc::now()) || batch.calls_remaining == 0 {
            return None;
        }
        batch.calls_remaining -= 1;
        Some(DebitReceipt {
            remaining: batch.calls_remaining,
            total_calls: batch.total_calls,
        })
    }

    /// Current descriptor for a batch, if it exists
    pub fn describe(&self, batch_id: &str) -> Option<BatchDescriptor> {
        let entry = self.batches.get(batch_id)?;
        let batch = entry.lock().expect("batch lock poisoned");
        Some(BatchDescriptor {
            batch_id: batch_id.to_string(),
            calls: batch.total_calls,
            calls_remaining: batch.calls_remaining,
            amount_paid: batch.amount_paid,
            expires_at: batch.expires_at,
        })
    }

    /// Number of batches currently held
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Whether the ledger holds no batches
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Drop expired and depleted batches; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.batches.len();
        self.batches.retain(|_, entry| {
            let batch = entry.lock().expect("batch lock poisoned");
            !batch.is_expired(now) && batch.calls_remaining > 0
        });
        let removed = before - self.batches.len();
        if removed > 0 {
            tracing::info!(removed, "swept expired batches");
        }
        removed
    }

    /// Start the hourly expiry sweep
    pub fn start_sweeper(ledger: &Arc<Self>) {
        let mut guard = ledger.sweeper.lock().expect("sweeper lock poisoned");
        if guard.is_some() {
            return;
        }
        let ledger = Arc::clone(ledger);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so a fresh ledger isn't swept at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                ledger.sweep_expired();
            }
        });
        *guard = Some(handle);
    }

    /// Stop the expiry sweep
    pub fn stop_sweeper(&self) {
        let mut guard = self.sweeper.lock().expect("sweeper lock poisoned");
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }
}

impl Drop for BatchLedger {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn price() -> Decimal {
        Decimal::from_str("0.08").unwrap()
    }

    #[test]
    fn test_issue_and_debit() {
        let ledger = BatchLedger::new();
        let batch = ledger.issue(1000, price());
        assert_eq!(batch.calls_remaining, 1000);

        let receipt = ledger.try_debit(&batch.batch_id).unwrap();
        assert_eq!(receipt.remaining, 999);
        assert_eq!(receipt.total_calls, 1000);
        assert_eq!(
            ledger.describe(&batch.batch_id).unwrap().calls_remaining,
            999
        );
    }

    #[test]
    fn test_debit_unknown_batch() {
        let ledger = BatchLedger::new();
        assert!(ledger.try_debit("nope").is_none());
    }

    #[test]
    fn test_debit_depleted_batch() {
        let ledger = BatchLedger::new();
        let batch = ledger.issue(2, price());
        assert!(ledger.try_debit(&batch.batch_id).is_some());
        assert!(ledger.try_debit(&batch.batch_id).is_some());
        assert!(ledger.try_debit(&batch.batch_id).is_none());
    }

    #[test]
    fn test_debit_expired_batch() {
        let ledger = BatchLedger::new();
        let batch =
            ledger.issue_with_expiry(10, price(), Utc::now() - chrono::Duration::seconds(1));
        assert!(ledger.try_debit(&batch.batch_id).is_none());
    }

    #[test]
    fn test_sweep_removes_expired_and_depleted() {
        let ledger = BatchLedger::new();
        let expired =
            ledger.issue_with_expiry(10, price(), Utc::now() - chrono::Duration::seconds(1));
        let depleted = ledger.issue(1, price());
        let live = ledger.issue(10, price());
        ledger.try_debit(&depleted.batch_id).unwrap();

        let removed = ledger.sweep_expired();
        assert_eq!(removed, 2);
        assert!(ledger.describe(&expired.batch_id).is_none());
        assert!(ledger.describe(&depleted.batch_id).is_none());
        assert!(ledger.describe(&live.batch_id).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overspend() {
        let ledger = Arc::new(BatchLedger::new());
        let batch = ledger.issue(50, price());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            let batch_id = batch.batch_id.clone();
            handles.push(tokio::spawn(async move {
                let mut won = 0u32;
                for _ in 0..20 {
                    if ledger.try_debit(&batch_id).is_some() {
                        won += 1;
                    }
                }
                won
            }));
        }

        let mut total = 0u32;
        for handle in handles {
            total += handle.await.unwrap();
        }
        // 8 tasks x 20 attempts = 160 tries against 50 calls.
        assert_eq!(total, 50);
        assert!(ledger.try_debit(&batch.batch_id).is_none());
    }

    #[tokio::test]
    async fn test_last_call_single_winner() {
        let ledger = Arc::new(BatchLedger::new());
        let batch = ledger.issue(1, price());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = Arc::clone(&ledger);
            let batch_id = batch.batch_id.clone();
            handles.push(tokio::spawn(async move {
                ledger.try_debit(&batch_id).is_some()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
