//! Background eviction of artifacts older than the retention window.
//!
//! One pass lists the whole store, classifies every object against a single
//! snapshot of "now", then deletes the stale ones one by one. A failed
//! delete is logged and skipped; it never aborts the pass.

use super::policy::FreshnessPolicy;
use crate::clock::Clock;
use crate::store::{scan, ArtifactStore, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub stale: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Another pass was already in flight, so this one did nothing.
    pub skipped: bool,
}

pub struct Sweeper {
    store: Arc<dyn ArtifactStore>,
    policy: FreshnessPolicy,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
}

/// Clears the in-flight flag however the pass ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Sweeper {
    pub fn new(store: Arc<dyn ArtifactStore>, policy: FreshnessPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
            running: AtomicBool::new(false),
        }
    }

    /// Run one pass. Only a listing failure is returned as an error.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sweep already in progress, skipping");
            return Ok(SweepReport {
                skipped: true,
                ..SweepReport::default()
            });
        }
        let _guard = RunningGuard(&self.running);

        let now = self.clock.now();
        let mut stale_keys = Vec::new();
        let scanned = scan(self.store.as_ref(), "", |item| {
            if self.policy.is_stale(item.last_modified, now) {
                stale_keys.push(item.key);
            }
        })
        .await?;

        let mut report = SweepReport {
            scanned,
            stale: stale_keys.len(),
            ..SweepReport::default()
        };

        for key in &stale_keys {
            match self.store.delete(key).await {
                Ok(()) => report.deleted += 1,
                Err(e) if e.is_not_found() => report.deleted += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(key = %key, "Failed to evict stale artifact: {}", e);
                }
            }
        }

        if report.stale > 0 {
            tracing::info!(
                scanned = report.scanned,
                deleted = report.deleted,
                failed = report.failed,
                "Evicted stale artifacts"
            );
        } else {
            tracing::debug!(scanned = report.scanned, "Sweep found nothing to evict");
        }

        Ok(report)
    }

    /// Sweep every `every` until `shutdown` flips to true.
    ///
    /// Each pass is awaited before the next tick is taken, so passes never
    /// overlap; a pass in flight when shutdown arrives runs to completion.
    pub async fn run(self: Arc<Self>, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Eviction sweeper started (every {:?}, retention {:?})",
            every,
            self.policy.window()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!("Eviction sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Eviction sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{ListPage, MemoryStore};
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 18, 0, 0).unwrap()
    }

    fn minutes_ago(m: i64) -> DateTime<Utc> {
        now() - chrono::Duration::minutes(m)
    }

    fn seeded(page_size: usize) -> (Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now()));
        let store = Arc::new(MemoryStore::with_page_size(clock.clone(), page_size));
        store.insert_at("accra_1", Bytes::from_static(b"{}"), minutes_ago(1));
        store.insert_at("berlin_1", Bytes::from_static(b"{}"), minutes_ago(2));
        store.insert_at("cairo_1", Bytes::from_static(b"{}"), minutes_ago(4));
        store.insert_at("accra_0", Bytes::from_static(b"{}"), minutes_ago(6));
        store.insert_at("delhi_0", Bytes::from_static(b"{}"), minutes_ago(30));
        (store, clock)
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_stale() {
        let (store, clock) = seeded(2);
        let sweeper = Sweeper::new(store.clone(), FreshnessPolicy::default(), clock);

        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report.scanned, 5);
        assert_eq!(report.stale, 2);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(store.keys(), vec!["accra_1", "berlin_1", "cairo_1"]);

        let again = sweeper.sweep().await.unwrap();
        assert_eq!(again.scanned, 3);
        assert_eq!(again.deleted, 0);
        assert_eq!(store.keys().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_store_is_a_no_op() {
        let clock = Arc::new(ManualClock::new(now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let report = Sweeper::new(store, FreshnessPolicy::default(), clock)
            .sweep()
            .await
            .unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_advancing_clock_ages_out_remaining() {
        let (store, clock) = seeded(10);
        let sweeper = Sweeper::new(store.clone(), FreshnessPolicy::default(), clock.clone());
        sweeper.sweep().await.unwrap();

        clock.advance(chrono::Duration::minutes(3));
        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report.deleted, 2);
        assert_eq!(store.keys(), vec!["accra_1"]);
    }

    /// Lists fixed entries and refuses to delete one of them.
    struct FlakyStore {
        inner: MemoryStore,
        poisoned: &'static str,
    }

    #[async_trait]
    impl ArtifactStore for FlakyStore {
        async fn put(&self, key: &str, payload: Bytes) -> Result<(), StoreError> {
            self.inner.put(key, payload).await
        }

        async fn list_page(
            &self,
            prefix: &str,
            token: Option<&str>,
        ) -> Result<ListPage, StoreError> {
            self.inner.list_page(prefix, token).await
        }

        async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            if key == self.poisoned {
                return Err(StoreError::Unavailable("access denied".into()));
            }
            if key == "delhi_0" {
                // Already removed by someone else.
                self.inner.delete(key).await?;
                return Err(StoreError::NotFound(key.to_string()));
            }
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_abort_sweep() {
        let clock = Arc::new(ManualClock::new(now()));
        let inner = MemoryStore::new(clock.clone());
        inner.insert_at("accra_0", Bytes::new(), minutes_ago(10));
        inner.insert_at("bogota_0", Bytes::new(), minutes_ago(10));
        inner.insert_at("delhi_0", Bytes::new(), minutes_ago(10));
        inner.insert_at("essen_0", Bytes::new(), minutes_ago(1));
        let store = Arc::new(FlakyStore {
            inner,
            poisoned: "accra_0",
        });

        let report = Sweeper::new(store.clone(), FreshnessPolicy::default(), clock)
            .sweep()
            .await
            .unwrap();

        assert_eq!(report.stale, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, 2);
        assert_eq!(store.inner.keys(), vec!["accra_0", "essen_0"]);
    }

    #[tokio::test]
    async fn test_overlapping_sweep_is_skipped() {
        let (store, clock) = seeded(10);
        let sweeper = Sweeper::new(store, FreshnessPolicy::default(), clock);

        sweeper.running.store(true, Ordering::SeqCst);
        let report = sweeper.sweep().await.unwrap();
        assert!(report.skipped);
        assert_eq!(report.deleted, 0);

        sweeper.running.store(false, Ordering::SeqCst);
        assert_eq!(sweeper.sweep().await.unwrap().deleted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweeps_on_interval_until_shutdown() {
        let (store, clock) = seeded(10);
        let sweeper = Arc::new(Sweeper::new(store.clone(), FreshnessPolicy::default(), clock.clone()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(sweeper.run(Duration::from_secs(10), rx));

        // First tick fires immediately.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.keys().len(), 3);

        clock.advance(chrono::Duration::minutes(3));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.keys(), vec!["accra_1"]);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
