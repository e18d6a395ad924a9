//! Last-known Webhook Relay bucket state
//!
//! Reconcilers only read from the cache. A background watcher owned by the
//! session replaces the whole snapshot on every successful refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::relay::{ApiError, Bucket, RelayApi};

#[derive(Debug, Default)]
struct Snapshot {
    by_name: HashMap<String, Arc<Bucket>>,
    by_id: HashMap<String, Arc<Bucket>>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Lookup from bucket name (or id) to the full remote bucket
#[derive(Debug, Default)]
pub struct BucketCache {
    snapshot: ArcSwap<Snapshot>,
}

impl BucketCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-populated with `buckets`
    pub fn from_buckets(buckets: Vec<Bucket>) -> Self {
        let cache = Self::new();
        cache.replace(buckets);
        cache
    }

    /// Look a bucket up by name, then by id. `None` means its state isn't known yet.
    pub fn get(&self, reference: &str) -> Option<Arc<Bucket>> {
        let snapshot = self.snapshot.load();
        snapshot
            .by_name
            .get(reference)
            .or_else(|| snapshot.by_id.get(reference))
            .cloned()
    }

    /// Swap in a fresh snapshot
    pub fn replace(&self, buckets: Vec<Bucket>) {
        let mut next = Snapshot {
            refreshed_at: Some(Utc::now()),
            ..Default::default()
        };
        for bucket in buckets {
            let bucket = Arc::new(bucket);
            if !bucket.id.is_empty() {
                next.by_id.insert(bucket.id.clone(), Arc::clone(&bucket));
            }
            next.by_name.insert(bucket.name.clone(), bucket);
        }
        self.snapshot.store(Arc::new(next));
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the snapshot was last replaced, `None` if never populated
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.load().refreshed_at
    }
}

/// List buckets once and replace the snapshot. Returns the number of buckets seen.
pub async fn refresh(api: &dyn RelayApi, cache: &BucketCache) -> Result<usize, ApiError> {
    let buckets = api.list_buckets().await?;
    let count = buckets.len();
    cache.replace(buckets);
    debug!(buckets = count, "Bucket cache refreshed");
    Ok(count)
}

/// Shortest refresh interval the watcher accepts
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Keep `cache` fresh until `token` is cancelled.
///
/// A failed refresh keeps the previous snapshot. `every` is raised to
/// [`MIN_REFRESH_INTERVAL`] when shorter.
pub fn spawn_bucket_watcher(
    api: Arc<dyn RelayApi>,
    cache: Arc<BucketCache>,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    let every = every.max(MIN_REFRESH_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = refresh(api.as_ref(), &cache).await {
                        warn!(error = %e, "Failed to refresh bucket cache");
                    }
                }
            }
        }

        info!("Bucket watcher stopped");
    })
}
