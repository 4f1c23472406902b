//! Per-route limiter state: the optional route-wide bucket, the per-client buckets and
//! the sweep that evicts idle clients.

use ahash::AHashMap;
use std::collections::hash_map::Entry;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::TokenBucket;
use crate::config::RateConfig;
use crate::telemetry::Metrics;

/// State kept for one client of one route.
///
/// `request_count` is informational only; admission is decided by the bucket alone.
#[derive(Debug)]
pub struct ClientEntry {
    bucket: TokenBucket,
    created: Instant,
    // nanoseconds since `created`
    last_seen: AtomicU64,
    request_count: AtomicU64,
}

impl ClientEntry {
    fn new(bucket: TokenBucket, now: Instant) -> Self {
        Self {
            bucket,
            created: now,
            last_seen: AtomicU64::new(0),
            request_count: AtomicU64::new(0),
        }
    }

    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }

    pub fn last_seen(&self) -> Instant {
        self.created + Duration::from_nanos(self.last_seen.load(Ordering::Acquire))
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Time since the client was last seen, zero if `now` is older than that.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen())
    }

    fn touch(&self, now: Instant) {
        let offset = u64::try_from(now.saturating_duration_since(self.created).as_nanos())
            .unwrap_or(u64::MAX);
        self.last_seen.fetch_max(offset, Ordering::AcqRel);
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Limiter state for a single route.
///
/// The client map is guarded by one reader/writer lock per group: lookups of known clients
/// share the read lock, while inserts and the sweep take it exclusively. Groups never touch
/// each other's locks.
pub struct LimiterGroup {
    name: String,
    config: RateConfig,
    route_bucket: Option<TokenBucket>,
    clients: RwLock<AHashMap<IpAddr, Arc<ClientEntry>>>,
    cleanup_interval: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl LimiterGroup {
    /// Build a group without starting its sweeper.
    ///
    /// The route bucket exists iff `config.rate_limit > 0` and starts full.
    pub fn new(name: impl Into<String>, config: RateConfig, metrics: Option<Arc<Metrics>>) -> Self {
        let route_bucket = (config.rate_limit > 0.0)
            .then(|| TokenBucket::new(config.rate_limit, config.route_burst()));
        let cleanup_interval = config.cleanup_interval();
        Self {
            name: name.into(),
            config,
            route_bucket,
            clients: RwLock::new(AHashMap::new()),
            cleanup_interval,
            metrics,
        }
    }

    /// Build a group and start its sweeper on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn start(
        name: impl Into<String>,
        config: RateConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Arc<Self> {
        let group = Arc::new(Self::new(name, config, metrics));
        group.spawn_sweeper();
        info!(
            route = %group.name,
            rate_limit = group.config.rate_limit,
            client_rate_limit = group.config.client_rate_limit,
            cleanup_interval_secs = group.cleanup_interval.as_secs(),
            "Started limiter group"
        );
        group
    }

    /// Spawn the periodic sweep for this group.
    ///
    /// The task only holds a weak reference and exits once the group is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.cleanup_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(group) = weak.upgrade() else {
                    debug!("Limiter group dropped, stopping sweeper");
                    break;
                };
                group.sweep(Instant::now());
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    /// The shared route-wide bucket, if the route tier is active.
    pub fn route_bucket(&self) -> Option<&TokenBucket> {
        self.route_bucket.as_ref()
    }

    /// Fetch the entry for `key`, creating it with a full bucket on first sight.
    ///
    /// Every call marks the client as seen and bumps its request counter.
    pub fn client_entry(&self, key: IpAddr) -> Arc<ClientEntry> {
        self.client_entry_at(key, Instant::now())
    }

    pub fn client_entry_at(&self, key: IpAddr, now: Instant) -> Arc<ClientEntry> {
        let rate = self.config.client_rate_limit;
        let burst = self.config.client_burst();
        self.get_or_create(key, now, || {
            ClientEntry::new(TokenBucket::new_at(rate, burst, now), now)
        })
    }

    /// Double-checked get-or-create on the client map.
    ///
    /// The entry is touched while the map lock is still held so a concurrent sweep can
    /// never evict an entry that is being handed out.
    fn get_or_create<F>(&self, key: IpAddr, now: Instant, factory: F) -> Arc<ClientEntry>
    where
        F: FnOnce() -> ClientEntry,
    {
        {
            let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = clients.get(&key) {
                entry.touch(now);
                return Arc::clone(entry);
            }
        }

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let entry = match clients.entry(key) {
            // Another request inserted it between the two locks
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                let entry = Arc::clone(vacant.insert(Arc::new(factory())));
                debug!(route = %self.name, client = %key, "Added client entry");
                if let Some(m) = &self.metrics {
                    m.record_client_entry_created(&self.name);
                }
                entry
            }
        };
        entry.touch(now);
        entry
    }

    /// Look up an entry without creating or touching it.
    pub fn peek_client(&self, key: IpAddr) -> Option<Arc<ClientEntry>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn client_count(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Remove every client idle for at least one cleanup interval. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let (removed, remaining) = {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            let before = clients.len();
            clients.retain(|key, entry| {
                let keep = entry.idle_for(now) < self.cleanup_interval;
                if !keep {
                    debug!(route = %self.name, client = %key, "Removed idle client entry");
                }
                keep
            });
            (before.saturating_sub(clients.len()), clients.len())
        };

        info!(route = %self.name, removed, remaining, "Limiter sweep finished");
        if let Some(m) = &self.metrics {
            m.record_sweep(&self.name, removed as u64);
        }
        removed
    }
}
