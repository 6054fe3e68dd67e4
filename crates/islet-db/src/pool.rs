//! The bounded, health-tracked connection cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connector::{Connector, DbClient};
use crate::error::{DbError, DbResult};
use crate::redact::redact_url;

/// Pool tuning.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Maximum cached connections.
    pub limit: usize,
    /// Idle entries older than this are reaped.
    pub idle_timeout: Duration,
    /// Reaper period.
    pub cleanup_interval: Duration,
    /// Idle entries older than this are marked suspected by `health_check`.
    pub suspect_after: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            idle_timeout: Duration::from_secs(120),
            cleanup_interval: Duration::from_secs(60),
            suspect_after: Duration::from_secs(300),
        }
    }
}

/// Health of one cached connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Usable.
    Ok,
    /// Long idle; replaced eagerly if reuse fails, healed on reuse.
    Suspected,
    /// Closed and replaced on the next `get`.
    Dead,
}

struct PoolEntry {
    client: Arc<dyn DbClient>,
    refs: usize,
    last_used: Instant,
    health: Health,
}

/// Counts reported by [`ConnectionPool::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Cached entries.
    pub entries: usize,
    /// Entries with at least one outstanding lease.
    pub in_use: usize,
    /// Entries with no outstanding lease.
    pub idle: usize,
}

/// A bounded connection cache keyed by URL.
///
/// Only `get`/`release` mutate reference counts; only entries with zero
/// refs are evictable. The reaper closes idle entries past their timeout.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    entries: Arc<Mutex<HashMap<String, PoolEntry>>>,
    config: PoolConfig,
    reaper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    /// Create a pool and start its reaper. Must be called inside a tokio
    /// runtime.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: PoolConfig) -> Self {
        let entries: Arc<Mutex<HashMap<String, PoolEntry>>> = Arc::new(Mutex::new(HashMap::new()));
        let reaper = tokio::spawn(Self::reap_loop(Arc::clone(&entries), config));
        Self {
            connector,
            entries,
            config,
            reaper: std::sync::Mutex::new(Some(reaper)),
        }
    }

    async fn reap_loop(entries: Arc<Mutex<HashMap<String, PoolEntry>>>, config: PoolConfig) {
        let mut ticker = tokio::time::interval(config.cleanup_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // immediate first tick
        loop {
            ticker.tick().await;
            let expired: Vec<(String, Arc<dyn DbClient>)> = {
                let mut map = entries.lock().await;
                let now = Instant::now();
                let urls: Vec<String> = map
                    .iter()
                    .filter(|(_, entry)| {
                        entry.refs == 0 && now.duration_since(entry.last_used) > config.idle_timeout
                    })
                    .map(|(url, _)| url.clone())
                    .collect();
                urls.into_iter()
                    .filter_map(|url| map.remove(&url).map(|entry| (url, entry.client)))
                    .collect()
            };
            for (url, client) in expired {
                debug!(url = %redact_url(&url), "reaping idle connection");
                Self::close_client(&url, &client).await;
            }
        }
    }

    async fn close_client(url: &str, client: &Arc<dyn DbClient>) {
        if let Err(err) = client.close().await {
            warn!(url = %redact_url(url), error = %err, "connection close failed");
        }
    }

    /// Lease a connection for `url`, creating or replacing an entry as
    /// needed.
    ///
    /// # Errors
    ///
    /// [`DbError::MissingUrl`] for an empty URL, [`DbError::Exhausted`]
    /// when the pool is at capacity with nothing idle to evict, and any
    /// connector error.
    pub async fn get(&self, url: &str) -> DbResult<Arc<dyn DbClient>> {
        if url.is_empty() {
            return Err(DbError::MissingUrl);
        }

        let mut map = self.entries.lock().await;

        if let Some(entry) = map.get(url)
            && entry.health == Health::Dead
        {
            debug!(url = %redact_url(url), "replacing dead connection");
            if let Some(dead) = map.remove(url) {
                Self::close_client(url, &dead.client).await;
            }
        }

        if let Some(entry) = map.get_mut(url) {
            entry.refs = entry.refs.saturating_add(1);
            entry.last_used = Instant::now();
            entry.health = Health::Ok;
            return Ok(Arc::clone(&entry.client));
        }

        if map.len() >= self.config.limit {
            let lru = map
                .iter()
                .filter(|(_, entry)| entry.refs == 0)
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(url, _)| url.clone());
            match lru {
                Some(victim) => {
                    debug!(url = %redact_url(&victim), "evicting idle connection at capacity");
                    if let Some(entry) = map.remove(&victim) {
                        Self::close_client(&victim, &entry.client).await;
                    }
                },
                None => {
                    warn!(limit = self.config.limit, "pool at capacity with no idle entry");
                    return Err(DbError::Exhausted {
                        limit: self.config.limit,
                    });
                },
            }
        }

        let client = self.connector.connect(url).await?;
        debug!(url = %redact_url(url), "connection opened");
        map.insert(
            url.to_string(),
            PoolEntry {
                client: Arc::clone(&client),
                refs: 1,
                last_used: Instant::now(),
                health: Health::Ok,
            },
        );
        Ok(client)
    }

    /// Borrow the leased client for `url` without changing its refcount.
    ///
    /// # Errors
    ///
    /// [`DbError::NotLeased`] when no live entry exists for `url`.
    pub async fn peek(&self, url: &str) -> DbResult<Arc<dyn DbClient>> {
        let mut map = self.entries.lock().await;
        match map.get_mut(url) {
            Some(entry) if entry.health != Health::Dead => {
                entry.last_used = Instant::now();
                Ok(Arc::clone(&entry.client))
            },
            _ => Err(DbError::NotLeased),
        }
    }

    /// Return a lease for `url`.
    pub async fn release(&self, url: &str) {
        let mut map = self.entries.lock().await;
        match map.get_mut(url) {
            Some(entry) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.last_used = Instant::now();
            },
            None => warn!(url = %redact_url(url), "release for unknown url"),
        }
    }

    /// Mark an entry dead; it is closed and replaced on the next `get`.
    pub async fn mark_dead(&self, url: &str) {
        if let Some(entry) = self.entries.lock().await.get_mut(url) {
            entry.health = Health::Dead;
        }
    }

    /// Mark long-idle entries suspected. Returns how many were marked.
    pub async fn health_check(&self) -> usize {
        let mut map = self.entries.lock().await;
        let now = Instant::now();
        let mut marked: usize = 0;
        for entry in map.values_mut() {
            if entry.refs == 0
                && entry.health == Health::Ok
                && now.duration_since(entry.last_used) > self.config.suspect_after
            {
                entry.health = Health::Suspected;
                marked = marked.saturating_add(1);
            }
        }
        marked
    }

    /// Current pool counts.
    pub async fn stats(&self) -> PoolStats {
        let map = self.entries.lock().await;
        let in_use = map.values().filter(|entry| entry.refs > 0).count();
        PoolStats {
            entries: map.len(),
            in_use,
            idle: map.len().saturating_sub(in_use),
        }
    }

    /// Health of the entry for `url`, if cached.
    pub async fn health_of(&self, url: &str) -> Option<Health> {
        self.entries.lock().await.get(url).map(|entry| entry.health)
    }

    /// Stop the reaper, close every entry concurrently, and empty the map.
    pub async fn dispose(&self) {
        if let Some(handle) = self
            .reaper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        let drained: Vec<(String, Arc<dyn DbClient>)> = {
            let mut map = self.entries.lock().await;
            map.drain().map(|(url, entry)| (url, entry.client)).collect()
        };
        join_all(
            drained
                .iter()
                .map(|(url, client)| Self::close_client(url, client)),
        )
        .await;
        debug!("connection pool disposed");
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeConnector;

    fn small_pool(connector: Arc<FakeConnector>, limit: usize) -> ConnectionPool {
        let config = PoolConfig {
            limit,
            ..PoolConfig::default()
        };
        ConnectionPool::new(connector, config)
    }

    #[tokio::test]
    async fn get_reuses_cached_entries() {
        let connector = Arc::new(FakeConnector::new());
        let pool = small_pool(Arc::clone(&connector), 4);

        pool.get("postgres://db/app").await.unwrap();
        pool.get("postgres://db/app").await.unwrap();
        assert_eq!(connector.connect_count(), 1);

        let stats = pool.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.in_use, 1);
        pool.dispose().await;
    }

    #[tokio::test]
    async fn empty_url_is_rejected() {
        let pool = small_pool(Arc::new(FakeConnector::new()), 4);
        assert!(matches!(pool.get("").await, Err(DbError::MissingUrl)));
        pool.dispose().await;
    }

    #[tokio::test]
    async fn lru_idle_entry_is_evicted_at_capacity() {
        let connector = Arc::new(FakeConnector::new());
        let pool = small_pool(Arc::clone(&connector), 2);

        pool.get("postgres://db/a").await.unwrap();
        pool.release("postgres://db/a").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.get("postgres://db/b").await.unwrap();
        pool.release("postgres://db/b").await;

        // `a` is the LRU idle entry and must be the one closed.
        pool.get("postgres://db/c").await.unwrap();
        let stats = pool.stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(connector.close_count_for("postgres://db/a"), 1);
        assert_eq!(connector.close_count_for("postgres://db/b"), 0);
        pool.dispose().await;
    }

    #[tokio::test]
    async fn exhausted_pool_with_no_idle_entry_errors() {
        let pool = small_pool(Arc::new(FakeConnector::new()), 1);
        pool.get("postgres://db/a").await.unwrap();
        let err = match pool.get("postgres://db/b").await {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, DbError::Exhausted { limit: 1 }));
        pool.dispose().await;
    }

    #[tokio::test]
    async fn dead_entries_are_closed_and_replaced() {
        let connector = Arc::new(FakeConnector::new());
        let pool = small_pool(Arc::clone(&connector), 4);

        pool.get("postgres://db/a").await.unwrap();
        pool.release("postgres://db/a").await;
        pool.mark_dead("postgres://db/a").await;

        pool.get("postgres://db/a").await.unwrap();
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(connector.close_count_for("postgres://db/a"), 1);
        assert_eq!(pool.health_of("postgres://db/a").await, Some(Health::Ok));
        pool.dispose().await;
    }

    #[tokio::test]
    async fn dispose_closes_every_entry_exactly_once() {
        let connector = Arc::new(FakeConnector::new());
        let pool = small_pool(Arc::clone(&connector), 4);
        pool.get("postgres://db/a").await.unwrap();
        pool.get("postgres://db/b").await.unwrap();

        pool.dispose().await;
        assert_eq!(pool.stats().await.entries, 0);
        assert_eq!(connector.close_count_for("postgres://db/a"), 1);
        assert_eq!(connector.close_count_for("postgres://db/b"), 1);
    }

    #[tokio::test]
    async fn suspected_heals_on_reuse() {
        let connector = Arc::new(FakeConnector::new());
        let config = PoolConfig {
            suspect_after: Duration::from_millis(1),
            ..PoolConfig::default()
        };
        let pool = ConnectionPool::new(connector, config);

        pool.get("postgres://db/a").await.unwrap();
        pool.release("postgres://db/a").await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(pool.health_check().await, 1);
        assert_eq!(
            pool.health_of("postgres://db/a").await,
            Some(Health::Suspected)
        );

        pool.get("postgres://db/a").await.unwrap();
        assert_eq!(pool.health_of("postgres://db/a").await, Some(Health::Ok));
        pool.dispose().await;
    }

    #[tokio::test]
    async fn reaper_closes_idle_entries() {
        let connector = Arc::new(FakeConnector::new());
        let config = PoolConfig {
            limit: 4,
            idle_timeout: Duration::from_millis(10),
            cleanup_interval: Duration::from_millis(20),
            suspect_after: Duration::from_secs(300),
        };
        let connector_clone = Arc::clone(&connector);
        let dyn_connector: Arc<dyn Connector> = connector_clone;
        let pool = ConnectionPool::new(dyn_connector, config);

        pool.get("postgres://db/a").await.unwrap();
        pool.release("postgres://db/a").await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(pool.stats().await.entries, 0);
        assert_eq!(connector.close_count_for("postgres://db/a"), 1);
        pool.dispose().await;
    }
}
