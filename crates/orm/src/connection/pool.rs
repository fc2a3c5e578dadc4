//! Server pool selection
//!
//! Picks one reachable node out of a master or slave pool. Nodes that fail
//! to connect are marked dead in a shared status cache for the configured
//! retry interval, so repeated selections inside the window skip them
//! instead of re-dialing a known-bad server. A recovered node is retried
//! once the interval elapses; until then it stays skipped (bounded
//! staleness, by configuration).

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::backends::{DatabaseDriver, DatabaseLink, ServerConfig};
use crate::cache::Cache;
use crate::error::OrmError;

/// Pool selection error types
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("none of the configured servers are available")]
    Exhausted,

    #[error("server pool is empty")]
    EmptyPool,
}

impl From<PoolError> for OrmError {
    fn from(err: PoolError) -> Self {
        OrmError::Connection(err.to_string())
    }
}

/// Dead-server tracker over the cache collaborator.
///
/// Keyed by node DSN; an entry's presence means "skip this node". Expiry
/// is the cache TTL, so the retry interval needs no clock bookkeeping
/// here.
#[derive(Clone)]
pub(crate) struct ServerStatusCache {
    cache: Arc<dyn Cache>,
    retry_interval: Duration,
}

impl ServerStatusCache {
    pub fn new(cache: Arc<dyn Cache>, retry_interval: Duration) -> Self {
        Self {
            cache,
            retry_interval,
        }
    }

    fn key(&self, config: &ServerConfig) -> String {
        self.cache.build_key(&["server-status", &config.dsn])
    }

    pub fn is_dead(&self, config: &ServerConfig) -> bool {
        if self.retry_interval.is_zero() {
            return false;
        }
        self.cache.get(&self.key(config)).is_some()
    }

    pub fn mark_dead(&self, config: &ServerConfig) {
        if self.retry_interval.is_zero() {
            return;
        }
        self.cache.set(
            &self.key(config),
            serde_json::json!(true),
            Some(self.retry_interval),
        );
    }
}

/// Open a link to the first reachable node of a pool.
///
/// Nodes are tried in pool order, optionally shuffled first. A node marked
/// dead is skipped; a node that fails to connect is marked dead for the
/// retry interval and the next candidate is tried. Selection never loops:
/// one pass over the pool either yields a link or `PoolError::Exhausted`.
pub(crate) async fn open_from_pool(
    driver: &dyn DatabaseDriver,
    configs: &[ServerConfig],
    template: Option<&ServerConfig>,
    shuffle: bool,
    status: &ServerStatusCache,
) -> Result<Box<dyn DatabaseLink>, PoolError> {
    if configs.is_empty() {
        return Err(PoolError::EmptyPool);
    }

    let mut ordered: Vec<ServerConfig> = configs
        .iter()
        .cloned()
        .map(|c| match template {
            Some(t) => c.merge_defaults(t),
            None => c,
        })
        .collect();
    if shuffle {
        ordered.shuffle(&mut rand::thread_rng());
    }

    for config in &ordered {
        if status.is_dead(config) {
            debug!(dsn = %config.dsn, "skipping server marked dead");
            continue;
        }
        match driver.connect(config).await {
            Ok(link) => {
                debug!(dsn = %config.dsn, "selected pool server");
                return Ok(link);
            }
            Err(err) => {
                warn!(dsn = %config.dsn, error = %err, "server unreachable, marking dead");
                status.mark_dead(config);
            }
        }
    }
    Err(PoolError::Exhausted)
}
