//! Connection management
//!
//! A `Connection` owns at most one master link and one memoized slave
//! link, selected from configurable pools with health-tracked failover.
//! Writes and transactional work always go to the master; plain reads are
//! routed to a slave when one is configured and reachable. All link and
//! transaction state sits behind one async mutex, which is what enforces
//! the one-link/one-transaction-per-connection invariant in a threaded
//! host.

pub mod pool;

#[cfg(test)]
mod failover_tests;

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::backends::{DatabaseDriver, DatabaseLink, ServerConfig, SqlDialect};
use crate::cache::{Cache, PROCESS_CACHE};
use crate::command::Command;
use crate::error::{OrmError, OrmResult};
use crate::query::{QueryBuilder, QueryCacheDirective};
use crate::row::Row;
use crate::schema::Schema;
use crate::value::DbValue;

use pool::{open_from_pool, ServerStatusCache};

/// Connection configuration.
///
/// Plain data, injected at construction. `server` is the primary DSN used
/// when no master pool is configured; `masters`/`slaves` are per-node
/// configs optionally completed from a shared template.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub server: ServerConfig,
    pub masters: Vec<ServerConfig>,
    pub slaves: Vec<ServerConfig>,
    /// Shared settings merged into each master config
    pub master_template: Option<ServerConfig>,
    /// Shared settings merged into each slave config
    pub slave_template: Option<ServerConfig>,
    /// Try masters in shuffled order instead of listed order
    pub shuffle_masters: bool,
    /// Route plain reads to slaves when available
    pub enable_slaves: bool,
    /// How long a failed node stays marked dead before it is retried
    pub server_retry_interval: Duration,
    /// Emulate nested transactions with savepoints
    pub enable_savepoint: bool,
    /// Tables whose metadata is never cached
    pub schema_cache_exclude: Vec<String>,
}

impl ConnectionConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            server: ServerConfig::new(dsn),
            masters: Vec::new(),
            slaves: Vec::new(),
            master_template: None,
            slave_template: None,
            shuffle_masters: true,
            enable_slaves: true,
            server_retry_interval: Duration::from_secs(600),
            enable_savepoint: true,
            schema_cache_exclude: Vec::new(),
        }
    }
}

pub(crate) enum SlaveState {
    /// Pool selection has not run yet
    Untried,
    /// Pool selection ran and found nothing reachable
    Unavailable,
    Ready(Box<dyn DatabaseLink>),
}

pub(crate) struct ConnectionState {
    pub master: Option<Box<dyn DatabaseLink>>,
    pub slave: SlaveState,
    pub tx_level: u32,
    pub use_master_depth: u32,
    pub cache_stack: Vec<Option<QueryCacheDirective>>,
    pub schema: Option<Arc<Schema>>,
    pub server_version: Option<String>,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            master: None,
            slave: SlaveState::Untried,
            tx_level: 0,
            use_master_depth: 0,
            cache_stack: Vec::new(),
            schema: None,
            server_version: None,
        }
    }

    pub(crate) fn master_link(&mut self) -> OrmResult<&mut Box<dyn DatabaseLink>> {
        self.master
            .as_mut()
            .ok_or_else(|| OrmError::Connection("connection is not open".to_string()))
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

struct ConnectionInner {
    config: ConnectionConfig,
    driver: Arc<dyn DatabaseDriver>,
    cache: Arc<dyn Cache>,
    status: ServerStatusCache,
    state: Mutex<ConnectionState>,
    after_open: StdMutex<Vec<Callback>>,
    commit_callbacks: StdMutex<Vec<Callback>>,
    rollback_callbacks: StdMutex<Vec<Callback>>,
}

/// A database connection with master/slave routing.
///
/// Cloning produces another handle on the same underlying state (links,
/// transaction, caches). Use `fork` for an independent connection with the
/// same configuration.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a connection using the process-wide cache for dead-server
    /// tracking and query caching.
    pub fn new(config: ConnectionConfig, driver: Arc<dyn DatabaseDriver>) -> Self {
        let cache: Arc<dyn Cache> = PROCESS_CACHE.clone();
        Self::with_cache(config, driver, cache)
    }

    /// Create a connection with an explicit cache collaborator.
    pub fn with_cache(
        config: ConnectionConfig,
        driver: Arc<dyn DatabaseDriver>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        let status = ServerStatusCache::new(Arc::clone(&cache), config.server_retry_interval);
        Self {
            inner: Arc::new(ConnectionInner {
                config,
                driver,
                cache,
                status,
                state: Mutex::new(ConnectionState::new()),
                after_open: StdMutex::new(Vec::new()),
                commit_callbacks: StdMutex::new(Vec::new()),
                rollback_callbacks: StdMutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn dialect(&self) -> SqlDialect {
        self.inner.driver.dialect()
    }

    /// A query builder for this connection's dialect.
    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.dialect())
    }

    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.inner.state.lock().await
    }

    pub(crate) fn savepoints_enabled(&self) -> bool {
        self.inner.config.enable_savepoint
    }

    pub(crate) fn cache_backend(&self) -> Arc<dyn Cache> {
        Arc::clone(&self.inner.cache)
    }

    /// Open the master link. A no-op when already connected.
    ///
    /// With a master pool configured, pool selection picks the node; an
    /// exhausted pool is a fatal configuration-level error, never a silent
    /// degrade. Without a pool the primary server config is dialed
    /// directly.
    pub async fn open(&self) -> OrmResult<()> {
        let mut state = self.lock_state().await;
        self.open_master_locked(&mut state).await
    }

    async fn open_master_locked(&self, state: &mut ConnectionState) -> OrmResult<()> {
        if state.master.is_some() {
            return Ok(());
        }
        let config = &self.inner.config;
        let link = if config.masters.is_empty() {
            self.inner.driver.connect(&config.server).await?
        } else {
            open_from_pool(
                self.inner.driver.as_ref(),
                &config.masters,
                config.master_template.as_ref(),
                config.shuffle_masters,
                &self.inner.status,
            )
            .await
            .map_err(|_| {
                OrmError::Connection("none of the master servers is available".to_string())
            })?
        };
        state.master = Some(link);
        debug!("connection opened");
        // callbacks run under the state lock and must not issue queries on
        // this same connection
        let callbacks = self.inner.after_open.lock().unwrap().clone();
        for callback in callbacks {
            callback();
        }
        Ok(())
    }

    async fn ensure_slave_locked(&self, state: &mut ConnectionState) {
        if !matches!(state.slave, SlaveState::Untried) {
            return;
        }
        let config = &self.inner.config;
        match open_from_pool(
            self.inner.driver.as_ref(),
            &config.slaves,
            config.slave_template.as_ref(),
            true,
            &self.inner.status,
        )
        .await
        {
            Ok(link) => state.slave = SlaveState::Ready(link),
            Err(err) => {
                warn!(error = %err, "no slave available, falling back to master");
                state.slave = SlaveState::Unavailable;
            }
        }
    }

    /// Close all links and reset cached state. The next use reconnects.
    pub async fn close(&self) {
        let mut state = self.lock_state().await;
        if let Some(mut link) = state.master.take() {
            if let Err(err) = link.close().await {
                warn!(error = %err, "error closing master link");
            }
        }
        if let SlaveState::Ready(mut link) =
            std::mem::replace(&mut state.slave, SlaveState::Untried)
        {
            if let Err(err) = link.close().await {
                warn!(error = %err, "error closing slave link");
            }
        }
        state.tx_level = 0;
        state.schema = None;
        state.server_version = None;
        debug!("connection closed");
    }

    pub async fn is_open(&self) -> bool {
        self.lock_state().await.master.is_some()
    }

    pub async fn transaction_level(&self) -> u32 {
        self.lock_state().await.tx_level
    }

    /// Run a closure with slave routing disabled, restoring the previous
    /// routing state afterward even when the closure fails.
    pub async fn use_master<F, Fut, R>(&self, f: F) -> OrmResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = OrmResult<R>>,
    {
        {
            let mut state = self.lock_state().await;
            state.use_master_depth += 1;
        }
        let result = f().await;
        {
            let mut state = self.lock_state().await;
            state.use_master_depth -= 1;
        }
        result
    }

    /// Run a closure with query-result caching enabled.
    ///
    /// The directive governs every cacheable query issued inside the
    /// closure unless a query overrides it; scopes nest, innermost wins.
    pub async fn cache<F, Fut, R>(&self, directive: QueryCacheDirective, f: F) -> OrmResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = OrmResult<R>>,
    {
        self.cache_scope(Some(directive), f).await
    }

    /// Run a closure with query-result caching disabled, overriding any
    /// enclosing cache scope.
    pub async fn no_cache<F, Fut, R>(&self, f: F) -> OrmResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = OrmResult<R>>,
    {
        self.cache_scope(None, f).await
    }

    async fn cache_scope<F, Fut, R>(
        &self,
        entry: Option<QueryCacheDirective>,
        f: F,
    ) -> OrmResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = OrmResult<R>>,
    {
        {
            let mut state = self.lock_state().await;
            state.cache_stack.push(entry);
        }
        let result = f().await;
        {
            let mut state = self.lock_state().await;
            state.cache_stack.pop();
        }
        result
    }

    /// Resolve the cache directive effective for one command: the
    /// command's own override wins, otherwise the innermost cache scope.
    pub(crate) async fn resolve_cache_directive(
        &self,
        override_directive: &Option<Option<QueryCacheDirective>>,
    ) -> Option<QueryCacheDirective> {
        match override_directive {
            Some(Some(directive)) => Some(directive.clone()),
            Some(None) => None,
            None => {
                let state = self.lock_state().await;
                match state.cache_stack.last() {
                    Some(Some(directive)) => Some(directive.clone()),
                    _ => None,
                }
            }
        }
    }

    /// Create a command bound to this connection.
    pub fn create_command(&self, sql: impl Into<String>, params: Vec<DbValue>) -> Command {
        Command::new(self.clone(), sql.into(), params)
    }

    /// Execute a write statement on the master.
    pub(crate) async fn execute_sql(&self, sql: &str, params: &[DbValue]) -> OrmResult<u64> {
        let mut state = self.lock_state().await;
        self.open_master_locked(&mut state).await?;
        let link = state.master_link()?;
        link.execute(sql, params).await
    }

    /// Fetch rows, routed to a slave for plain reads when possible.
    ///
    /// Reads go to the master when slave routing is disabled, a
    /// `use_master` scope is active, a transaction is open, or no slave is
    /// reachable.
    pub(crate) async fn fetch_sql(
        &self,
        sql: &str,
        params: &[DbValue],
        prefer_slave: bool,
    ) -> OrmResult<Vec<Row>> {
        let mut state = self.lock_state().await;
        let use_slave = prefer_slave
            && state.use_master_depth == 0
            && state.tx_level == 0
            && self.inner.config.enable_slaves
            && !self.inner.config.slaves.is_empty();
        if use_slave {
            self.ensure_slave_locked(&mut state).await;
            if let SlaveState::Ready(link) = &mut state.slave {
                return link.fetch_all(sql, params).await;
            }
        }
        self.open_master_locked(&mut state).await?;
        let link = state.master_link()?;
        link.fetch_all(sql, params).await
    }

    pub(crate) async fn last_insert_id(&self, sequence: Option<&str>) -> OrmResult<DbValue> {
        let mut state = self.lock_state().await;
        self.open_master_locked(&mut state).await?;
        let link = state.master_link()?;
        link.last_insert_id(sequence).await
    }

    /// The server version string, memoized after the first call.
    pub async fn server_version(&self) -> OrmResult<String> {
        let mut state = self.lock_state().await;
        if let Some(version) = &state.server_version {
            return Ok(version.clone());
        }
        self.open_master_locked(&mut state).await?;
        let link = state.master_link()?;
        let version = link.server_version().await?;
        state.server_version = Some(version.clone());
        Ok(version)
    }

    /// The schema for this connection, memoized.
    pub async fn schema(&self) -> Arc<Schema> {
        let mut state = self.lock_state().await;
        if let Some(schema) = &state.schema {
            return Arc::clone(schema);
        }
        let schema = Arc::new(Schema::new(
            self.dialect(),
            Arc::clone(&self.inner.cache),
            self.inner.config.schema_cache_exclude.clone(),
        ));
        state.schema = Some(Arc::clone(&schema));
        schema
    }

    /// An independent connection with the same configuration.
    ///
    /// The fork starts fully reset: it reconnects on first use and shares
    /// nothing but configuration, driver, and the cache collaborator. For
    /// in-memory DSNs the driver resolves the same DSN to the same store,
    /// so a fork still reaches the same data.
    pub fn fork(&self) -> Connection {
        Self::with_cache(
            self.inner.config.clone(),
            Arc::clone(&self.inner.driver),
            Arc::clone(&self.inner.cache),
        )
    }

    /// Register a callback fired after the connection opens.
    pub fn on_after_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.after_open.lock().unwrap().push(Arc::new(f));
    }

    /// Register a callback fired when the outermost transaction commits.
    pub fn on_commit<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.commit_callbacks.lock().unwrap().push(Arc::new(f));
    }

    /// Register a callback fired when the outermost transaction rolls back.
    pub fn on_rollback<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.rollback_callbacks.lock().unwrap().push(Arc::new(f));
    }

    pub(crate) fn fire_commit_callbacks(&self) {
        let callbacks = self.inner.commit_callbacks.lock().unwrap().clone();
        for callback in callbacks {
            callback();
        }
    }

    pub(crate) fn fire_rollback_callbacks(&self) {
        let callbacks = self.inner.rollback_callbacks.lock().unwrap().clone();
        for callback in callbacks {
            callback();
        }
    }
}
