//! Transaction management
//!
//! A connection carries at most one transaction, tracked by a nesting
//! level: level 0 means no transaction, level 1 is the outermost (native)
//! transaction, and deeper levels are emulated with savepoints named
//! `LEVELn`. Commit and rollback events fire only when the outermost level
//! finalizes.

use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Read Uncommitted - lowest isolation level
    ReadUncommitted,
    /// Read Committed - common default
    ReadCommitted,
    /// Repeatable Read - stronger consistency guarantees
    RepeatableRead,
    /// Serializable - highest isolation level
    Serializable,
}

impl IsolationLevel {
    /// Convert to SQL for SET TRANSACTION ISOLATION LEVEL
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Handle on the connection's active transaction.
///
/// Each `begin_transaction` call returns a new handle one level deeper;
/// handles finalize exactly once. Dropping a handle without finalizing it
/// leaves the level open (the scoped `Connection::transaction` helper is
/// the safe way to pair begin with commit/rollback).
pub struct Transaction {
    conn: Connection,
    done: bool,
}

impl Transaction {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn, done: false }
    }

    /// The connection this transaction runs on.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Current nesting level of the connection's transaction state.
    pub async fn level(&self) -> u32 {
        self.conn.transaction_level().await
    }

    /// Whether this handle can still commit or roll back.
    pub async fn is_active(&self) -> bool {
        !self.done && self.conn.transaction_level().await > 0
    }

    /// Commit this transaction level.
    ///
    /// At the outermost level the native commit runs and commit callbacks
    /// fire. At deeper levels the matching savepoint is released; when the
    /// backend lacks savepoints this is a logged no-op.
    pub async fn commit(&mut self) -> OrmResult<()> {
        if self.done {
            return Err(OrmError::Transaction(
                "transaction has already been finalized".to_string(),
            ));
        }
        let mut state = self.conn.lock_state().await;
        if state.tx_level == 0 {
            return Err(OrmError::Transaction(
                "commit without an active transaction".to_string(),
            ));
        }

        state.tx_level -= 1;
        let remaining = state.tx_level;
        if remaining == 0 {
            let link = state.master_link()?;
            link.commit().await?;
            drop(state);
            debug!("transaction committed");
            self.conn.fire_commit_callbacks();
        } else {
            let enabled = self.conn.savepoints_enabled();
            let link = state.master_link()?;
            if enabled && link.supports_savepoints() {
                let name = savepoint_name(remaining);
                link.release_savepoint(&name).await?;
                debug!(savepoint = %name, "released savepoint");
            } else {
                info!("nested transaction commit skipped: savepoints not supported");
            }
        }
        self.done = true;
        Ok(())
    }

    /// Roll back this transaction level.
    ///
    /// Rolling back an already-finalized transaction is a tolerated no-op,
    /// so a commit whose event handler failed can still be safely unwound.
    /// A nested rollback on a backend without savepoints is a fatal error:
    /// the partial work cannot be undone in isolation, and the caller's
    /// outer handler must be forced to roll back everything.
    pub async fn roll_back(&mut self) -> OrmResult<()> {
        if self.done {
            debug!("rollback on finalized transaction ignored");
            return Ok(());
        }
        let mut state = self.conn.lock_state().await;
        if state.tx_level == 0 {
            debug!("rollback without an active transaction ignored");
            self.done = true;
            return Ok(());
        }

        state.tx_level -= 1;
        let remaining = state.tx_level;
        if remaining == 0 {
            let link = state.master_link()?;
            link.rollback().await?;
            drop(state);
            debug!("transaction rolled back");
            self.conn.fire_rollback_callbacks();
        } else {
            let enabled = self.conn.savepoints_enabled();
            let link = state.master_link()?;
            if enabled && link.supports_savepoints() {
                let name = savepoint_name(remaining);
                link.rollback_to_savepoint(&name).await?;
                debug!(savepoint = %name, "rolled back to savepoint");
            } else {
                self.done = true;
                return Err(OrmError::Transaction(
                    "rollback of a nested transaction is not supported without savepoints"
                        .to_string(),
                ));
            }
        }
        self.done = true;
        Ok(())
    }
}

pub(crate) fn savepoint_name(level: u32) -> String {
    format!("LEVEL{}", level)
}

impl Connection {
    /// Begin a transaction, or open one more nesting level.
    ///
    /// The isolation level only applies when starting the outermost
    /// transaction; nested begins log and ignore it.
    pub async fn begin_transaction(
        &self,
        isolation: Option<IsolationLevel>,
    ) -> OrmResult<Transaction> {
        self.open().await?;
        let mut state = self.lock_state().await;
        let level = state.tx_level;
        if level == 0 {
            let link = state.master_link()?;
            link.begin(isolation).await?;
            debug!(?isolation, "transaction started");
        } else {
            if isolation.is_some() {
                warn!("isolation level ignored for nested transaction");
            }
            let enabled = self.savepoints_enabled();
            let link = state.master_link()?;
            if enabled && link.supports_savepoints() {
                let name = savepoint_name(level);
                link.create_savepoint(&name).await?;
                debug!(savepoint = %name, "created savepoint");
            } else {
                info!("nested transaction started without savepoint support");
            }
        }
        state.tx_level = level + 1;
        drop(state);
        Ok(Transaction::new(self.clone()))
    }

    /// Run a closure inside a transaction.
    ///
    /// Commits only when the transaction is still active at the level it
    /// started at (a closure that finalized it itself is respected). On
    /// error the transaction is rolled back; a failure of the rollback is
    /// logged and never masks the original error.
    pub async fn transaction<F, Fut, R>(
        &self,
        isolation: Option<IsolationLevel>,
        f: F,
    ) -> OrmResult<R>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: std::future::Future<Output = OrmResult<R>>,
    {
        let mut tx = self.begin_transaction(isolation).await?;
        let entry_level = tx.level().await;
        match f(self.clone()).await {
            Ok(result) => {
                if tx.is_active().await && tx.level().await == entry_level {
                    tx.commit().await?;
                }
                Ok(result)
            }
            Err(err) => {
                if tx.is_active().await {
                    if let Err(rollback_err) = tx.roll_back().await {
                        tracing::error!(
                            error = %rollback_err,
                            "rollback failed while unwinding from an error"
                        );
                    }
                }
                Err(err)
            }
        }
    }
}
