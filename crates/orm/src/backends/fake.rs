//! Scriptable in-memory driver for tests
//!
//! Records every driver call and answers queries from a scripted response
//! queue, so failover, transaction-nesting, and eager-loading behavior can
//! be asserted without a live server.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::core::{DatabaseDriver, DatabaseLink, ServerConfig, SqlDialect};
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::transaction::IsolationLevel;
use crate::value::DbValue;

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FakeOp {
    Connect(String),
    Execute(String),
    Fetch(String),
    Begin,
    Commit,
    Rollback,
    CreateSavepoint(String),
    ReleaseSavepoint(String),
    RollbackToSavepoint(String),
    Close,
}

/// Scripted answer for the next fetch/execute call.
#[derive(Debug, Clone)]
pub(crate) enum FakeResponse {
    Rows(Vec<Row>),
    Affected(u64),
    Error(String),
}

#[derive(Default)]
pub(crate) struct FakeShared {
    pub fail_dsns: Mutex<HashSet<String>>,
    pub ops: Mutex<Vec<FakeOp>>,
    pub responses: Mutex<VecDeque<FakeResponse>>,
    pub savepoints_supported: AtomicBool,
    pub next_insert_id: AtomicI64,
}

/// Scriptable fake driver.
#[derive(Clone)]
pub(crate) struct FakeDriver {
    pub shared: Arc<FakeShared>,
}

impl FakeDriver {
    pub fn new() -> Self {
        let shared = FakeShared {
            savepoints_supported: AtomicBool::new(true),
            next_insert_id: AtomicI64::new(1),
            ..Default::default()
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Make connect attempts to the given DSN fail.
    pub fn fail_dsn(&self, dsn: &str) {
        self.shared.fail_dsns.lock().unwrap().insert(dsn.to_string());
    }

    /// Make connect attempts to the given DSN succeed again.
    pub fn heal_dsn(&self, dsn: &str) {
        self.shared.fail_dsns.lock().unwrap().remove(dsn);
    }

    pub fn set_savepoints_supported(&self, supported: bool) {
        self.shared
            .savepoints_supported
            .store(supported, Ordering::SeqCst);
    }

    /// Queue a rowset answer for the next fetch.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.shared
            .responses
            .lock()
            .unwrap()
            .push_back(FakeResponse::Rows(rows));
    }

    /// Queue an affected-count answer for the next execute.
    pub fn push_affected(&self, count: u64) {
        self.shared
            .responses
            .lock()
            .unwrap()
            .push_back(FakeResponse::Affected(count));
    }

    /// Queue an error answer for the next fetch/execute.
    pub fn push_error(&self, message: &str) {
        self.shared
            .responses
            .lock()
            .unwrap()
            .push_back(FakeResponse::Error(message.to_string()));
    }

    pub fn ops(&self) -> Vec<FakeOp> {
        self.shared.ops.lock().unwrap().clone()
    }

    pub fn connect_attempts(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                FakeOp::Connect(dsn) => Some(dsn),
                _ => None,
            })
            .collect()
    }

    /// Number of statements that reached a link (fetches + executes).
    pub fn statement_count(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, FakeOp::Execute(_) | FakeOp::Fetch(_)))
            .count()
    }

    pub fn fetched_sql(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                FakeOp::Fetch(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                FakeOp::Execute(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn clear_ops(&self) {
        self.shared.ops.lock().unwrap().clear();
    }
}

#[async_trait]
impl DatabaseDriver for FakeDriver {
    async fn connect(&self, config: &ServerConfig) -> OrmResult<Box<dyn DatabaseLink>> {
        self.shared
            .ops
            .lock()
            .unwrap()
            .push(FakeOp::Connect(config.dsn.clone()));
        if self.shared.fail_dsns.lock().unwrap().contains(&config.dsn) {
            return Err(OrmError::Connection(format!(
                "fake server '{}' is unreachable",
                config.dsn
            )));
        }
        Ok(Box::new(FakeLink {
            dsn: config.dsn.clone(),
            shared: Arc::clone(&self.shared),
        }))
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }
}

pub(crate) struct FakeLink {
    #[allow(dead_code)]
    pub dsn: String,
    shared: Arc<FakeShared>,
}

impl FakeLink {
    fn record(&self, op: FakeOp) {
        self.shared.ops.lock().unwrap().push(op);
    }

    fn pop_response(&self) -> Option<FakeResponse> {
        self.shared.responses.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl DatabaseLink for FakeLink {
    async fn execute(&mut self, sql: &str, _params: &[DbValue]) -> OrmResult<u64> {
        self.record(FakeOp::Execute(sql.to_string()));
        match self.pop_response() {
            Some(FakeResponse::Affected(n)) => Ok(n),
            Some(FakeResponse::Rows(_)) | None => Ok(1),
            Some(FakeResponse::Error(msg)) => Err(OrmError::Database(msg)),
        }
    }

    async fn fetch_all(&mut self, sql: &str, _params: &[DbValue]) -> OrmResult<Vec<Row>> {
        self.record(FakeOp::Fetch(sql.to_string()));
        match self.pop_response() {
            Some(FakeResponse::Rows(rows)) => Ok(rows),
            Some(FakeResponse::Affected(_)) | None => Ok(Vec::new()),
            Some(FakeResponse::Error(msg)) => Err(OrmError::Database(msg)),
        }
    }

    async fn begin(&mut self, _isolation: Option<IsolationLevel>) -> OrmResult<()> {
        self.record(FakeOp::Begin);
        Ok(())
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.record(FakeOp::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.record(FakeOp::Rollback);
        Ok(())
    }

    fn supports_savepoints(&self) -> bool {
        self.shared.savepoints_supported.load(Ordering::SeqCst)
    }

    async fn create_savepoint(&mut self, name: &str) -> OrmResult<()> {
        self.record(FakeOp::CreateSavepoint(name.to_string()));
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> OrmResult<()> {
        self.record(FakeOp::ReleaseSavepoint(name.to_string()));
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> OrmResult<()> {
        self.record(FakeOp::RollbackToSavepoint(name.to_string()));
        Ok(())
    }

    async fn last_insert_id(&mut self, _sequence: Option<&str>) -> OrmResult<DbValue> {
        Ok(DbValue::Int64(
            self.shared.next_insert_id.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn ping(&mut self) -> OrmResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> OrmResult<()> {
        self.record(FakeOp::Close);
        Ok(())
    }
}

/// Build a row from parallel column/value slices.
pub(crate) fn row(columns: &[&str], values: Vec<DbValue>) -> Row {
    Row::new(columns.iter().map(|c| c.to_string()).collect(), values)
}
