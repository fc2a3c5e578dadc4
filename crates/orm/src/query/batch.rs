//! Batched result iteration
//!
//! Fetches a large result set in fixed-size chunks by re-running the query
//! with increasing offsets. Offset paging is simple and needs no server
//! cursor, but the cost of each page grows with its offset (O(n²) over a
//! full scan) and concurrent writes can shift rows between pages; callers
//! needing a stable snapshot should iterate inside a transaction.

use std::collections::VecDeque;

use crate::connection::Connection;
use crate::error::OrmResult;
use crate::row::Row;

use super::select::Query;

/// Chunked iteration over a query's result set.
pub struct BatchQuery {
    query: Query,
    conn: Connection,
    batch_size: u64,
    offset: u64,
    done: bool,
    /// Buffer for row-at-a-time iteration
    pending: VecDeque<Row>,
}

impl BatchQuery {
    pub(crate) fn new(query: Query, conn: Connection, batch_size: u64) -> Self {
        Self {
            query,
            conn,
            batch_size: batch_size.max(1),
            offset: 0,
            done: false,
            pending: VecDeque::new(),
        }
    }

    /// Fetch the next chunk of rows, or `None` when exhausted.
    pub async fn next_batch(&mut self) -> OrmResult<Option<Vec<Row>>> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .query
            .clone()
            .limit(self.batch_size)
            .offset(self.offset)
            .all(&self.conn)
            .await?
            .into_rows();
        self.offset += self.batch_size;
        if (page.len() as u64) < self.batch_size {
            self.done = true;
        }
        if page.is_empty() {
            return Ok(None);
        }
        Ok(Some(page))
    }

    /// Fetch the next single row, pulling a new chunk when the buffer runs
    /// dry.
    pub async fn next_row(&mut self) -> OrmResult<Option<Row>> {
        if let Some(row) = self.pending.pop_front() {
            return Ok(Some(row));
        }
        match self.next_batch().await? {
            Some(rows) => {
                self.pending = rows.into();
                Ok(self.pending.pop_front())
            }
            None => Ok(None),
        }
    }

    /// Restart iteration from the first row.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.done = false;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backends::fake::{row, FakeDriver};
    use crate::connection::{Connection, ConnectionConfig};
    use crate::value::DbValue;

    fn connection(driver: &FakeDriver) -> Connection {
        Connection::with_cache(
            ConnectionConfig::new("fake://primary"),
            Arc::new(driver.clone()),
            Arc::new(crate::cache::MemoryCache::new()),
        )
    }

    fn id_row(id: i64) -> Row {
        row(&["id"], vec![DbValue::Int64(id)])
    }

    #[tokio::test]
    async fn test_batches_advance_offset() {
        let driver = FakeDriver::new();
        let conn = connection(&driver);
        driver.push_rows(vec![id_row(1), id_row(2)]);
        driver.push_rows(vec![id_row(3)]);

        let query = Query::new().from("t");
        let mut batches = query.batch(&conn, 2);

        let first = batches.next_batch().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        // a short page ends iteration
        let second = batches.next_batch().await.unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert!(batches.next_batch().await.unwrap().is_none());

        let sql = driver.fetched_sql();
        assert!(sql[0].contains("LIMIT 2 OFFSET 0"));
        assert!(sql[1].contains("LIMIT 2 OFFSET 2"));
    }

    #[tokio::test]
    async fn test_each_row_iteration() {
        let driver = FakeDriver::new();
        let conn = connection(&driver);
        driver.push_rows(vec![id_row(1), id_row(2)]);
        driver.push_rows(vec![]);

        let query = Query::new().from("t");
        let mut batches = query.batch(&conn, 2);

        let mut seen = Vec::new();
        while let Some(row) = batches.next_row().await.unwrap() {
            seen.push(row.get("id").unwrap().as_i64().unwrap());
        }
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_reset_restarts_from_first_page() {
        let driver = FakeDriver::new();
        let conn = connection(&driver);
        driver.push_rows(vec![id_row(1)]);
        driver.push_rows(vec![id_row(1)]);

        let query = Query::new().from("t");
        let mut batches = query.batch(&conn, 5);
        assert!(batches.next_batch().await.unwrap().is_some());
        assert!(batches.next_batch().await.unwrap().is_none());

        batches.reset();
        assert!(batches.next_batch().await.unwrap().is_some());
        let sql = driver.fetched_sql();
        assert!(sql[0].contains("OFFSET 0"));
        assert!(sql[1].contains("OFFSET 0"));
    }
}
