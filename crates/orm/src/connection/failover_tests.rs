//! Failover, routing, and query-cache scenarios against the fake driver

use std::sync::Arc;
use std::time::Duration;

use crate::backends::fake::{row, FakeDriver};
use crate::backends::ServerConfig;
use crate::cache::MemoryCache;
use crate::connection::{Connection, ConnectionConfig};
use crate::error::OrmError;
use crate::query::QueryCacheDirective;
use crate::value::DbValue;

fn base_config() -> ConnectionConfig {
    ConnectionConfig::new("fake://primary")
}

fn connect(config: ConnectionConfig, driver: &FakeDriver) -> Connection {
    Connection::with_cache(
        config,
        Arc::new(driver.clone()),
        Arc::new(MemoryCache::new()),
    )
}

#[tokio::test]
async fn test_open_uses_second_master_after_first_fails() {
    let driver = FakeDriver::new();
    driver.fail_dsn("fake://bad");

    let mut config = base_config();
    config.masters = vec![
        ServerConfig::new("fake://bad"),
        ServerConfig::new("fake://good"),
    ];
    config.shuffle_masters = false;
    let conn = connect(config, &driver);

    conn.open().await.unwrap();
    assert!(conn.is_open().await);
    assert_eq!(
        driver.connect_attempts(),
        vec!["fake://bad".to_string(), "fake://good".to_string()]
    );
}

#[tokio::test]
async fn test_open_is_idempotent() {
    let driver = FakeDriver::new();
    let conn = connect(base_config(), &driver);
    conn.open().await.unwrap();
    conn.open().await.unwrap();
    assert_eq!(driver.connect_attempts().len(), 1);
}

#[tokio::test]
async fn test_exhausted_master_pool_is_fatal() {
    let driver = FakeDriver::new();
    driver.fail_dsn("fake://m1");
    driver.fail_dsn("fake://m2");

    let mut config = base_config();
    config.masters = vec![ServerConfig::new("fake://m1"), ServerConfig::new("fake://m2")];
    config.shuffle_masters = false;
    let conn = connect(config, &driver);

    let err = conn.open().await.unwrap_err();
    assert!(matches!(err, OrmError::Connection(_)));
}

#[tokio::test]
async fn test_dead_master_skipped_within_retry_interval() {
    let driver = FakeDriver::new();
    driver.fail_dsn("fake://bad");

    let mut config = base_config();
    config.masters = vec![
        ServerConfig::new("fake://bad"),
        ServerConfig::new("fake://good"),
    ];
    config.shuffle_masters = false;
    config.server_retry_interval = Duration::from_secs(600);
    let conn = connect(config, &driver);

    conn.open().await.unwrap();
    // a forked connection shares the status cache and must skip the dead node
    let fork = conn.fork();
    fork.open().await.unwrap();

    let attempts = driver.connect_attempts();
    let bad_attempts = attempts.iter().filter(|d| *d == "fake://bad").count();
    assert_eq!(bad_attempts, 1);
}

#[tokio::test]
async fn test_dead_master_retried_after_interval_elapses() {
    let driver = FakeDriver::new();
    driver.fail_dsn("fake://bad");

    let mut config = base_config();
    config.masters = vec![
        ServerConfig::new("fake://bad"),
        ServerConfig::new("fake://good"),
    ];
    config.shuffle_masters = false;
    config.server_retry_interval = Duration::from_millis(20);
    let conn = connect(config, &driver);

    conn.open().await.unwrap();
    // the node recovers, but stays skipped until the interval elapses
    driver.heal_dsn("fake://bad");
    tokio::time::sleep(Duration::from_millis(30)).await;
    driver.clear_ops();

    let fork = conn.fork();
    fork.open().await.unwrap();
    assert_eq!(driver.connect_attempts(), vec!["fake://bad".to_string()]);
}

#[tokio::test]
async fn test_reads_route_to_slave_writes_to_master() {
    let driver = FakeDriver::new();
    let mut config = base_config();
    config.slaves = vec![ServerConfig::new("fake://replica")];
    let conn = connect(config, &driver);

    conn.create_command("SELECT 1", vec![]).query_all().await.unwrap();
    assert_eq!(driver.connect_attempts(), vec!["fake://replica".to_string()]);

    conn.create_command("UPDATE t SET a = 1", vec![])
        .execute()
        .await
        .unwrap();
    assert_eq!(
        driver.connect_attempts(),
        vec!["fake://replica".to_string(), "fake://primary".to_string()]
    );
}

#[tokio::test]
async fn test_slave_selection_finds_the_one_reachable_node() {
    let driver = FakeDriver::new();
    driver.fail_dsn("fake://s1");
    driver.fail_dsn("fake://s3");

    let mut config = base_config();
    config.slaves = vec![
        ServerConfig::new("fake://s1"),
        ServerConfig::new("fake://s2"),
        ServerConfig::new("fake://s3"),
    ];
    let conn = connect(config, &driver);

    // one selection pass lands on the reachable node regardless of
    // shuffle order, with no retry loop
    conn.create_command("SELECT 1", vec![]).query_all().await.unwrap();
    let attempts = driver.connect_attempts();
    assert!(attempts.contains(&"fake://s2".to_string()));
    assert!(attempts.len() <= 3);
    assert!(!attempts.contains(&"fake://primary".to_string()));
}

#[tokio::test]
async fn test_unreachable_slave_falls_back_to_master() {
    let driver = FakeDriver::new();
    driver.fail_dsn("fake://replica");

    let mut config = base_config();
    config.slaves = vec![ServerConfig::new("fake://replica")];
    let conn = connect(config, &driver);

    let rows = conn.create_command("SELECT 1", vec![]).query_all().await.unwrap();
    assert!(rows.is_empty());
    assert_eq!(
        driver.connect_attempts(),
        vec!["fake://replica".to_string(), "fake://primary".to_string()]
    );
}

#[tokio::test]
async fn test_use_master_disables_slave_routing_and_restores() {
    let driver = FakeDriver::new();
    let mut config = base_config();
    config.slaves = vec![ServerConfig::new("fake://replica")];
    let conn = connect(config, &driver);

    let inner = conn.clone();
    conn.use_master(|| async move {
        inner
            .create_command("SELECT 1", vec![])
            .query_all()
            .await
            .map(|_| ())
    })
    .await
    .unwrap();
    // the read inside the scope went to the master
    assert_eq!(driver.connect_attempts(), vec!["fake://primary".to_string()]);

    // routing is restored afterward
    conn.create_command("SELECT 1", vec![]).query_all().await.unwrap();
    assert!(driver
        .connect_attempts()
        .contains(&"fake://replica".to_string()));
}

#[tokio::test]
async fn test_reads_inside_transaction_go_to_master() {
    let driver = FakeDriver::new();
    let mut config = base_config();
    config.slaves = vec![ServerConfig::new("fake://replica")];
    let conn = connect(config, &driver);

    let mut tx = conn.begin_transaction(None).await.unwrap();
    conn.create_command("SELECT 1", vec![]).query_all().await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(driver.connect_attempts(), vec!["fake://primary".to_string()]);
}

#[tokio::test]
async fn test_cache_scope_serves_repeat_query_from_cache() {
    let driver = FakeDriver::new();
    driver.push_rows(vec![row(&["n"], vec![DbValue::Int64(1)])]);
    let conn = connect(base_config(), &driver);

    let inner = conn.clone();
    conn.cache(
        QueryCacheDirective::with_duration(Duration::from_secs(60)),
        || async move {
            let first = inner.create_command("SELECT n", vec![]).query_all().await?;
            let second = inner.create_command("SELECT n", vec![]).query_all().await?;
            assert_eq!(first.len(), 1);
            assert_eq!(second.len(), 1);
            assert_eq!(second[0].get("n"), Some(&DbValue::Int64(1)));
            Ok(())
        },
    )
    .await
    .unwrap();

    // only the first execution reached the driver
    assert_eq!(driver.statement_count(), 1);
}

#[tokio::test]
async fn test_no_cache_scope_overrides_outer_cache_scope() {
    let driver = FakeDriver::new();
    let conn = connect(base_config(), &driver);

    let outer = conn.clone();
    conn.cache(
        QueryCacheDirective::with_duration(Duration::from_secs(60)),
        || async move {
            let inner = outer.clone();
            outer
                .no_cache(|| async move {
                    inner.create_command("SELECT n", vec![]).query_all().await?;
                    inner.create_command("SELECT n", vec![]).query_all().await?;
                    Ok(())
                })
                .await
        },
    )
    .await
    .unwrap();

    assert_eq!(driver.statement_count(), 2);
}

#[tokio::test]
async fn test_queries_outside_cache_scope_are_not_cached() {
    let driver = FakeDriver::new();
    let conn = connect(base_config(), &driver);

    conn.create_command("SELECT n", vec![]).query_all().await.unwrap();
    conn.create_command("SELECT n", vec![]).query_all().await.unwrap();
    assert_eq!(driver.statement_count(), 2);
}

#[tokio::test]
async fn test_statement_errors_propagate_without_retry() {
    let driver = FakeDriver::new();
    let conn = connect(base_config(), &driver);

    driver.push_error("relation \"missing\" does not exist");
    let err = conn
        .create_command("SELECT * FROM missing", vec![])
        .query_all()
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Database(_)));
    // the failed statement is not re-issued
    assert_eq!(driver.statement_count(), 1);
}

#[tokio::test]
async fn test_close_resets_and_reconnects() {
    let driver = FakeDriver::new();
    let conn = connect(base_config(), &driver);
    conn.open().await.unwrap();
    conn.close().await;
    assert!(!conn.is_open().await);
    conn.open().await.unwrap();
    assert_eq!(driver.connect_attempts().len(), 2);
}

#[tokio::test]
async fn test_after_open_callback_fires_once_per_open() {
    let driver = FakeDriver::new();
    let conn = connect(base_config(), &driver);
    let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    conn.on_after_open(move || {
        seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    });
    conn.open().await.unwrap();
    conn.open().await.unwrap();
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
}
