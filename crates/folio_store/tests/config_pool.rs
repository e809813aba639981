use std::time::Duration;

use folio_store::{DatabaseConfig, FolioConfig, PoolConfig};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn deserializes_pool_and_feed_settings() {
    let payload = json!({
        "database": { "backend": "sqlite", "path": "data.sqlite" },
        "pool": {
            "max_connections": 20,
            "min_connections": 2,
            "connect_timeout_ms": 1000,
            "acquire_timeout_ms": 500,
            "idle_timeout_ms": 60000
        },
        "ids": { "base_time_ms": 1_600_000_000_000i64 },
        "feed": { "max_rows": 50, "poll_interval_ms": 20 },
        "failpoints": ["change_feed_record"]
    });
    let config: FolioConfig = serde_json::from_value(payload).expect("config");
    match &config.database {
        DatabaseConfig::Sqlite { path } => {
            assert_eq!(path.as_deref(), Some("data.sqlite"));
        }
        _ => panic!("expected sqlite backend"),
    }
    let pool: &PoolConfig = config.pool.as_ref().expect("pool");
    assert_eq!(pool.max_connections, Some(20));
    assert_eq!(pool.min_connections, Some(2));
    assert_eq!(pool.connect_timeout_ms, Some(1000));
    assert_eq!(pool.acquire_timeout_ms, Some(500));
    assert_eq!(pool.idle_timeout_ms, Some(60000));

    assert_eq!(config.base_time_ms(), 1_600_000_000_000);
    let feed = config.feed_settings();
    assert_eq!(feed.default_rows, 100);
    assert_eq!(feed.max_rows, 50);
    assert_eq!(feed.poll_interval, Duration::from_millis(20));
    assert_eq!(feed.clamp_rows(Some(500)), 50);
    assert_eq!(
        config.failpoints.as_deref(),
        Some(&["change_feed_record".to_string()][..])
    );
}

#[test]
fn postgres_config_exposes_its_url() {
    let payload = json!({
        "database": { "backend": "postgres", "url": "postgres://folio@localhost/folio" }
    });
    let config: FolioConfig = serde_json::from_value(payload).expect("config");
    assert_eq!(config.backend_name(), "postgres");
    assert_eq!(
        config.connection_url(),
        Some("postgres://folio@localhost/folio")
    );
    assert!(config.sqlite_path(std::path::Path::new("/tmp")).is_err());
}

#[test]
fn load_or_init_writes_then_rereads_the_config_file() {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let created = folio_store::load_or_init_config(base).expect("create");
    assert!(created.pool.is_none());
    assert_eq!(created.backend_name(), "sqlite");

    let reread = folio_store::load_or_init_config(base).expect("reread");
    assert_eq!(
        reread.sqlite_path(base).expect("path"),
        folio_store::default_sqlite_path(base)
    );
}
