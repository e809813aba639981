use std::collections::HashSet;

use folio_store::{ContentStore, FolioConfig, FolioError, FolioResult, View};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use tempfile::tempdir;

async fn list_tables(store: &ContentStore) -> FolioResult<HashSet<String>> {
    let rows = store
        .connection()
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type = 'table'",
        ))
        .await
        .map_err(FolioError::from)?;
    let mut tables = HashSet::new();
    for row in rows {
        let name: String = row.try_get("", "name").map_err(FolioError::from)?;
        tables.insert(name);
    }
    Ok(tables)
}

#[tokio::test]
async fn sqlite_migrations_create_content_and_feed_tables() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = FolioConfig::default_sqlite(base.join("folio.sqlite").to_string_lossy());
    let store = ContentStore::connect(&config, base).await?;
    let tables = list_tables(&store).await?;
    for table in [
        "folio_id_types",
        "folio_views",
        "folio_event_types",
        "folio_attributes",
        "folio_aliases",
        "folio_content_ids",
        "folio_content_versions",
        "folio_contents",
        "folio_aspects",
        "folio_aspect_locations",
        "folio_content_views",
        "folio_content_aliases",
        "folio_changelist",
        "folio_changelist_attributes",
        "folio_event_queue",
    ] {
        assert!(tables.contains(table), "missing table {table}");
    }
    Ok(())
}

#[tokio::test]
async fn reconnecting_keeps_seeded_lookups_intact() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = FolioConfig::default_sqlite(base.join("folio.sqlite").to_string_lossy());
    let first = ContentStore::connect(&config, base).await?;
    let tables = first.lookups().snapshot();
    assert_eq!(tables.views.len(), 3);
    assert_eq!(tables.event_types.len(), 3);
    assert_eq!(tables.attributes.len(), 8);
    drop(first);

    let second = ContentStore::connect(&config, base).await?;
    let tables = second.lookups().snapshot();
    assert_eq!(tables.views.len(), 3);
    assert!(tables.view_id(&View::Public).is_some());
    assert_eq!(tables.id_types.id("onecms"), Some(1));
    assert_eq!(tables.aliases.id("externalId"), Some(1));

    second.refresh_lookups().await?;
    assert_eq!(second.lookups().snapshot().views.len(), 3);
    Ok(())
}
