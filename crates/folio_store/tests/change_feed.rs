use std::path::Path;
use std::time::Duration;

use folio_store::{
    ChangeFeedApi, ChangeFeedQuery, ContentManager, ContentReadApi, ContentWrite, ContentWriteApi,
    FolioConfig, FolioError, FolioResult, Subject, View, DEFAULT_CONTENT_TYPE,
    FAILPOINT_CHANGE_FEED_RECORD, INSERTION_INFO_ASPECT,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use serde_json::json;
use tempfile::tempdir;
use tokio::time::timeout;

fn config(base: &Path) -> FolioConfig {
    let mut config = FolioConfig::default_sqlite(base.join("folio.sqlite").to_string_lossy());
    if let Some(feed) = config.feed.as_mut() {
        feed.poll_interval_ms = Some(20);
    }
    config
}

async fn open(base: &Path) -> FolioResult<ContentManager> {
    ContentManager::connect(&config(base), base).await
}

async fn count_rows(manager: &ContentManager, table: &str) -> FolioResult<i64> {
    let row = manager
        .store()
        .connection()
        .query_one(Statement::from_string(
            DatabaseBackend::Sqlite,
            format!("SELECT COUNT(*) AS n FROM {table}"),
        ))
        .await
        .map_err(FolioError::from)?
        .ok_or_else(|| FolioError::storage("count returned no row"))?;
    row.try_get::<i64>("", "n").map_err(FolioError::from)
}

fn typed(content_type: &str, partition: &str) -> ContentWrite {
    ContentWrite::with_content_data(json!({"_type": content_type, "partition": partition}))
}

#[tokio::test]
async fn repeated_updates_keep_one_row_per_item_but_every_audit_entry() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let manager = open(dir.path()).await?;
    let subject = Subject::system();

    let created = manager.create(typed("Article", "news"), &subject).await?;
    manager
        .update(&created.id, typed("Article", "news"), &subject)
        .await?;
    manager
        .update(&created.id, typed("Article", "sport"), &subject)
        .await?;

    assert_eq!(count_rows(&manager, "folio_changelist").await?, 1);
    assert_eq!(count_rows(&manager, "folio_event_queue").await?, 3);

    let page = manager.query_changes(&ChangeFeedQuery::default()).await?;
    assert_eq!(page.size, 1);
    assert_eq!(page.num_found, 1);
    assert_eq!(page.events[0].commit_id, 3);
    assert_eq!(page.events[0].partitions, vec!["sport".to_string()]);
    Ok(())
}

#[tokio::test]
async fn cursor_beyond_max_is_rejected_and_max_is_empty() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let manager = open(dir.path()).await?;
    let subject = Subject::system();
    manager.create(typed("Article", "news"), &subject).await?;
    manager.create(typed("Image", "news"), &subject).await?;

    let max = manager.feed().max_commit_id();
    assert_eq!(max, 2);
    match manager.query_changes(&ChangeFeedQuery::after(max + 1)).await {
        Err(err @ FolioError::CursorOutOfRange { .. }) => assert!(err.is_client_error()),
        other => panic!("expected cursor error, got {other:?}"),
    }

    let page = manager.query_changes(&ChangeFeedQuery::after(max)).await?;
    assert!(page.events.is_empty());
    assert_eq!(page.max_commit_id, max);

    let page = manager.query_changes(&ChangeFeedQuery::after(1)).await?;
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].commit_id, 2);
    Ok(())
}

#[tokio::test]
async fn filters_narrow_by_type_object_partition_and_event() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let manager = open(dir.path()).await?;
    let subject = Subject::new("editor");

    let article = manager
        .create(
            typed("Article", "news").aspect(
                INSERTION_INFO_ASPECT,
                json!({"securityParentId": "site:1", "insertParentId": "dept:9"}),
            ),
            &subject,
        )
        .await?;
    let image = manager.create(typed("OneImageBean", "sport"), &subject).await?;
    let page_item = manager.create(typed("Page", "news"), &subject).await?;
    manager.delete(&page_item.id, &subject).await?;

    let all = manager.query_changes(&ChangeFeedQuery::default()).await?;
    assert_eq!(all.events.len(), 3);
    let first = &all.events[0];
    assert_eq!(first.content_id, article.id);
    assert_eq!(first.security_parent_id.as_deref(), Some("site:1"));
    assert_eq!(first.insertion_parent_id.as_deref(), Some("dept:9"));
    assert_eq!(first.creator, "editor");
    assert!(all.events.windows(2).all(|pair| pair[0].commit_id < pair[1].commit_id));

    let query = ChangeFeedQuery {
        object_types: vec!["image".to_string()],
        ..ChangeFeedQuery::default()
    };
    let page = manager.query_changes(&query).await?;
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].content_id, image.id);

    let query = ChangeFeedQuery {
        partitions: vec!["news".to_string()],
        ..ChangeFeedQuery::default()
    };
    let page = manager.query_changes(&query).await?;
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].content_id, article.id);

    let query = ChangeFeedQuery {
        object_types: vec!["article".to_string(), "image".to_string()],
        partitions: vec!["sport".to_string()],
        ..ChangeFeedQuery::default()
    };
    let page = manager.query_changes(&query).await?;
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].content_id, image.id);

    let query = ChangeFeedQuery {
        content_types: vec!["Article".to_string(), "Page".to_string()],
        ..ChangeFeedQuery::default()
    };
    assert_eq!(manager.query_changes(&query).await?.events.len(), 2);

    let query = ChangeFeedQuery {
        event_types: vec!["DELETE".to_string()],
        ..ChangeFeedQuery::default()
    };
    let page = manager.query_changes(&query).await?;
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].content_id, page_item.id);
    assert_eq!(page.events[0].modifier, "editor");

    let query = ChangeFeedQuery {
        event_types: vec!["PUBLISH".to_string()],
        ..ChangeFeedQuery::default()
    };
    let page = manager.query_changes(&query).await?;
    assert!(page.events.is_empty());
    assert_eq!(page.max_commit_id, 4);

    let query = ChangeFeedQuery {
        max_rows: Some(2),
        ..ChangeFeedQuery::default()
    };
    assert_eq!(manager.query_changes(&query).await?.events.len(), 2);

    let query = ChangeFeedQuery {
        changed_since: Some(i64::MAX),
        ..ChangeFeedQuery::default()
    };
    assert!(manager.query_changes(&query).await?.events.is_empty());
    Ok(())
}

#[tokio::test]
async fn feed_failure_does_not_undo_the_content_write() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = config(base).with_failpoints([FAILPOINT_CHANGE_FEED_RECORD]);
    let manager = ContentManager::connect(&config, base).await?;
    let subject = Subject::system();

    let created = manager.create(typed("Article", "news"), &subject).await?;
    assert_eq!(
        manager.resolve(&created.id, &View::Latest).await?,
        Some(created.version.clone())
    );
    assert_eq!(count_rows(&manager, "folio_changelist").await?, 0);
    assert_eq!(count_rows(&manager, "folio_event_queue").await?, 0);
    assert_eq!(manager.feed().max_commit_id(), 0);
    Ok(())
}

#[tokio::test]
async fn commit_counter_resumes_from_storage() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let subject = Subject::system();
    {
        let manager = open(base).await?;
        manager.create(typed("Article", "news"), &subject).await?;
        manager.create(typed("Article", "news"), &subject).await?;
    }

    let manager = open(base).await?;
    assert_eq!(manager.feed().max_commit_id(), 2);
    manager.create(typed("Article", "news"), &subject).await?;
    let page = manager.query_changes(&ChangeFeedQuery::after(2)).await?;
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].commit_id, 3);
    Ok(())
}

#[tokio::test]
async fn subscription_streams_new_events_in_commit_order() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let manager = open(dir.path()).await?;
    let subject = Subject::system();
    manager.create(typed("Article", "old"), &subject).await?;

    let cursor = manager.feed().max_commit_id();
    let mut events = manager
        .subscribe_changes(ChangeFeedQuery::after(cursor))
        .await?;
    let first = manager.create(typed("Article", "news"), &subject).await?;
    let second = manager.create(typed("Image", "news"), &subject).await?;

    let mut received = Vec::new();
    while received.len() < 2 {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event within timeout")
            .expect("subscription open");
        received.push(event);
    }
    assert_eq!(received[0].content_id, first.id);
    assert_eq!(received[1].content_id, second.id);
    assert!(received[0].commit_id > cursor);

    let rejected = manager
        .subscribe_changes(ChangeFeedQuery::after(cursor + 100))
        .await;
    assert!(matches!(rejected, Err(FolioError::CursorOutOfRange { .. })));
    Ok(())
}

#[tokio::test]
async fn untyped_writes_report_the_default_type_with_an_epoch_run_time() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let manager = open(dir.path()).await?;
    let subject = Subject::system();

    let before = folio_store::now_millis();
    let empty = manager.query_changes(&ChangeFeedQuery::default()).await?;
    assert!(empty.run_time >= before, "run_time {} before {before}", empty.run_time);
    assert_eq!(empty.size, 0);

    manager
        .create(ContentWrite::with_content_data(json!({"title": "untyped"})), &subject)
        .await?;
    let before = folio_store::now_millis();
    let page = manager.query_changes(&ChangeFeedQuery::default()).await?;
    assert!(page.run_time >= before, "run_time {} before {before}", page.run_time);
    assert!(page.run_time <= folio_store::now_millis());

    let event = &page.events[0];
    assert_eq!(event.content_type, DEFAULT_CONTENT_TYPE);
    assert_eq!(event.object_type.as_deref(), Some(DEFAULT_CONTENT_TYPE));
    Ok(())
}
