use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use folio_store::{
    ContentId, ContentManager, ContentReadApi, ContentResult, ContentWrite, ContentWriteApi,
    FnHook, FolioConfig, FolioError, FolioResult, HookError, HookPipeline, Indexer, Subject,
    View, FAILPOINT_AFTER_VERSION_INSERT,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use serde_json::json;
use tempfile::tempdir;

async fn open(base: &Path) -> FolioResult<ContentManager> {
    let config = FolioConfig::default_sqlite(base.join("folio.sqlite").to_string_lossy());
    ContentManager::connect(&config, base).await
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

fn article(body: &str) -> ContentWrite {
    ContentWrite::with_content_data(json!({"_type": "Article", "body": body}))
}

#[derive(Default)]
struct RecordingIndexer {
    indexed: Mutex<Vec<String>>,
    removed: Mutex<Vec<ContentId>>,
    fail: bool,
}

#[async_trait]
impl Indexer for RecordingIndexer {
    async fn index(&self, result: &ContentResult) -> FolioResult<()> {
        self.indexed
            .lock()
            .expect("indexed")
            .push(result.version.to_string());
        if self.fail {
            return Err(FolioError::storage("index offline"));
        }
        Ok(())
    }

    async fn remove(&self, id: &ContentId) -> FolioResult<()> {
        self.removed.lock().expect("removed").push(id.clone());
        if self.fail {
            return Err(FolioError::storage("index offline"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn aborting_hook_leaves_no_rows_behind() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let mut hooks = HookPipeline::new();
    hooks.register_for(
        "Article",
        Arc::new(FnHook::new("require-title", |write: ContentWrite, _, _| {
            if write
                .content_data()
                .and_then(|data| data.get("title"))
                .is_none()
            {
                return Err(HookError::abort("title is required"));
            }
            Ok(write)
        })),
    );
    let manager = open(dir.path()).await?.with_hooks(hooks);
    let subject = Subject::system();

    match manager.create(article("x"), &subject).await {
        Err(err @ FolioError::HookAborted { .. }) => {
            assert!(err.is_client_error());
            assert!(err.to_string().contains("require-title"));
        }
        other => panic!("expected hook abort, got {other:?}"),
    }
    for table in [
        "folio_content_ids",
        "folio_content_versions",
        "folio_content_views",
        "folio_aspects",
        "folio_changelist",
    ] {
        assert_eq!(count_rows(&manager, table).await?, 0, "{table}");
    }

    let untyped = ContentWrite::with_content_data(json!({"body": "x"}));
    manager.create(untyped, &subject).await?;
    assert_eq!(count_rows(&manager, "folio_content_ids").await?, 1);
    Ok(())
}

#[tokio::test]
async fn hooks_transform_writes_and_see_the_existing_version() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let seen_existing = Arc::new(Mutex::new(Vec::new()));
    let mut hooks = HookPipeline::new();
    hooks.register_all(Arc::new(FnHook::new(
        "stamp-principal",
        |mut write: ContentWrite, _, subject| {
            if let Some(data) = write.content_data_mut() {
                data["stampedBy"] = json!(subject.principal_id);
            }
            Ok(write)
        },
    )));
    hooks.register_all(Arc::new(FnHook::new("flaky", |_, _, _| {
        Err(HookError::failed("lookup service unavailable"))
    })));
    let log = Arc::clone(&seen_existing);
    hooks.register_for(
        "Article",
        Arc::new(FnHook::new(
            "track-existing",
            move |write: ContentWrite, existing: Option<&ContentResult>, _| {
                log.lock()
                    .expect("log")
                    .push(existing.map(|result| result.version.clone()));
                Ok(write)
            },
        )),
    );
    let manager = open(dir.path()).await?.with_hooks(hooks);
    assert_eq!(manager.hooks().len(), 3);
    let subject = Subject::new("carol");

    let created = manager.create(article("x"), &subject).await?;
    assert_eq!(
        created.content_data().and_then(|data| data.get("stampedBy")),
        Some(&json!("carol"))
    );
    let updated = manager
        .update(&created.id, article("y"), &subject)
        .await?
        .expect("existing item");
    assert_eq!(
        updated.content_data().and_then(|data| data.get("body")),
        Some(&json!("y"))
    );

    let seen = seen_existing.lock().expect("log").clone();
    assert_eq!(seen, vec![None, Some(created.version.clone())]);
    Ok(())
}

#[tokio::test]
async fn indexer_receives_writes_and_removals_and_cannot_fail_them() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let indexer = Arc::new(RecordingIndexer::default());
    let manager = open(dir.path())
        .await?
        .with_indexer(indexer.clone() as Arc<dyn Indexer>);
    let subject = Subject::system();

    let created = manager.create(article("x"), &subject).await?;
    let updated = manager
        .update(&created.id, article("y"), &subject)
        .await?
        .expect("existing item");
    manager.delete(&created.id, &subject).await?;

    assert_eq!(
        *indexer.indexed.lock().expect("indexed"),
        vec![created.version.to_string(), updated.version.to_string()]
    );
    assert_eq!(*indexer.removed.lock().expect("removed"), vec![created.id.clone()]);

    let failing = Arc::new(RecordingIndexer {
        fail: true,
        ..RecordingIndexer::default()
    });
    let manager = manager.with_indexer(failing.clone() as Arc<dyn Indexer>);
    let other = manager.create(article("z"), &subject).await?;
    assert_eq!(
        manager.resolve(&other.id, &View::Latest).await?,
        Some(other.version)
    );
    assert_eq!(failing.indexed.lock().expect("indexed").len(), 1);
    Ok(())
}

#[tokio::test]
async fn storage_failure_mid_write_rolls_back_the_version() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = FolioConfig::default_sqlite(base.join("folio.sqlite").to_string_lossy())
        .with_failpoints([FAILPOINT_AFTER_VERSION_INSERT]);
    let manager = ContentManager::connect(&config, base).await?;

    let result = manager.create(article("x"), &Subject::system()).await;
    assert!(matches!(result, Err(FolioError::Storage { .. })));
    for table in [
        "folio_content_ids",
        "folio_content_versions",
        "folio_contents",
        "folio_aspects",
        "folio_content_views",
        "folio_event_queue",
    ] {
        assert_eq!(count_rows(&manager, table).await?, 0, "{table}");
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_updates_serialize_on_the_item() -> FolioResult<()> {
    let dir = tempdir().expect("tempdir");
    let manager = open(dir.path()).await?;
    let subject = Subject::system();
    let created = manager.create(article("0"), &subject).await?;

    let mut tasks = Vec::new();
    for writer in 0..8 {
        let manager = manager.clone();
        let id = created.id.clone();
        tasks.push(tokio::spawn(async move {
            manager
                .force_update(&id, article(&writer.to_string()), &Subject::system())
                .await
        }));
    }
    for task in tasks {
        let result = task.await.expect("writer task")?;
        assert!(result.is_some());
    }

    let history = manager.get_history(&created.id).await?.expect("history");
    assert_eq!(history.versions.len(), 9);
    let holders: Vec<_> = history
        .versions
        .iter()
        .filter(|info| info.views.iter().any(|view| view == "p.latest"))
        .collect();
    assert_eq!(holders.len(), 1);
    assert_eq!(
        manager.resolve(&created.id, &View::Latest).await?,
        Some(holders[0].version.clone())
    );
    assert_eq!(count_rows(&manager, "folio_changelist").await?, 1);
    assert_eq!(count_rows(&manager, "folio_event_queue").await?, 9);
    Ok(())
}
