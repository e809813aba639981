use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use tokio::sync::mpsc;

use folio_core::{
    ChangeEvent, ChangeFeedApi, ChangeFeedPage, ChangeFeedQuery, ContentHistory, ContentId,
    ContentReadApi, ContentResult, ContentVersionId, ContentWrite, ContentWriteApi,
    DeletedContent, EventType, FolioResult, HookContext, HookPipeline, Indexer, Subject, View,
    METADATA_ASPECT,
};

use crate::feed::ChangeFeed;
use crate::store::{ContentStore, UpdateMode};
use crate::FolioConfig;

const DIMENSIONS_FIELD: &str = "dimensions";

/// Write entry point: pre-store hooks, then the store, then the change feed
/// and indexer.
///
/// Feed and indexer failures are logged and never fail a write that the
/// store has committed.
#[derive(Clone)]
pub struct ContentManager {
    store: ContentStore,
    feed: ChangeFeed,
    hooks: Arc<HookPipeline>,
    indexer: Option<Arc<dyn Indexer>>,
}

impl ContentManager {
    pub async fn connect(config: &FolioConfig, base_dir: &Path) -> FolioResult<Self> {
        let store = ContentStore::connect(config, base_dir).await?;
        let feed = ChangeFeed::open(
            store.connection().clone(),
            store.lookups(),
            config.feed_settings(),
            store.failpoints(),
        )
        .await?;
        Ok(Self::new(store, feed))
    }

    pub fn new(store: ContentStore, feed: ChangeFeed) -> Self {
        Self {
            store,
            feed,
            hooks: Arc::new(HookPipeline::new()),
            indexer: None,
        }
    }

    pub fn with_hooks(mut self, hooks: HookPipeline) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn Indexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }

    async fn run_hooks(
        &self,
        write: ContentWrite,
        existing: Option<&ContentResult>,
        subject: &Subject,
    ) -> FolioResult<ContentWrite> {
        if self.hooks.is_empty() {
            return Ok(write);
        }
        let ctx = HookContext::new(&self.store, subject);
        self.hooks.run(write, existing, &ctx).await
    }

    async fn after_write(&self, event: EventType, result: &ContentResult) {
        if let Err(err) = self.feed.record_event(event, result).await {
            log::warn!("failed to record {event} for {}: {err}", result.version);
        }
        if let Some(indexer) = &self.indexer {
            if let Err(err) = indexer.index(result).await {
                log::warn!("failed to index {}: {err}", result.version);
            }
        }
    }

    async fn after_delete(&self, deleted: &DeletedContent, subject: &Subject) {
        let Some(version) = &deleted.version else {
            return;
        };
        match self.store.get_content(version).await {
            Ok(Some(result)) => {
                if let Err(err) = self.feed.record_delete(&result, subject).await {
                    log::warn!("failed to record DELETE for {version}: {err}");
                }
            }
            Ok(None) => log::warn!("deleted version {version} could not be read back"),
            Err(err) => log::warn!("failed to read deleted version {version}: {err}"),
        }
        if let Some(indexer) = &self.indexer {
            if let Err(err) = indexer.remove(&deleted.id).await {
                log::warn!("failed to remove {} from index: {err}", deleted.id);
            }
        }
    }

    async fn write_update(
        &self,
        id: &ContentId,
        write: ContentWrite,
        subject: &Subject,
        mode: UpdateMode,
    ) -> FolioResult<Option<ContentResult>> {
        let existing = self.store.get_latest(id).await?;
        let write = self.run_hooks(write, existing.as_ref(), subject).await?;
        let Some(result) = self.store.update_content(id, &write, subject, mode).await? else {
            return Ok(None);
        };
        self.after_write(EventType::Update, &result).await;
        Ok(Some(result))
    }
}

#[async_trait]
impl ContentReadApi for ContentManager {
    async fn resolve(&self, id: &ContentId, view: &View) -> FolioResult<Option<ContentVersionId>> {
        self.store.resolve(id, view).await
    }

    async fn resolve_external_id(&self, external_id: &str) -> FolioResult<Option<ContentId>> {
        self.store.resolve_external_id(external_id).await
    }

    async fn get_content(&self, version: &ContentVersionId) -> FolioResult<Option<ContentResult>> {
        self.store.get_content(version).await
    }

    async fn get_history(&self, id: &ContentId) -> FolioResult<Option<ContentHistory>> {
        self.store.get_history(id).await
    }
}

#[async_trait]
impl ContentWriteApi for ContentManager {
    async fn create(&self, write: ContentWrite, subject: &Subject) -> FolioResult<ContentResult> {
        let write = self.run_hooks(write, None, subject).await?;
        let result = self.store.create_content(&write, subject).await?;
        self.after_write(EventType::Create, &result).await;
        Ok(result)
    }

    async fn update(
        &self,
        id: &ContentId,
        write: ContentWrite,
        subject: &Subject,
    ) -> FolioResult<Option<ContentResult>> {
        self.write_update(id, write, subject, UpdateMode::Checked).await
    }

    async fn force_update(
        &self,
        id: &ContentId,
        write: ContentWrite,
        subject: &Subject,
    ) -> FolioResult<Option<ContentResult>> {
        self.write_update(id, write, subject, UpdateMode::Forced).await
    }

    async fn delete(
        &self,
        id: &ContentId,
        subject: &Subject,
    ) -> FolioResult<Option<DeletedContent>> {
        let Some(deleted) = self.store.delete_content(id, subject).await? else {
            return Ok(None);
        };
        self.after_delete(&deleted, subject).await;
        Ok(Some(deleted))
    }

    async fn publish(
        &self,
        id: &ContentId,
        subject: &Subject,
    ) -> FolioResult<Option<ContentVersionId>> {
        self.store.publish_content(id, subject).await
    }

    async fn unpublish(&self, id: &ContentId, _subject: &Subject) -> FolioResult<bool> {
        self.store.unpublish_content(id).await
    }

    async fn duplicate(
        &self,
        id: &ContentId,
        subject: &Subject,
    ) -> FolioResult<Option<ContentResult>> {
        let Some(source) = self.store.get_latest(id).await? else {
            return Ok(None);
        };
        let mut write = source.to_write();
        write.origin = None;
        self.create(write, subject).await.map(Some)
    }

    async fn mark_as(
        &self,
        id: &ContentId,
        field: &str,
        value: &str,
        subject: &Subject,
    ) -> FolioResult<Option<ContentResult>> {
        let Some(current) = self.store.get_latest(id).await? else {
            return Ok(None);
        };
        let mut write = current.to_write();
        let metadata = write
            .aspects
            .entry(METADATA_ASPECT.to_string())
            .or_insert_with(|| json!({}));
        set_dimension(metadata, field, value);
        self.update(id, write, subject).await
    }
}

#[async_trait]
impl ChangeFeedApi for ContentManager {
    async fn query_changes(&self, query: &ChangeFeedQuery) -> FolioResult<ChangeFeedPage> {
        self.feed.query_changes(query).await
    }

    async fn subscribe_changes(
        &self,
        query: ChangeFeedQuery,
    ) -> FolioResult<mpsc::Receiver<ChangeEvent>> {
        self.feed.subscribe_changes(query).await
    }
}

/// Sets `metadata.dimensions[field] = value`, replacing non-object values.
fn set_dimension(metadata: &mut JsonValue, field: &str, value: &str) {
    if !metadata.is_object() {
        *metadata = JsonValue::Object(Map::new());
    }
    let Some(object) = metadata.as_object_mut() else {
        return;
    };
    let dimensions = object
        .entry(DIMENSIONS_FIELD)
        .or_insert_with(|| JsonValue::Object(Map::new()));
    if !dimensions.is_object() {
        *dimensions = JsonValue::Object(Map::new());
    }
    if let Some(dimensions) = dimensions.as_object_mut() {
        dimensions.insert(field.to_string(), JsonValue::String(value.to_string()));
    }
}
