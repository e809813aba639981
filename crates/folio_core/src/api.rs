use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    ContentHistory, ContentId, ContentResult, ContentVersionId, ContentWrite, DeletedContent,
    FolioResult, Subject, View,
};

#[async_trait]
pub trait ContentReadApi: Send + Sync {
    /// Newest version of `id` currently holding `view`.
    async fn resolve(&self, id: &ContentId, view: &View) -> FolioResult<Option<ContentVersionId>>;

    async fn resolve_external_id(&self, external_id: &str) -> FolioResult<Option<ContentId>>;

    async fn get_content(&self, version: &ContentVersionId)
        -> FolioResult<Option<ContentResult>>;

    async fn get_history(&self, id: &ContentId) -> FolioResult<Option<ContentHistory>>;

    async fn resolve_external(
        &self,
        external_id: &str,
        view: &View,
    ) -> FolioResult<Option<ContentVersionId>> {
        match self.resolve_external_id(external_id).await? {
            Some(id) => self.resolve(&id, view).await,
            None => Ok(None),
        }
    }

    async fn get_latest(&self, id: &ContentId) -> FolioResult<Option<ContentResult>> {
        match self.resolve(id, &View::Latest).await? {
            Some(version) => self.get_content(&version).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
pub trait ContentWriteApi: Send + Sync {
    async fn create(&self, write: ContentWrite, subject: &Subject) -> FolioResult<ContentResult>;

    /// Rejects the write with a conflict when `write.origin` is set and no
    /// longer holds `p.latest`.
    async fn update(
        &self,
        id: &ContentId,
        write: ContentWrite,
        subject: &Subject,
    ) -> FolioResult<Option<ContentResult>>;

    async fn force_update(
        &self,
        id: &ContentId,
        write: ContentWrite,
        subject: &Subject,
    ) -> FolioResult<Option<ContentResult>>;

    async fn delete(&self, id: &ContentId, subject: &Subject)
        -> FolioResult<Option<DeletedContent>>;

    async fn publish(&self, id: &ContentId, subject: &Subject)
        -> FolioResult<Option<ContentVersionId>>;

    async fn unpublish(&self, id: &ContentId, subject: &Subject) -> FolioResult<bool>;

    async fn duplicate(&self, id: &ContentId, subject: &Subject)
        -> FolioResult<Option<ContentResult>>;

    async fn mark_as(
        &self,
        id: &ContentId,
        field: &str,
        value: &str,
        subject: &Subject,
    ) -> FolioResult<Option<ContentResult>>;
}

/// Receives post-write results. Failures never affect the write.
#[async_trait]
pub trait Indexer: Send + Sync {
    async fn index(&self, result: &ContentResult) -> FolioResult<()>;
    async fn remove(&self, id: &ContentId) -> FolioResult<()>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Create => "CREATE",
            EventType::Update => "UPDATE",
            EventType::Delete => "DELETE",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "CREATE" => Some(EventType::Create),
            "UPDATE" => Some(EventType::Update),
            "DELETE" => Some(EventType::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Empty filter lists disable that filter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeFeedQuery {
    /// Return rows with a commit id strictly greater than this.
    pub cursor_commit_id: Option<i64>,
    /// Epoch millis; ignored when a cursor is given.
    pub changed_since: Option<i64>,
    pub content_types: Vec<String>,
    pub object_types: Vec<String>,
    pub partitions: Vec<String>,
    pub event_types: Vec<String>,
    pub max_rows: Option<u32>,
}

impl ChangeFeedQuery {
    pub fn after(cursor_commit_id: i64) -> Self {
        Self {
            cursor_commit_id: Some(cursor_commit_id),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub content_id: ContentId,
    pub content_version_id: ContentVersionId,
    pub commit_id: i64,
    pub commit_time: i64,
    pub event_type: String,
    pub object_type: Option<String>,
    pub content_type: String,
    pub creation_time: i64,
    pub creator: String,
    pub modification_time: i64,
    pub modifier: String,
    pub security_parent_id: Option<String>,
    pub insertion_parent_id: Option<String>,
    pub partitions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeFeedPage {
    pub run_time: i64,
    pub max_commit_id: i64,
    pub num_found: usize,
    pub size: usize,
    pub events: Vec<ChangeEvent>,
}

#[async_trait]
pub trait ChangeFeedApi: Send + Sync {
    async fn query_changes(&self, query: &ChangeFeedQuery) -> FolioResult<ChangeFeedPage>;

    /// Streams events matching `query`, polling from its cursor onwards.
    async fn subscribe_changes(
        &self,
        query: ChangeFeedQuery,
    ) -> FolioResult<tokio::sync::mpsc::Receiver<ChangeEvent>>;
}

#[cfg(test)]
mod tests {
    use super::{ChangeFeedQuery, EventType};

    #[test]
    fn event_type_names_roundtrip() {
        for event in [EventType::Create, EventType::Update, EventType::Delete] {
            assert_eq!(EventType::from_name(event.as_str()), Some(event));
        }
        assert_eq!(EventType::from_name("PUBLISH"), None);
    }

    #[test]
    fn query_deserializes_with_defaults() {
        let query: ChangeFeedQuery =
            serde_json::from_str(r#"{"cursorCommitId": 4, "partitions": ["news"]}"#)
                .expect("query");
        assert_eq!(query.cursor_commit_id, Some(4));
        assert_eq!(query.partitions, vec!["news".to_string()]);
        assert!(query.event_types.is_empty());
        assert_eq!(query.max_rows, None);
    }
}
