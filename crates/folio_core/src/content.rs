use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{ContentId, ContentVersionId};

pub const CONTENT_DATA_ASPECT: &str = "contentData";
pub const METADATA_ASPECT: &str = "atex.Metadata";
pub const INSERTION_INFO_ASPECT: &str = "atex.InsertionInfo";
pub const TYPE_FIELD: &str = "_type";
pub const DEFAULT_CONTENT_TYPE: &str = "com.atex.standard.content.ContentBean";
pub const EXTERNAL_ID_NAMESPACE: &str = "externalId";
pub const SYSTEM_PRINCIPAL: &str = "system";

/// The acting principal stamped on every write.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub principal_id: String,
}

impl Subject {
    pub fn new(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
        }
    }

    pub fn system() -> Self {
        Self::new(SYSTEM_PRINCIPAL)
    }
}

impl Default for Subject {
    fn default() -> Self {
        Self::system()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ContentOperation {
    SetAlias { namespace: String, alias: String },
}

/// A pending create or update.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentWrite {
    /// Caller-supplied `delegationId:key` for creates; generated when absent.
    pub id: Option<String>,
    /// Version the caller based this write on; checked by non-forced updates.
    pub origin: Option<ContentVersionId>,
    pub aspects: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub operations: Vec<ContentOperation>,
}

impl ContentWrite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_data(data: JsonValue) -> Self {
        Self::new().aspect(CONTENT_DATA_ASPECT, data)
    }

    pub fn aspect(mut self, name: impl Into<String>, data: JsonValue) -> Self {
        self.aspects.insert(name.into(), data);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn origin(mut self, origin: ContentVersionId) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn external_id(mut self, alias: impl Into<String>) -> Self {
        self.operations.push(ContentOperation::SetAlias {
            namespace: EXTERNAL_ID_NAMESPACE.to_string(),
            alias: alias.into(),
        });
        self
    }

    pub fn content_data(&self) -> Option<&JsonValue> {
        self.aspects.get(CONTENT_DATA_ASPECT)
    }

    pub fn content_data_mut(&mut self) -> Option<&mut JsonValue> {
        self.aspects.get_mut(CONTENT_DATA_ASPECT)
    }

    /// The `_type` of the primary aspect, if any.
    pub fn declared_type(&self) -> Option<&str> {
        self.content_data()
            .and_then(|data| data.get(TYPE_FIELD))
            .and_then(JsonValue::as_str)
    }

    pub fn content_type(&self) -> &str {
        self.declared_type().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aspect {
    pub name: String,
    pub data: JsonValue,
    pub md5: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMeta {
    pub original_creation_time: i64,
    pub creator: String,
    pub modification_time: i64,
    pub modifier: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentResult {
    pub id: ContentId,
    pub version: ContentVersionId,
    pub content_type: String,
    pub aspects: BTreeMap<String, Aspect>,
    pub meta: ContentMeta,
}

impl ContentResult {
    pub fn aspect_data(&self, name: &str) -> Option<&JsonValue> {
        self.aspects.get(name).map(|aspect| &aspect.data)
    }

    pub fn content_data(&self) -> Option<&JsonValue> {
        self.aspect_data(CONTENT_DATA_ASPECT)
    }

    /// A write carrying this result's aspects, suitable as the basis of an
    /// update or a copy.
    pub fn to_write(&self) -> ContentWrite {
        ContentWrite {
            id: None,
            origin: Some(self.version.clone()),
            aspects: self
                .aspects
                .iter()
                .map(|(name, aspect)| (name.clone(), aspect.data.clone()))
                .collect(),
            operations: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentVersionInfo {
    pub version: ContentVersionId,
    pub creation_time: i64,
    pub creator_id: String,
    pub views: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHistory {
    pub versions: Vec<ContentVersionInfo>,
}

/// Outcome of a soft delete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedContent {
    pub id: ContentId,
    /// The version that moved from `p.latest` to `p.deleted`; `None` when
    /// nothing held `p.latest`.
    pub version: Option<ContentVersionId>,
    pub content_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn content_type_falls_back_to_default() {
        let write = ContentWrite::with_content_data(json!({"body": "x"}));
        assert_eq!(write.declared_type(), None);
        assert_eq!(write.content_type(), DEFAULT_CONTENT_TYPE);
        let typed = ContentWrite::with_content_data(json!({"_type": "Article"}));
        assert_eq!(typed.content_type(), "Article");
    }

    #[test]
    fn builder_collects_aspects_and_alias() {
        let write = ContentWrite::new()
            .id("onecms:abc")
            .aspect(METADATA_ASPECT, json!({"dimensions": {}}))
            .external_id("ext-1");
        assert_eq!(write.id.as_deref(), Some("onecms:abc"));
        assert!(write.aspects.contains_key(METADATA_ASPECT));
        assert_eq!(
            write.operations,
            vec![ContentOperation::SetAlias {
                namespace: EXTERNAL_ID_NAMESPACE.to_string(),
                alias: "ext-1".to_string()
            }]
        );
    }
}
