use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{FolioError, FolioResult};

pub const DEFAULT_ID_TYPE: &str = "onecms";

/// Unversioned content id, `"<delegationId>:<key>"`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ContentId {
    pub delegation_id: String,
    pub key: String,
}

impl ContentId {
    pub fn new(delegation_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            delegation_id: delegation_id.into(),
            key: key.into(),
        }
    }

    /// Accepts both the unversioned and the versioned form; a version part is
    /// dropped.
    pub fn parse(value: &str) -> FolioResult<Self> {
        let parts = split_id(value)?;
        Ok(Self::new(parts[0], parts[1]))
    }

    pub fn at_version(&self, version: impl Into<String>) -> ContentVersionId {
        ContentVersionId {
            content_id: self.clone(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.delegation_id, self.key)
    }
}

impl FromStr for ContentId {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Versioned content id, `"<delegationId>:<key>:<version>"`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ContentVersionId {
    pub content_id: ContentId,
    pub version: String,
}

impl ContentVersionId {
    pub fn new(
        delegation_id: impl Into<String>,
        key: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        ContentId::new(delegation_id, key).at_version(version)
    }

    pub fn parse(value: &str) -> FolioResult<Self> {
        let parts = split_id(value)?;
        match parts.get(2) {
            Some(version) if !version.is_empty() => Ok(Self::new(parts[0], parts[1], *version)),
            _ => Err(FolioError::invalid(format!(
                "content id '{value}' is not versioned"
            ))),
        }
    }

    pub fn is_versioned(value: &str) -> bool {
        value.splitn(4, ':').count() >= 3
    }

    pub fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    pub fn delegation_id(&self) -> &str {
        &self.content_id.delegation_id
    }

    pub fn key(&self) -> &str {
        &self.content_id.key
    }
}

impl fmt::Display for ContentVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_id, self.version)
    }
}

impl FromStr for ContentVersionId {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_id(value: &str) -> FolioResult<Vec<&str>> {
    if value.trim().is_empty() {
        return Err(FolioError::invalid("content id must not be empty"));
    }
    let parts: Vec<&str> = value.splitn(3, ':').collect();
    if parts.len() < 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(FolioError::invalid(format!(
            "invalid content id format: {value}"
        )));
    }
    Ok(parts)
}

/// A named tag pointing at one version of a content item.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum View {
    Latest,
    Deleted,
    Public,
    Other(String),
}

impl View {
    pub const LATEST: &'static str = "p.latest";
    pub const DELETED: &'static str = "p.deleted";
    pub const PUBLIC: &'static str = "p.public";

    pub fn name(&self) -> &str {
        match self {
            View::Latest => Self::LATEST,
            View::Deleted => Self::DELETED,
            View::Public => Self::PUBLIC,
            View::Other(name) => name.as_str(),
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            Self::LATEST => View::Latest,
            Self::DELETED => View::Deleted,
            Self::PUBLIC => View::Public,
            other => View::Other(other.to_string()),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! string_id_serde {
    ($name:ident) => {
        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let value = String::deserialize(deserializer)?;
                $name::parse(&value).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_id_serde!(ContentId);
string_id_serde!(ContentVersionId);

impl Serialize for View {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for View {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(View::from_name(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentId, ContentVersionId, View};

    #[test]
    fn parses_unversioned_and_versioned_ids() {
        let id = ContentId::parse("onecms:abc123").expect("parse");
        assert_eq!(id.delegation_id, "onecms");
        assert_eq!(id.key, "abc123");
        assert_eq!(id.to_string(), "onecms:abc123");

        let vid = ContentVersionId::parse("onecms:abc123:v9").expect("parse versioned");
        assert_eq!(vid.content_id(), &id);
        assert_eq!(vid.version, "v9");
        assert_eq!(vid.to_string(), "onecms:abc123:v9");

        let dropped = ContentId::parse("onecms:abc123:v9").expect("parse drops version");
        assert_eq!(dropped, id);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(ContentId::parse("").is_err());
        assert!(ContentId::parse("onlykey").is_err());
        assert!(ContentId::parse(":key").is_err());
        assert!(ContentVersionId::parse("onecms:abc").is_err());
        assert!(ContentVersionId::parse("onecms:abc:").is_err());
    }

    #[test]
    fn versioned_detection() {
        assert!(ContentVersionId::is_versioned("a:b:c"));
        assert!(!ContentVersionId::is_versioned("a:b"));
    }

    #[test]
    fn ids_serialize_as_strings() {
        let vid = ContentVersionId::new("onecms", "k", "v");
        let json = serde_json::to_string(&vid).expect("encode");
        assert_eq!(json, "\"onecms:k:v\"");
        let back: ContentVersionId = serde_json::from_str(&json).expect("decode");
        assert_eq!(back, vid);
    }

    #[test]
    fn view_names_are_stable() {
        assert_eq!(View::Latest.name(), "p.latest");
        assert_eq!(View::from_name("p.public"), View::Public);
        assert_eq!(
            View::from_name("p.archived"),
            View::Other("p.archived".to_string())
        );
    }
}
