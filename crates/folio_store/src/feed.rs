//! Commit-cursor change feed.
//!
//! `folio_changelist` keeps one row per content item, replaced on every
//! mutation, with schema-free attributes in `folio_changelist_attributes`.
//! `folio_event_queue` is the append-only audit trail. Commit ids come from
//! an in-process counter seeded from storage when the feed opens, so only one
//! process may record into a database at a time.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Condition, Expr, Func, JoinType, Order, Query, SelectStatement};
use sea_orm::{ConnectionTrait, DatabaseConnection, QueryResult, TransactionTrait};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::time::sleep;

use folio_core::{
    now_millis, ChangeEvent, ChangeFeedApi, ChangeFeedPage, ChangeFeedQuery, ContentId,
    ContentResult, EventType, FolioError, FolioResult, Subject, INSERTION_INFO_ASPECT,
};

use crate::config::FeedSettings;
use crate::db::*;
use crate::lookup::{LookupTables, Lookups};
use crate::sql::{
    exec, query_all, query_one, read_i32, read_i64, read_opt_i64, read_opt_string, read_string,
};

pub const FAILPOINT_CHANGE_FEED_RECORD: &str = "change_feed_record";

pub const ATTR_OBJECT_TYPE: &str = "objectType";
pub const ATTR_CREATED_BY: &str = "created_by";
pub const ATTR_MODIFIER: &str = "modifier";
pub const ATTR_CREATION_TIME: &str = "creationTime";
pub const ATTR_MODIFICATION_TIME: &str = "modificationTime";
pub const ATTR_SECURITY_PARENT: &str = "securityParentId";
pub const ATTR_INSERT_PARENT: &str = "insertParentId";
pub const ATTR_PARTITION: &str = "partition";

const SUBSCRIPTION_BUFFER: usize = 256;

const OBJECT_TYPES: [&str; 7] = [
    "image",
    "article",
    "collection",
    "page",
    "graphic",
    "audio",
    "video",
];

#[derive(Clone, Debug, PartialEq)]
enum AttrValue {
    Str(String),
    Num(i64),
}

/// Fixed columns of a change-list row.
struct ChangeRow<'a> {
    event: EventType,
    id: &'a ContentId,
    version: &'a str,
    content_type: &'a str,
    created_at: i64,
    created_by: &'a str,
    modified_at: i64,
    modified_by: &'a str,
}

#[derive(Clone)]
pub struct ChangeFeed {
    conn: DatabaseConnection,
    lookups: Arc<Lookups>,
    settings: FeedSettings,
    commit_id: Arc<AtomicI64>,
    failpoints: Arc<HashSet<String>>,
}

impl ChangeFeed {
    pub async fn open(
        conn: DatabaseConnection,
        lookups: Arc<Lookups>,
        settings: FeedSettings,
        failpoints: Arc<HashSet<String>>,
    ) -> FolioResult<Self> {
        let seed = stored_max_commit_id(&conn).await?;
        log::info!("change feed seeded at commit id {seed}");
        Ok(Self {
            conn,
            lookups,
            settings,
            commit_id: Arc::new(AtomicI64::new(seed)),
            failpoints,
        })
    }

    pub fn max_commit_id(&self) -> i64 {
        self.commit_id.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> FeedSettings {
        self.settings
    }

    fn next_commit_id(&self) -> i64 {
        self.commit_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn maybe_failpoint(&self, key: &str) -> FolioResult<()> {
        if self.failpoints.contains(key) {
            Err(FolioError::storage(format!("failpoint {key}")))
        } else {
            Ok(())
        }
    }

    /// Records a create or update of `result` and returns its commit id.
    pub async fn record_event(&self, event: EventType, result: &ContentResult) -> FolioResult<i64> {
        let meta = &result.meta;
        let row = ChangeRow {
            event,
            id: &result.id,
            version: &result.version.version,
            content_type: &result.content_type,
            created_at: meta.original_creation_time,
            created_by: &meta.creator,
            modified_at: meta.modification_time,
            modified_by: &meta.modifier,
        };
        self.record(row, event_attributes(result)).await
    }

    /// Records a soft delete. `deleted` is the version that lost `p.latest`.
    pub async fn record_delete(&self, deleted: &ContentResult, subject: &Subject) -> FolioResult<i64> {
        let now = now_millis();
        let row = ChangeRow {
            event: EventType::Delete,
            id: &deleted.id,
            version: &deleted.version.version,
            content_type: &deleted.content_type,
            created_at: deleted.meta.original_creation_time,
            created_by: &deleted.meta.creator,
            modified_at: now,
            modified_by: &subject.principal_id,
        };
        let attributes = vec![
            (ATTR_MODIFIER, AttrValue::Str(subject.principal_id.clone())),
            (ATTR_MODIFICATION_TIME, AttrValue::Num(now)),
        ];
        self.record(row, attributes).await
    }

    async fn record(
        &self,
        row: ChangeRow<'_>,
        attributes: Vec<(&'static str, AttrValue)>,
    ) -> FolioResult<i64> {
        let lookups = self.lookups.snapshot();
        let event_type = lookups.require_event_type(row.event.as_str())?;
        let id_type = lookups.id_types.id(&row.id.delegation_id).ok_or_else(|| {
            FolioError::invalid(format!("unknown id type '{}'", row.id.delegation_id))
        })?;
        let now = now_millis();

        let tx = self.conn.begin().await?;
        let previous = Query::select()
            .from(FolioChangelist::Table)
            .column(FolioChangelist::Id)
            .and_where(Expr::col(FolioChangelist::IdType).eq(id_type))
            .and_where(Expr::col(FolioChangelist::ContentId).eq(row.id.key.as_str()))
            .to_owned();
        let delete = Query::delete()
            .from_table(FolioChangelistAttributes::Table)
            .and_where(Expr::col(FolioChangelistAttributes::Id).in_subquery(previous))
            .to_owned();
        exec(&tx, &delete).await?;
        let delete = Query::delete()
            .from_table(FolioChangelist::Table)
            .and_where(Expr::col(FolioChangelist::IdType).eq(id_type))
            .and_where(Expr::col(FolioChangelist::ContentId).eq(row.id.key.as_str()))
            .to_owned();
        exec(&tx, &delete).await?;
        self.maybe_failpoint(FAILPOINT_CHANGE_FEED_RECORD)?;
        // Allocated once the item's row is locked so ids follow lock order.
        let commit_id = self.next_commit_id();

        let insert = Query::insert()
            .into_table(FolioChangelist::Table)
            .columns([
                FolioChangelist::Id,
                FolioChangelist::EventType,
                FolioChangelist::IdType,
                FolioChangelist::ContentId,
                FolioChangelist::Version,
                FolioChangelist::ContentType,
                FolioChangelist::CreatedAt,
                FolioChangelist::CreatedBy,
                FolioChangelist::ModifiedAt,
                FolioChangelist::ModifiedBy,
                FolioChangelist::CommitAt,
            ])
            .values_panic([
                commit_id.into(),
                event_type.into(),
                id_type.into(),
                row.id.key.as_str().into(),
                row.version.into(),
                row.content_type.into(),
                row.created_at.into(),
                row.created_by.into(),
                row.modified_at.into(),
                row.modified_by.into(),
                now.into(),
            ])
            .to_owned();
        exec(&tx, &insert).await?;

        let mut insert = Query::insert()
            .into_table(FolioChangelistAttributes::Table)
            .columns([
                FolioChangelistAttributes::Id,
                FolioChangelistAttributes::AttrId,
                FolioChangelistAttributes::StrValue,
                FolioChangelistAttributes::NumValue,
            ])
            .to_owned();
        let mut stored = 0usize;
        for (name, value) in attributes {
            let Some(attr_id) = lookups.attributes.id(name) else {
                log::debug!("attribute '{name}' is not registered, skipping");
                continue;
            };
            let (str_value, num_value) = match value {
                AttrValue::Str(value) => (Some(value), None),
                AttrValue::Num(value) => (None, Some(value)),
            };
            insert.values_panic([
                commit_id.into(),
                attr_id.into(),
                str_value.into(),
                num_value.into(),
            ]);
            stored += 1;
        }
        if stored > 0 {
            exec(&tx, &insert).await?;
        }

        let insert = Query::insert()
            .into_table(FolioEventQueue::Table)
            .columns([
                FolioEventQueue::EventType,
                FolioEventQueue::CommitId,
                FolioEventQueue::CreatedAt,
                FolioEventQueue::CreatedBy,
            ])
            .values_panic([
                event_type.into(),
                commit_id.into(),
                now.into(),
                row.modified_by.into(),
            ])
            .to_owned();
        exec(&tx, &insert).await?;
        tx.commit().await?;

        log::debug!(
            "recorded {} for {} at commit id {commit_id}",
            row.event,
            row.id
        );
        Ok(commit_id)
    }

    async fn load_attributes(
        &self,
        lookups: &LookupTables,
        commit_ids: &[i64],
    ) -> FolioResult<HashMap<i64, HashMap<String, String>>> {
        let mut attributes: HashMap<i64, HashMap<String, String>> = HashMap::new();
        if commit_ids.is_empty() {
            return Ok(attributes);
        }
        let select = Query::select()
            .from(FolioChangelistAttributes::Table)
            .columns([
                FolioChangelistAttributes::Id,
                FolioChangelistAttributes::AttrId,
                FolioChangelistAttributes::StrValue,
                FolioChangelistAttributes::NumValue,
            ])
            .and_where(Expr::col(FolioChangelistAttributes::Id).is_in(commit_ids.iter().copied()))
            .to_owned();
        for row in query_all(&self.conn, &select).await? {
            let commit_id = read_i64(&row, FolioChangelistAttributes::Id)?;
            let attr_id = read_i32(&row, FolioChangelistAttributes::AttrId)?;
            let Some(name) = lookups.attributes.name(attr_id) else {
                continue;
            };
            let value = match read_opt_string(&row, FolioChangelistAttributes::StrValue)? {
                Some(value) => value,
                None => match read_opt_i64(&row, FolioChangelistAttributes::NumValue)? {
                    Some(value) => value.to_string(),
                    None => continue,
                },
            };
            attributes
                .entry(commit_id)
                .or_default()
                .insert(name.to_string(), value);
        }
        Ok(attributes)
    }

    fn empty_page(&self, run_time: i64, max_commit_id: i64) -> ChangeFeedPage {
        ChangeFeedPage {
            run_time,
            max_commit_id,
            num_found: 0,
            size: 0,
            events: Vec::new(),
        }
    }
}

#[async_trait]
impl ChangeFeedApi for ChangeFeed {
    async fn query_changes(&self, query: &ChangeFeedQuery) -> FolioResult<ChangeFeedPage> {
        let run_time = now_millis();
        let max_commit_id = self.max_commit_id();
        if let Some(cursor) = query.cursor_commit_id {
            if cursor > max_commit_id {
                return Err(FolioError::cursor_out_of_range(cursor, max_commit_id));
            }
        }
        let lookups = self.lookups.snapshot();
        let limit = self.settings.clamp_rows(query.max_rows);

        let mut select = Query::select()
            .columns([
                (FolioChangelist::Table, FolioChangelist::Id),
                (FolioChangelist::Table, FolioChangelist::EventType),
                (FolioChangelist::Table, FolioChangelist::IdType),
                (FolioChangelist::Table, FolioChangelist::ContentId),
                (FolioChangelist::Table, FolioChangelist::Version),
                (FolioChangelist::Table, FolioChangelist::ContentType),
                (FolioChangelist::Table, FolioChangelist::CreatedAt),
                (FolioChangelist::Table, FolioChangelist::CreatedBy),
                (FolioChangelist::Table, FolioChangelist::ModifiedAt),
                (FolioChangelist::Table, FolioChangelist::ModifiedBy),
                (FolioChangelist::Table, FolioChangelist::CommitAt),
            ])
            .from(FolioChangelist::Table)
            .order_by((FolioChangelist::Table, FolioChangelist::Id), Order::Asc)
            .limit(u64::from(limit))
            .to_owned();

        match (query.cursor_commit_id, query.changed_since) {
            (Some(cursor), _) => {
                select.and_where(Expr::col((FolioChangelist::Table, FolioChangelist::Id)).gt(cursor));
            }
            (None, Some(since)) => {
                select.and_where(
                    Expr::col((FolioChangelist::Table, FolioChangelist::CommitAt)).gte(since),
                );
            }
            (None, None) => {}
        }

        if !query.event_types.is_empty() {
            let ids: Vec<i32> = query
                .event_types
                .iter()
                .filter_map(|name| lookups.event_types.id(name))
                .collect();
            if ids.is_empty() {
                return Ok(self.empty_page(run_time, max_commit_id));
            }
            select.and_where(
                Expr::col((FolioChangelist::Table, FolioChangelist::EventType)).is_in(ids),
            );
        }
        if !query.content_types.is_empty() {
            select.and_where(
                Expr::col((FolioChangelist::Table, FolioChangelist::ContentType))
                    .is_in(query.content_types.iter().map(String::as_str)),
            );
        }
        for (alias, attribute, values) in [
            ("ca_ot", ATTR_OBJECT_TYPE, &query.object_types),
            ("ca_pt", ATTR_PARTITION, &query.partitions),
        ] {
            if values.is_empty() {
                continue;
            }
            let Some(attr_id) = lookups.attributes.id(attribute) else {
                return Ok(self.empty_page(run_time, max_commit_id));
            };
            join_attribute(&mut select, alias, attr_id, values);
        }

        let rows = query_all(&self.conn, &select).await?;
        let commit_ids = rows
            .iter()
            .map(|row| read_i64(row, FolioChangelist::Id))
            .collect::<FolioResult<Vec<_>>>()?;
        let mut attributes = self.load_attributes(&lookups, &commit_ids).await?;
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let commit_id = read_i64(&row, FolioChangelist::Id)?;
            let attrs = attributes.remove(&commit_id).unwrap_or_default();
            events.push(read_event(&lookups, &row, attrs)?);
        }

        Ok(ChangeFeedPage {
            run_time,
            max_commit_id,
            num_found: events.len(),
            size: events.len(),
            events,
        })
    }

    async fn subscribe_changes(
        &self,
        query: ChangeFeedQuery,
    ) -> FolioResult<mpsc::Receiver<ChangeEvent>> {
        if let Some(cursor) = query.cursor_commit_id {
            let max_commit_id = self.max_commit_id();
            if cursor > max_commit_id {
                return Err(FolioError::cursor_out_of_range(cursor, max_commit_id));
            }
        }
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let feed = self.clone();
        let interval = self.settings.poll_interval;
        tokio::spawn(async move {
            let mut query = query;
            loop {
                if tx.is_closed() {
                    break;
                }
                match feed.query_changes(&query).await {
                    Ok(page) if !page.events.is_empty() => {
                        query.cursor_commit_id = page.events.last().map(|event| event.commit_id);
                        for event in page.events {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(_) => sleep(interval).await,
                    Err(err) => {
                        log::warn!("change subscription poll failed: {err}");
                        sleep(interval).await;
                    }
                }
            }
        });
        Ok(rx)
    }
}

/// Maps a content type onto a coarse object type by substring match.
pub fn object_type_for(content_type: &str) -> String {
    let lower = content_type.to_lowercase();
    OBJECT_TYPES
        .iter()
        .find(|candidate| lower.contains(*candidate))
        .map(|candidate| candidate.to_string())
        .unwrap_or_else(|| content_type.to_string())
}

fn event_attributes(result: &ContentResult) -> Vec<(&'static str, AttrValue)> {
    let meta = &result.meta;
    let mut attributes = vec![
        (ATTR_OBJECT_TYPE, AttrValue::Str(object_type_for(&result.content_type))),
        (ATTR_CREATED_BY, AttrValue::Str(meta.creator.clone())),
        (ATTR_MODIFIER, AttrValue::Str(meta.modifier.clone())),
        (ATTR_CREATION_TIME, AttrValue::Num(meta.original_creation_time)),
        (ATTR_MODIFICATION_TIME, AttrValue::Num(meta.modification_time)),
    ];
    if let Some(info) = result.aspect_data(INSERTION_INFO_ASPECT) {
        if let Some(value) = info.get("securityParentId").and_then(json_text) {
            attributes.push((ATTR_SECURITY_PARENT, AttrValue::Str(value)));
        }
        if let Some(value) = info.get("insertParentId").and_then(json_text) {
            attributes.push((ATTR_INSERT_PARENT, AttrValue::Str(value)));
        }
    }
    if let Some(value) = result
        .content_data()
        .and_then(|data| data.get(ATTR_PARTITION))
        .and_then(json_text)
    {
        attributes.push((ATTR_PARTITION, AttrValue::Str(value)));
    }
    attributes
}

fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(value) => Some(value.clone()),
        other => Some(other.to_string()),
    }
}

/// Adds one inner join on the attribute table, restricted to `values`.
fn join_attribute(select: &mut SelectStatement, alias: &str, attr_id: i32, values: &[String]) {
    let alias = Alias::new(alias);
    select
        .join_as(
            JoinType::InnerJoin,
            FolioChangelistAttributes::Table,
            alias.clone(),
            Condition::all()
                .add(
                    Expr::col((alias.clone(), FolioChangelistAttributes::Id))
                        .equals((FolioChangelist::Table, FolioChangelist::Id)),
                )
                .add(Expr::col((alias.clone(), FolioChangelistAttributes::AttrId)).eq(attr_id)),
        )
        .and_where(
            Expr::col((alias, FolioChangelistAttributes::StrValue))
                .is_in(values.iter().map(String::as_str)),
        );
}

fn read_event(
    lookups: &LookupTables,
    row: &QueryResult,
    mut attributes: HashMap<String, String>,
) -> FolioResult<ChangeEvent> {
    let commit_id = read_i64(row, FolioChangelist::Id)?;
    let event_type_id = read_i32(row, FolioChangelist::EventType)?;
    let id_type = read_i32(row, FolioChangelist::IdType)?;
    let delegation = lookups.id_types.name(id_type).ok_or_else(|| {
        FolioError::storage(format!("commit {commit_id} has unknown id type {id_type}"))
    })?;
    let event_type = lookups
        .event_types
        .name(event_type_id)
        .ok_or_else(|| {
            FolioError::storage(format!(
                "commit {commit_id} has unknown event type {event_type_id}"
            ))
        })?
        .to_string();
    let content_id = ContentId::new(delegation, read_string(row, FolioChangelist::ContentId)?);
    let version = read_string(row, FolioChangelist::Version)?;
    Ok(ChangeEvent {
        content_version_id: content_id.at_version(version),
        content_id,
        commit_id,
        commit_time: read_i64(row, FolioChangelist::CommitAt)?,
        event_type,
        object_type: attributes.remove(ATTR_OBJECT_TYPE),
        content_type: read_string(row, FolioChangelist::ContentType)?,
        creation_time: read_i64(row, FolioChangelist::CreatedAt)?,
        creator: read_string(row, FolioChangelist::CreatedBy)?,
        modification_time: read_i64(row, FolioChangelist::ModifiedAt)?,
        modifier: read_string(row, FolioChangelist::ModifiedBy)?,
        security_parent_id: attributes.remove(ATTR_SECURITY_PARENT),
        insertion_parent_id: attributes.remove(ATTR_INSERT_PARENT),
        partitions: attributes.remove(ATTR_PARTITION).into_iter().collect(),
    })
}

async fn stored_max_commit_id<C: ConnectionTrait>(conn: &C) -> FolioResult<i64> {
    let changelist = Query::select()
        .from(FolioChangelist::Table)
        .expr_as(Func::max(Expr::col(FolioChangelist::Id)), Alias::new("max_id"))
        .to_owned();
    let queue = Query::select()
        .from(FolioEventQueue::Table)
        .expr_as(
            Func::max(Expr::col(FolioEventQueue::CommitId)),
            Alias::new("max_id"),
        )
        .to_owned();
    let mut max = 0;
    for select in [changelist, queue] {
        if let Some(row) = query_one(conn, &select).await? {
            let value: Option<i64> = row.try_get("", "max_id")?;
            max = max.max(value.unwrap_or(0));
        }
    }
    Ok(max)
}
