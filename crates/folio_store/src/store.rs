use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, Order, Query, SelectStatement};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, SqlErr, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;

use folio_core::{
    now_millis, Aspect, ContentHistory, ContentId, ContentMeta, ContentOperation,
    ContentReadApi, ContentResult, ContentVersionId, ContentVersionInfo, ContentWrite,
    DeletedContent, FolioError, FolioResult, IdGenerator, Subject, View, DEFAULT_ID_TYPE,
    EXTERNAL_ID_NAMESPACE,
};

use crate::db::*;
use crate::lookup::{LookupTables, Lookups};
use crate::migration::Migrator;
use crate::sql::{
    exec, query_all, query_one, read_i32, read_i64, read_string, to_statement,
};
use crate::{DatabaseConfig, FolioConfig};

pub const FAILPOINT_AFTER_VERSION_INSERT: &str = "after_version_insert";

/// Whether an update honours the write's `origin`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateMode {
    Checked,
    Forced,
}

/// Versions, views and aspects over a relational database.
///
/// Every mutation runs in one transaction whose first statement writes the
/// item's `folio_content_ids` row, so writers to the same item serialize
/// before any view is read or reassigned.
#[derive(Clone)]
pub struct ContentStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    ids: Arc<IdGenerator>,
    lookups: Arc<Lookups>,
    failpoints: Arc<HashSet<String>>,
}

#[derive(Clone, Debug)]
struct VersionRow {
    version_id: i32,
    version: String,
    created_at: i64,
    created_by: String,
}

impl ContentStore {
    pub async fn connect(config: &FolioConfig, base_dir: &Path) -> FolioResult<Self> {
        let conn = open_connection(config, base_dir).await?;
        Migrator::up(&conn, None).await?;
        let lookups = Arc::new(Lookups::load(&conn).await?);
        let ids = Arc::new(IdGenerator::with_base_time(config.base_time_ms())?);
        Ok(Self::new(conn, ids, lookups, failpoints_from(config)))
    }

    pub fn new(
        conn: DatabaseConnection,
        ids: Arc<IdGenerator>,
        lookups: Arc<Lookups>,
        failpoints: Arc<HashSet<String>>,
    ) -> Self {
        let backend = conn.get_database_backend();
        Self {
            conn,
            backend,
            ids,
            lookups,
            failpoints,
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    pub fn lookups(&self) -> Arc<Lookups> {
        Arc::clone(&self.lookups)
    }

    pub fn id_generator(&self) -> Arc<IdGenerator> {
        Arc::clone(&self.ids)
    }

    pub fn failpoints(&self) -> Arc<HashSet<String>> {
        Arc::clone(&self.failpoints)
    }

    pub async fn refresh_lookups(&self) -> FolioResult<()> {
        self.lookups.refresh(&self.conn).await
    }

    fn maybe_failpoint(&self, key: &str) -> FolioResult<()> {
        if self.failpoints.contains(key) {
            Err(FolioError::storage(format!("failpoint {key}")))
        } else {
            Ok(())
        }
    }

    pub async fn create_content(
        &self,
        write: &ContentWrite,
        subject: &Subject,
    ) -> FolioResult<ContentResult> {
        let id = match &write.id {
            Some(raw) => ContentId::parse(raw)?,
            None => ContentId::new(DEFAULT_ID_TYPE, self.ids.next_id()?),
        };
        let lookups = self.lookups.snapshot();
        let id_type = lookups.id_types.id(&id.delegation_id).ok_or_else(|| {
            FolioError::invalid(format!("unknown id type '{}'", id.delegation_id))
        })?;
        let latest = lookups.require_view(&View::Latest)?;
        let version = self.ids.next_version()?;
        let now = now_millis();

        let tx = self.conn.begin().await?;
        let insert = Query::insert()
            .into_table(FolioContentIds::Table)
            .columns([
                FolioContentIds::IdType,
                FolioContentIds::Id,
                FolioContentIds::Revision,
                FolioContentIds::CreatedAt,
                FolioContentIds::UpdatedAt,
            ])
            .values_panic([
                id_type.into(),
                id.key.clone().into(),
                0i64.into(),
                now.into(),
                now.into(),
            ])
            .to_owned();
        if let Err(err) = tx.execute(to_statement(self.backend, &insert)).await {
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                return Err(FolioError::conflict(format!("content {id} already exists")));
            }
            return Err(err.into());
        }
        let version_id = self
            .write_version(&tx, id_type, &id, &version, write, subject, now)
            .await?;
        assign_view(&tx, id_type, &id.key, latest, version_id, subject, now).await?;
        apply_operations(&tx, &lookups, id_type, &id.key, &write.operations).await?;
        tx.commit().await?;

        self.load_written(&id.at_version(version)).await
    }

    /// Writes a new version of an existing item and moves `p.latest` onto it.
    ///
    /// With [`UpdateMode::Checked`] a write whose `origin` no longer holds
    /// `p.latest` is rejected with a conflict.
    pub async fn update_content(
        &self,
        id: &ContentId,
        write: &ContentWrite,
        subject: &Subject,
        mode: UpdateMode,
    ) -> FolioResult<Option<ContentResult>> {
        let lookups = self.lookups.snapshot();
        let Some(id_type) = lookups.id_types.id(&id.delegation_id) else {
            return Ok(None);
        };
        let latest = lookups.require_view(&View::Latest)?;
        let version = self.ids.next_version()?;
        let now = now_millis();

        let tx = self.conn.begin().await?;
        if !touch(&tx, id_type, &id.key, now).await? {
            return Ok(None);
        }
        if mode == UpdateMode::Checked {
            if let Some(origin) = &write.origin {
                let current = view_holder(&tx, id_type, &id.key, latest).await?;
                let current_version = current.as_ref().map(|row| row.version.as_str());
                if current_version != Some(origin.version.as_str()) {
                    return Err(FolioError::conflict(format!(
                        "{origin} is not the latest version of {id} (latest: {})",
                        current_version.unwrap_or("none")
                    )));
                }
            }
        }
        let version_id = self
            .write_version(&tx, id_type, id, &version, write, subject, now)
            .await?;
        assign_view(&tx, id_type, &id.key, latest, version_id, subject, now).await?;
        apply_operations(&tx, &lookups, id_type, &id.key, &write.operations).await?;
        tx.commit().await?;

        self.load_written(&id.at_version(version)).await.map(Some)
    }

    /// Moves `p.latest` to `p.deleted`. Versions and aspects are kept.
    pub async fn delete_content(
        &self,
        id: &ContentId,
        subject: &Subject,
    ) -> FolioResult<Option<DeletedContent>> {
        let lookups = self.lookups.snapshot();
        let Some(id_type) = lookups.id_types.id(&id.delegation_id) else {
            return Ok(None);
        };
        let latest = lookups.require_view(&View::Latest)?;
        let deleted = lookups.require_view(&View::Deleted)?;
        let now = now_millis();

        let tx = self.conn.begin().await?;
        if !touch(&tx, id_type, &id.key, now).await? {
            return Ok(None);
        }
        let Some(holder) = view_holder(&tx, id_type, &id.key, latest).await? else {
            tx.commit().await?;
            return Ok(Some(DeletedContent {
                id: id.clone(),
                version: None,
                content_type: None,
            }));
        };
        clear_view(&tx, id_type, &id.key, latest).await?;
        assign_view(&tx, id_type, &id.key, deleted, holder.version_id, subject, now).await?;
        let content_type = content_type_of(&tx, holder.version_id).await?;
        tx.commit().await?;

        Ok(Some(DeletedContent {
            id: id.clone(),
            version: Some(id.at_version(holder.version)),
            content_type,
        }))
    }

    /// Tags the current latest version `p.public`. Returns `None` when the
    /// item is unknown or has no latest version.
    pub async fn publish_content(
        &self,
        id: &ContentId,
        subject: &Subject,
    ) -> FolioResult<Option<ContentVersionId>> {
        let lookups = self.lookups.snapshot();
        let Some(id_type) = lookups.id_types.id(&id.delegation_id) else {
            return Ok(None);
        };
        let latest = lookups.require_view(&View::Latest)?;
        let public = lookups.require_view(&View::Public)?;
        let now = now_millis();

        let tx = self.conn.begin().await?;
        if !touch(&tx, id_type, &id.key, now).await? {
            return Ok(None);
        }
        let Some(holder) = view_holder(&tx, id_type, &id.key, latest).await? else {
            tx.commit().await?;
            return Ok(None);
        };
        assign_view(&tx, id_type, &id.key, public, holder.version_id, subject, now).await?;
        tx.commit().await?;
        Ok(Some(id.at_version(holder.version)))
    }

    /// Removes `p.public` from every version of the item.
    pub async fn unpublish_content(&self, id: &ContentId) -> FolioResult<bool> {
        let lookups = self.lookups.snapshot();
        let Some(id_type) = lookups.id_types.id(&id.delegation_id) else {
            return Ok(false);
        };
        let public = lookups.require_view(&View::Public)?;
        let now = now_millis();

        let tx = self.conn.begin().await?;
        if !touch(&tx, id_type, &id.key, now).await? {
            return Ok(false);
        }
        let removed = clear_view(&tx, id_type, &id.key, public).await?;
        tx.commit().await?;
        Ok(removed > 0)
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_version(
        &self,
        tx: &DatabaseTransaction,
        id_type: i32,
        id: &ContentId,
        version: &str,
        write: &ContentWrite,
        subject: &Subject,
        now: i64,
    ) -> FolioResult<i32> {
        let by = subject.principal_id.as_str();
        let insert = Query::insert()
            .into_table(FolioContentVersions::Table)
            .columns([
                FolioContentVersions::IdType,
                FolioContentVersions::Id,
                FolioContentVersions::Version,
                FolioContentVersions::CreatedAt,
                FolioContentVersions::CreatedBy,
            ])
            .values_panic([
                id_type.into(),
                id.key.clone().into(),
                version.into(),
                now.into(),
                by.into(),
            ])
            .to_owned();
        exec(tx, &insert).await?;
        let select = Query::select()
            .from(FolioContentVersions::Table)
            .column(FolioContentVersions::VersionId)
            .and_where(Expr::col(FolioContentVersions::IdType).eq(id_type))
            .and_where(Expr::col(FolioContentVersions::Id).eq(id.key.as_str()))
            .and_where(Expr::col(FolioContentVersions::Version).eq(version))
            .to_owned();
        let version_id = select_key(tx, &select, FolioContentVersions::VersionId).await?;

        let insert = Query::insert()
            .into_table(FolioContents::Table)
            .columns([
                FolioContents::VersionId,
                FolioContents::ContentType,
                FolioContents::CreatedAt,
                FolioContents::CreatedBy,
                FolioContents::ModifiedAt,
                FolioContents::ModifiedBy,
            ])
            .values_panic([
                version_id.into(),
                write.content_type().into(),
                now.into(),
                by.into(),
                now.into(),
                by.into(),
            ])
            .to_owned();
        exec(tx, &insert).await?;
        let select = Query::select()
            .from(FolioContents::Table)
            .column(FolioContents::ContentId)
            .and_where(Expr::col(FolioContents::VersionId).eq(version_id))
            .to_owned();
        let content_id = select_key(tx, &select, FolioContents::ContentId).await?;

        for (name, data) in &write.aspects {
            let payload = serde_json::to_string(data)?;
            let md5 = aspect_md5(&payload);
            let insert = Query::insert()
                .into_table(FolioAspects::Table)
                .columns([
                    FolioAspects::VersionId,
                    FolioAspects::Name,
                    FolioAspects::Data,
                    FolioAspects::Md5,
                    FolioAspects::CreatedAt,
                ])
                .values_panic([
                    version_id.into(),
                    name.as_str().into(),
                    payload.into(),
                    md5.into(),
                    now.into(),
                ])
                .to_owned();
            exec(tx, &insert).await?;
            let select = Query::select()
                .from(FolioAspects::Table)
                .column(FolioAspects::AspectId)
                .and_where(Expr::col(FolioAspects::VersionId).eq(version_id))
                .and_where(Expr::col(FolioAspects::Name).eq(name.as_str()))
                .to_owned();
            let aspect_id = select_key(tx, &select, FolioAspects::AspectId).await?;
            let insert = Query::insert()
                .into_table(FolioAspectLocations::Table)
                .columns([FolioAspectLocations::ContentId, FolioAspectLocations::AspectId])
                .values_panic([content_id.into(), aspect_id.into()])
                .to_owned();
            exec(tx, &insert).await?;
        }
        self.maybe_failpoint(FAILPOINT_AFTER_VERSION_INSERT)?;
        Ok(version_id)
    }

    async fn load_written(&self, version: &ContentVersionId) -> FolioResult<ContentResult> {
        self.get_content(version)
            .await?
            .ok_or_else(|| FolioError::storage(format!("committed version {version} not found")))
    }

    async fn version_row(
        &self,
        lookups: &LookupTables,
        version: &ContentVersionId,
    ) -> FolioResult<Option<(i32, VersionRow)>> {
        let Some(id_type) = lookups.id_types.id(version.delegation_id()) else {
            return Ok(None);
        };
        let select = version_select()
            .and_where(Expr::col(FolioContentVersions::IdType).eq(id_type))
            .and_where(Expr::col(FolioContentVersions::Id).eq(version.key()))
            .and_where(Expr::col(FolioContentVersions::Version).eq(version.version.as_str()))
            .to_owned();
        let row = query_one(&self.conn, &select).await?;
        row.map(|row| read_version_row(&row).map(|parsed| (id_type, parsed)))
            .transpose()
    }
}

#[async_trait]
impl ContentReadApi for ContentStore {
    async fn resolve(&self, id: &ContentId, view: &View) -> FolioResult<Option<ContentVersionId>> {
        let lookups = self.lookups.snapshot();
        let (Some(id_type), Some(view_id)) = (
            lookups.id_types.id(&id.delegation_id),
            lookups.view_id(view),
        ) else {
            return Ok(None);
        };
        let holder = view_holder(&self.conn, id_type, &id.key, view_id).await?;
        Ok(holder.map(|row| id.at_version(row.version)))
    }

    async fn resolve_external_id(&self, external_id: &str) -> FolioResult<Option<ContentId>> {
        let lookups = self.lookups.snapshot();
        let Some(alias_id) = lookups.aliases.id(EXTERNAL_ID_NAMESPACE) else {
            return Ok(None);
        };
        let select = Query::select()
            .from(FolioContentAliases::Table)
            .columns([FolioContentAliases::IdType, FolioContentAliases::Id])
            .and_where(Expr::col(FolioContentAliases::AliasId).eq(alias_id))
            .and_where(Expr::col(FolioContentAliases::Value).eq(external_id))
            .to_owned();
        let Some(row) = query_one(&self.conn, &select).await? else {
            return Ok(None);
        };
        let id_type = read_i32(&row, FolioContentAliases::IdType)?;
        let key = read_string(&row, FolioContentAliases::Id)?;
        let delegation = lookups.id_types.name(id_type).ok_or_else(|| {
            FolioError::storage(format!("alias '{external_id}' has unknown id type {id_type}"))
        })?;
        Ok(Some(ContentId::new(delegation, key)))
    }

    async fn get_content(&self, version: &ContentVersionId) -> FolioResult<Option<ContentResult>> {
        let lookups = self.lookups.snapshot();
        let Some((id_type, row)) = self.version_row(&lookups, version).await? else {
            return Ok(None);
        };

        let select = Query::select()
            .from(FolioContents::Table)
            .columns([
                FolioContents::ContentId,
                FolioContents::ContentType,
                FolioContents::ModifiedAt,
                FolioContents::ModifiedBy,
            ])
            .and_where(Expr::col(FolioContents::VersionId).eq(row.version_id))
            .to_owned();
        let Some(content) = query_one(&self.conn, &select).await? else {
            return Ok(None);
        };
        let content_id = read_i32(&content, FolioContents::ContentId)?;
        let content_type = read_string(&content, FolioContents::ContentType)?;
        let modification_time = read_i64(&content, FolioContents::ModifiedAt)?;
        let modifier = read_string(&content, FolioContents::ModifiedBy)?;

        let select = Query::select()
            .columns([
                (FolioAspects::Table, FolioAspects::Name),
                (FolioAspects::Table, FolioAspects::Data),
                (FolioAspects::Table, FolioAspects::Md5),
            ])
            .from(FolioAspectLocations::Table)
            .inner_join(
                FolioAspects::Table,
                Expr::col((FolioAspects::Table, FolioAspects::AspectId))
                    .equals((FolioAspectLocations::Table, FolioAspectLocations::AspectId)),
            )
            .and_where(
                Expr::col((FolioAspectLocations::Table, FolioAspectLocations::ContentId))
                    .eq(content_id),
            )
            .to_owned();
        let mut aspects = BTreeMap::new();
        for aspect in query_all(&self.conn, &select).await? {
            let name = read_string(&aspect, FolioAspects::Name)?;
            let raw = read_string(&aspect, FolioAspects::Data)?;
            let md5 = read_string(&aspect, FolioAspects::Md5)?;
            let data = serde_json::from_str(&raw).map_err(|err| {
                FolioError::storage(format!("aspect '{name}' of {version} is corrupt: {err}"))
            })?;
            aspects.insert(
                name.clone(),
                Aspect {
                    name,
                    data,
                    md5: Some(md5),
                },
            );
        }

        let select = version_select()
            .and_where(Expr::col(FolioContentVersions::IdType).eq(id_type))
            .and_where(Expr::col(FolioContentVersions::Id).eq(version.key()))
            .order_by(FolioContentVersions::VersionId, Order::Asc)
            .limit(1)
            .to_owned();
        let first = match query_one(&self.conn, &select).await? {
            Some(first) => read_version_row(&first)?,
            None => row.clone(),
        };

        Ok(Some(ContentResult {
            id: version.content_id().clone(),
            version: version.clone(),
            content_type,
            aspects,
            meta: ContentMeta {
                original_creation_time: first.created_at,
                creator: first.created_by,
                modification_time,
                modifier,
            },
        }))
    }

    async fn get_history(&self, id: &ContentId) -> FolioResult<Option<ContentHistory>> {
        let lookups = self.lookups.snapshot();
        let Some(id_type) = lookups.id_types.id(&id.delegation_id) else {
            return Ok(None);
        };
        let select = Query::select()
            .from(FolioContentIds::Table)
            .column(FolioContentIds::Id)
            .and_where(Expr::col(FolioContentIds::IdType).eq(id_type))
            .and_where(Expr::col(FolioContentIds::Id).eq(id.key.as_str()))
            .to_owned();
        if query_one(&self.conn, &select).await?.is_none() {
            return Ok(None);
        }

        let select = Query::select()
            .from(FolioContentViews::Table)
            .columns([FolioContentViews::ViewId, FolioContentViews::VersionId])
            .and_where(Expr::col(FolioContentViews::IdType).eq(id_type))
            .and_where(Expr::col(FolioContentViews::Id).eq(id.key.as_str()))
            .to_owned();
        let mut views: HashMap<i32, Vec<String>> = HashMap::new();
        for row in query_all(&self.conn, &select).await? {
            let view_id = read_i32(&row, FolioContentViews::ViewId)?;
            let version_id = read_i32(&row, FolioContentViews::VersionId)?;
            if let Some(name) = lookups.views.name(view_id) {
                views.entry(version_id).or_default().push(name.to_string());
            }
        }

        let select = version_select()
            .and_where(Expr::col(FolioContentVersions::IdType).eq(id_type))
            .and_where(Expr::col(FolioContentVersions::Id).eq(id.key.as_str()))
            .order_by(FolioContentVersions::VersionId, Order::Desc)
            .to_owned();
        let mut versions = Vec::new();
        for row in query_all(&self.conn, &select).await? {
            let row = read_version_row(&row)?;
            let mut held = views.remove(&row.version_id).unwrap_or_default();
            held.sort();
            versions.push(ContentVersionInfo {
                version: id.at_version(row.version),
                creation_time: row.created_at,
                creator_id: row.created_by,
                views: held,
            });
        }
        Ok(Some(ContentHistory { versions }))
    }
}

pub(crate) async fn open_connection(
    config: &FolioConfig,
    base_dir: &Path,
) -> FolioResult<DatabaseConnection> {
    let url = build_connection_url(config, base_dir)?;
    let mut options = ConnectOptions::new(url);
    options.sqlx_logging(false);
    if let Some(pool) = &config.pool {
        if let Some(max) = pool.max_connections {
            options.max_connections(max);
        }
        if let Some(min) = pool.min_connections {
            options.min_connections(min);
        }
        if let Some(timeout_ms) = pool.connect_timeout_ms {
            options.connect_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(timeout_ms) = pool.acquire_timeout_ms {
            options.acquire_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(timeout_ms) = pool.idle_timeout_ms {
            options.idle_timeout(Duration::from_millis(timeout_ms));
        }
    }
    Ok(Database::connect(options).await?)
}

pub(crate) fn failpoints_from(config: &FolioConfig) -> Arc<HashSet<String>> {
    Arc::new(
        config
            .failpoints
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect(),
    )
}

fn build_connection_url(config: &FolioConfig, base_dir: &Path) -> FolioResult<String> {
    match &config.database {
        DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        DatabaseConfig::Postgres { url } => Ok(url.clone()),
        DatabaseConfig::Mysql { url } => Ok(url.clone()),
    }
}

pub(crate) fn aspect_md5(payload: &str) -> String {
    format!("{:x}", md5::compute(payload.as_bytes()))
}

/// Bumps the item's revision. `false` when the item does not exist.
async fn touch<C: ConnectionTrait>(
    conn: &C,
    id_type: i32,
    key: &str,
    now: i64,
) -> FolioResult<bool> {
    let update = Query::update()
        .table(FolioContentIds::Table)
        .value(
            FolioContentIds::Revision,
            Expr::col(FolioContentIds::Revision).add(1),
        )
        .value(FolioContentIds::UpdatedAt, now)
        .and_where(Expr::col(FolioContentIds::IdType).eq(id_type))
        .and_where(Expr::col(FolioContentIds::Id).eq(key))
        .to_owned();
    Ok(exec(conn, &update).await? > 0)
}

fn version_select() -> SelectStatement {
    Query::select()
        .from(FolioContentVersions::Table)
        .columns([
            FolioContentVersions::VersionId,
            FolioContentVersions::Version,
            FolioContentVersions::CreatedAt,
            FolioContentVersions::CreatedBy,
        ])
        .to_owned()
}

fn read_version_row(row: &sea_orm::QueryResult) -> FolioResult<VersionRow> {
    Ok(VersionRow {
        version_id: read_i32(row, FolioContentVersions::VersionId)?,
        version: read_string(row, FolioContentVersions::Version)?,
        created_at: read_i64(row, FolioContentVersions::CreatedAt)?,
        created_by: read_string(row, FolioContentVersions::CreatedBy)?,
    })
}

/// Newest version of the item holding `view_id`.
async fn view_holder<C: ConnectionTrait>(
    conn: &C,
    id_type: i32,
    key: &str,
    view_id: i32,
) -> FolioResult<Option<VersionRow>> {
    let select = Query::select()
        .columns([
            (FolioContentVersions::Table, FolioContentVersions::VersionId),
            (FolioContentVersions::Table, FolioContentVersions::Version),
            (FolioContentVersions::Table, FolioContentVersions::CreatedAt),
            (FolioContentVersions::Table, FolioContentVersions::CreatedBy),
        ])
        .from(FolioContentViews::Table)
        .inner_join(
            FolioContentVersions::Table,
            Expr::col((FolioContentVersions::Table, FolioContentVersions::VersionId))
                .equals((FolioContentViews::Table, FolioContentViews::VersionId)),
        )
        .and_where(Expr::col((FolioContentViews::Table, FolioContentViews::IdType)).eq(id_type))
        .and_where(Expr::col((FolioContentViews::Table, FolioContentViews::Id)).eq(key))
        .and_where(Expr::col((FolioContentViews::Table, FolioContentViews::ViewId)).eq(view_id))
        .order_by(
            (FolioContentVersions::Table, FolioContentVersions::VersionId),
            Order::Desc,
        )
        .limit(1)
        .to_owned();
    query_one(conn, &select)
        .await?
        .map(|row| read_version_row(&row))
        .transpose()
}

async fn clear_view<C: ConnectionTrait>(
    conn: &C,
    id_type: i32,
    key: &str,
    view_id: i32,
) -> FolioResult<u64> {
    let delete = Query::delete()
        .from_table(FolioContentViews::Table)
        .and_where(Expr::col(FolioContentViews::IdType).eq(id_type))
        .and_where(Expr::col(FolioContentViews::Id).eq(key))
        .and_where(Expr::col(FolioContentViews::ViewId).eq(view_id))
        .to_owned();
    exec(conn, &delete).await
}

/// Detaches `view_id` from whichever version holds it and attaches it to
/// `version_id`.
async fn assign_view<C: ConnectionTrait>(
    conn: &C,
    id_type: i32,
    key: &str,
    view_id: i32,
    version_id: i32,
    subject: &Subject,
    now: i64,
) -> FolioResult<()> {
    clear_view(conn, id_type, key, view_id).await?;
    let insert = Query::insert()
        .into_table(FolioContentViews::Table)
        .columns([
            FolioContentViews::IdType,
            FolioContentViews::Id,
            FolioContentViews::ViewId,
            FolioContentViews::VersionId,
            FolioContentViews::CreatedAt,
            FolioContentViews::CreatedBy,
        ])
        .values_panic([
            id_type.into(),
            key.into(),
            view_id.into(),
            version_id.into(),
            now.into(),
            subject.principal_id.as_str().into(),
        ])
        .to_owned();
    exec(conn, &insert).await?;
    Ok(())
}

async fn apply_operations<C: ConnectionTrait>(
    conn: &C,
    lookups: &LookupTables,
    id_type: i32,
    key: &str,
    operations: &[ContentOperation],
) -> FolioResult<()> {
    for operation in operations {
        match operation {
            ContentOperation::SetAlias { namespace, alias } => {
                let alias_id = lookups.aliases.id(namespace).ok_or_else(|| {
                    FolioError::invalid(format!("unknown alias namespace '{namespace}'"))
                })?;
                if alias.is_empty() {
                    return Err(FolioError::invalid("alias value must not be empty"));
                }
                let delete = Query::delete()
                    .from_table(FolioContentAliases::Table)
                    .and_where(Expr::col(FolioContentAliases::AliasId).eq(alias_id))
                    .and_where(Expr::col(FolioContentAliases::Value).eq(alias.as_str()))
                    .to_owned();
                exec(conn, &delete).await?;
                let insert = Query::insert()
                    .into_table(FolioContentAliases::Table)
                    .columns([
                        FolioContentAliases::AliasId,
                        FolioContentAliases::Value,
                        FolioContentAliases::IdType,
                        FolioContentAliases::Id,
                    ])
                    .values_panic([
                        alias_id.into(),
                        alias.as_str().into(),
                        id_type.into(),
                        key.into(),
                    ])
                    .to_owned();
                exec(conn, &insert).await?;
            }
        }
    }
    Ok(())
}

async fn content_type_of<C: ConnectionTrait>(
    conn: &C,
    version_id: i32,
) -> FolioResult<Option<String>> {
    let select = Query::select()
        .from(FolioContents::Table)
        .column(FolioContents::ContentType)
        .and_where(Expr::col(FolioContents::VersionId).eq(version_id))
        .to_owned();
    query_one(conn, &select)
        .await?
        .map(|row| read_string(&row, FolioContents::ContentType))
        .transpose()
}

async fn select_key<C, K>(conn: &C, select: &SelectStatement, column: K) -> FolioResult<i32>
where
    C: ConnectionTrait,
    K: sea_orm::sea_query::Iden,
{
    let row = query_one(conn, select)
        .await?
        .ok_or_else(|| FolioError::storage("inserted row could not be read back"))?;
    read_i32(&row, column)
}

#[cfg(test)]
mod tests {
    use super::aspect_md5;

    #[test]
    fn md5_is_lowercase_hex_of_the_serialized_aspect() {
        assert_eq!(aspect_md5(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(aspect_md5(r#"{"body":"x"}"#).len(), 32);
    }
}
