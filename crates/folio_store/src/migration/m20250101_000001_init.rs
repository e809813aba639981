use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ConnectionTrait, Statement};

use crate::db::*;
use crate::sql::build_stmt;

pub const ID_TYPES: [(i32, &str); 2] = [(1, "onecms"), (2, "draft")];
pub const VIEWS: [(i32, &str); 3] = [(1, "p.latest"), (2, "p.deleted"), (3, "p.public")];
pub const EVENT_TYPES: [(i32, &str); 3] = [(1, "CREATE"), (2, "UPDATE"), (3, "DELETE")];
pub const ATTRIBUTES: [(i32, &str); 8] = [
    (1, "objectType"),
    (2, "created_by"),
    (3, "modifier"),
    (4, "creationTime"),
    (5, "modificationTime"),
    (6, "securityParentId"),
    (7, "insertParentId"),
    (8, "partition"),
];
pub const ALIASES: [(i32, &str); 1] = [(1, "externalId")];

const KEY_LEN: u32 = 64;
const VERSION_LEN: u32 = 32;
const NAME_LEN: u32 = 255;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        create_lookup_table(manager, FolioIdTypes::Table, FolioIdTypes::IdTypeId, FolioIdTypes::Name)
            .await?;
        create_lookup_table(manager, FolioViews::Table, FolioViews::ViewId, FolioViews::Name)
            .await?;
        create_lookup_table(
            manager,
            FolioEventTypes::Table,
            FolioEventTypes::EventTypeId,
            FolioEventTypes::Name,
        )
        .await?;
        create_lookup_table(
            manager,
            FolioAttributes::Table,
            FolioAttributes::AttrId,
            FolioAttributes::Name,
        )
        .await?;
        create_lookup_table(manager, FolioAliases::Table, FolioAliases::AliasId, FolioAliases::Name)
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FolioContentIds::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FolioContentIds::IdType).integer().not_null())
                    .col(
                        ColumnDef::new(FolioContentIds::Id)
                            .string_len(KEY_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentIds::Revision)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FolioContentIds::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentIds::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_folio_content_ids")
                            .col(FolioContentIds::IdType)
                            .col(FolioContentIds::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FolioContentVersions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FolioContentVersions::VersionId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FolioContentVersions::IdType)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentVersions::Id)
                            .string_len(KEY_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentVersions::Version)
                            .string_len(VERSION_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentVersions::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentVersions::CreatedBy)
                            .string_len(NAME_LEN)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FolioContents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FolioContents::ContentId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FolioContents::VersionId)
                            .integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(FolioContents::ContentType)
                            .string_len(NAME_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContents::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContents::CreatedBy)
                            .string_len(NAME_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContents::ModifiedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContents::ModifiedBy)
                            .string_len(NAME_LEN)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FolioAspects::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FolioAspects::AspectId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FolioAspects::VersionId).integer().not_null())
                    .col(
                        ColumnDef::new(FolioAspects::Name)
                            .string_len(NAME_LEN)
                            .not_null(),
                    )
                    .col(ColumnDef::new(FolioAspects::Data).text().not_null())
                    .col(ColumnDef::new(FolioAspects::Md5).string_len(32).not_null())
                    .col(
                        ColumnDef::new(FolioAspects::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FolioAspectLocations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FolioAspectLocations::ContentId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioAspectLocations::AspectId)
                            .integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_folio_aspect_locations")
                            .col(FolioAspectLocations::ContentId)
                            .col(FolioAspectLocations::AspectId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FolioContentViews::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FolioContentViews::IdType)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentViews::Id)
                            .string_len(KEY_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentViews::ViewId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentViews::VersionId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentViews::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentViews::CreatedBy)
                            .string_len(NAME_LEN)
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_folio_content_views")
                            .col(FolioContentViews::IdType)
                            .col(FolioContentViews::Id)
                            .col(FolioContentViews::ViewId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FolioContentAliases::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FolioContentAliases::AliasId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentAliases::Value)
                            .string_len(NAME_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentAliases::IdType)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioContentAliases::Id)
                            .string_len(KEY_LEN)
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_folio_content_aliases")
                            .col(FolioContentAliases::AliasId)
                            .col(FolioContentAliases::Value),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FolioChangelist::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FolioChangelist::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FolioChangelist::EventType)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FolioChangelist::IdType).integer().not_null())
                    .col(
                        ColumnDef::new(FolioChangelist::ContentId)
                            .string_len(KEY_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioChangelist::Version)
                            .string_len(VERSION_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioChangelist::ContentType)
                            .string_len(NAME_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioChangelist::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioChangelist::CreatedBy)
                            .string_len(NAME_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioChangelist::ModifiedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioChangelist::ModifiedBy)
                            .string_len(NAME_LEN)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioChangelist::CommitAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FolioChangelistAttributes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FolioChangelistAttributes::Id)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioChangelistAttributes::AttrId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FolioChangelistAttributes::StrValue).string_len(1024))
                    .col(ColumnDef::new(FolioChangelistAttributes::NumValue).big_integer())
                    .primary_key(
                        Index::create()
                            .name("pk_folio_changelist_attributes")
                            .col(FolioChangelistAttributes::Id)
                            .col(FolioChangelistAttributes::AttrId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FolioEventQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FolioEventQueue::EventId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FolioEventQueue::EventType)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioEventQueue::CommitId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioEventQueue::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FolioEventQueue::CreatedBy)
                            .string_len(NAME_LEN)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        create_indexes(manager).await?;

        seed_lookup(manager, FolioIdTypes::Table, FolioIdTypes::IdTypeId, FolioIdTypes::Name, &ID_TYPES)
            .await?;
        seed_lookup(manager, FolioViews::Table, FolioViews::ViewId, FolioViews::Name, &VIEWS).await?;
        seed_lookup(
            manager,
            FolioEventTypes::Table,
            FolioEventTypes::EventTypeId,
            FolioEventTypes::Name,
            &EVENT_TYPES,
        )
        .await?;
        seed_lookup(
            manager,
            FolioAttributes::Table,
            FolioAttributes::AttrId,
            FolioAttributes::Name,
            &ATTRIBUTES,
        )
        .await?;
        seed_lookup(manager, FolioAliases::Table, FolioAliases::AliasId, FolioAliases::Name, &ALIASES)
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            FolioEventQueue::Table.into_iden(),
            FolioChangelistAttributes::Table.into_iden(),
            FolioChangelist::Table.into_iden(),
            FolioContentAliases::Table.into_iden(),
            FolioContentViews::Table.into_iden(),
            FolioAspectLocations::Table.into_iden(),
            FolioAspects::Table.into_iden(),
            FolioContents::Table.into_iden(),
            FolioContentVersions::Table.into_iden(),
            FolioContentIds::Table.into_iden(),
            FolioAliases::Table.into_iden(),
            FolioAttributes::Table.into_iden(),
            FolioEventTypes::Table.into_iden(),
            FolioViews::Table.into_iden(),
            FolioIdTypes::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}

async fn create_lookup_table<T, K, N>(
    manager: &SchemaManager<'_>,
    table: T,
    key: K,
    name: N,
) -> Result<(), DbErr>
where
    T: IntoIden + 'static,
    K: IntoIden + 'static,
    N: IntoIden + 'static,
{
    manager
        .create_table(
            Table::create()
                .table(table)
                .if_not_exists()
                .col(ColumnDef::new(key).integer().not_null().primary_key())
                .col(
                    ColumnDef::new(name)
                        .string_len(NAME_LEN)
                        .not_null()
                        .unique_key(),
                )
                .to_owned(),
        )
        .await
}

async fn seed_lookup<T, K, N>(
    manager: &SchemaManager<'_>,
    table: T,
    key: K,
    name: N,
    rows: &[(i32, &str)],
) -> Result<(), DbErr>
where
    T: IntoIden + 'static,
    K: IntoIden + 'static,
    N: IntoIden + 'static,
{
    let mut insert = Query::insert()
        .into_table(table)
        .columns([key.into_iden(), name.into_iden()])
        .to_owned();
    for (id, label) in rows {
        insert.values_panic([(*id).into(), (*label).into()]);
    }
    let backend = manager.get_database_backend();
    let (sql, values) = build_stmt(backend, &insert);
    manager
        .get_connection()
        .execute(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(())
}

async fn create_indexes(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_index(
            Index::create()
                .name("folio_content_versions_key_idx")
                .table(FolioContentVersions::Table)
                .col(FolioContentVersions::IdType)
                .col(FolioContentVersions::Id)
                .col(FolioContentVersions::Version)
                .unique()
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("folio_aspects_version_name_idx")
                .table(FolioAspects::Table)
                .col(FolioAspects::VersionId)
                .col(FolioAspects::Name)
                .unique()
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("folio_content_views_version_idx")
                .table(FolioContentViews::Table)
                .col(FolioContentViews::VersionId)
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("folio_content_aliases_target_idx")
                .table(FolioContentAliases::Table)
                .col(FolioContentAliases::IdType)
                .col(FolioContentAliases::Id)
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("folio_changelist_content_idx")
                .table(FolioChangelist::Table)
                .col(FolioChangelist::IdType)
                .col(FolioChangelist::ContentId)
                .unique()
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("folio_changelist_commit_at_idx")
                .table(FolioChangelist::Table)
                .col(FolioChangelist::CommitAt)
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("folio_event_queue_commit_idx")
                .table(FolioEventQueue::Table)
                .col(FolioEventQueue::CommitId)
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    Ok(())
}
