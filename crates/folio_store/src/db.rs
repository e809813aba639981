use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum FolioIdTypes {
    Table,
    IdTypeId,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioViews {
    Table,
    ViewId,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioEventTypes {
    Table,
    EventTypeId,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioAttributes {
    Table,
    AttrId,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioAliases {
    Table,
    AliasId,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioContentIds {
    Table,
    IdType,
    Id,
    Revision,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioContentVersions {
    Table,
    VersionId,
    IdType,
    Id,
    Version,
    CreatedAt,
    CreatedBy,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioContents {
    Table,
    ContentId,
    VersionId,
    ContentType,
    CreatedAt,
    CreatedBy,
    ModifiedAt,
    ModifiedBy,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioAspects {
    Table,
    AspectId,
    VersionId,
    Name,
    Data,
    Md5,
    CreatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioAspectLocations {
    Table,
    ContentId,
    AspectId,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioContentViews {
    Table,
    IdType,
    Id,
    ViewId,
    VersionId,
    CreatedAt,
    CreatedBy,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioContentAliases {
    Table,
    AliasId,
    Value,
    IdType,
    Id,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioChangelist {
    Table,
    Id,
    EventType,
    IdType,
    ContentId,
    Version,
    ContentType,
    CreatedAt,
    CreatedBy,
    ModifiedAt,
    ModifiedBy,
    CommitAt,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioChangelistAttributes {
    Table,
    Id,
    AttrId,
    StrValue,
    NumValue,
}

#[derive(Iden, Clone, Copy)]
pub enum FolioEventQueue {
    Table,
    EventId,
    EventType,
    CommitId,
    CreatedAt,
    CreatedBy,
}
