//! Name to surrogate-key maps for the seeded lookup tables.
//!
//! [`Lookups`] is built once when the store connects and is shared by the
//! content store and the change feed. Rows added to the lookup tables at
//! runtime are only picked up by an explicit [`Lookups::refresh`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use sea_orm::ConnectionTrait;
use sea_orm::sea_query::{Iden, Query};

use folio_core::{FolioError, FolioResult, View};

use crate::db::*;
use crate::sql::{col_name, query_all, read_i32, read_string};

#[derive(Clone, Debug, Default)]
pub struct NameMap {
    by_name: HashMap<String, i32>,
    by_id: HashMap<i32, String>,
}

impl NameMap {
    fn insert(&mut self, id: i32, name: String) {
        self.by_id.insert(id, name.clone());
        self.by_name.insert(name, id);
    }

    pub fn id(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: i32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct LookupTables {
    pub id_types: NameMap,
    pub views: NameMap,
    pub event_types: NameMap,
    pub attributes: NameMap,
    pub aliases: NameMap,
}

impl LookupTables {
    pub fn view_id(&self, view: &View) -> Option<i32> {
        self.views.id(view.name())
    }

    /// Surrogate key of a view the store relies on; missing seeds are a
    /// configuration error.
    pub fn require_view(&self, view: &View) -> FolioResult<i32> {
        self.view_id(view).ok_or_else(|| {
            FolioError::configuration(format!("view '{}' is not registered", view.name()))
        })
    }

    pub fn require_event_type(&self, name: &str) -> FolioResult<i32> {
        self.event_types
            .id(name)
            .ok_or_else(|| FolioError::configuration(format!("event type '{name}' is not registered")))
    }
}

#[derive(Debug)]
pub struct Lookups {
    tables: RwLock<Arc<LookupTables>>,
}

impl Lookups {
    pub fn new(tables: LookupTables) -> Self {
        Self {
            tables: RwLock::new(Arc::new(tables)),
        }
    }

    pub async fn load<C: ConnectionTrait>(conn: &C) -> FolioResult<Self> {
        Ok(Self::new(read_tables(conn).await?))
    }

    /// Re-reads every lookup table and swaps the snapshot in place.
    pub async fn refresh<C: ConnectionTrait>(&self, conn: &C) -> FolioResult<()> {
        let tables = read_tables(conn).await?;
        log::info!(
            "lookup caches refreshed: {} id types, {} views, {} event types, {} attributes, {} alias namespaces",
            tables.id_types.len(),
            tables.views.len(),
            tables.event_types.len(),
            tables.attributes.len(),
            tables.aliases.len()
        );
        let mut guard = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(tables);
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<LookupTables> {
        let guard = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }
}

async fn read_tables<C: ConnectionTrait>(conn: &C) -> FolioResult<LookupTables> {
    Ok(LookupTables {
        id_types: read_map(conn, FolioIdTypes::Table, FolioIdTypes::IdTypeId, FolioIdTypes::Name)
            .await?,
        views: read_map(conn, FolioViews::Table, FolioViews::ViewId, FolioViews::Name).await?,
        event_types: read_map(
            conn,
            FolioEventTypes::Table,
            FolioEventTypes::EventTypeId,
            FolioEventTypes::Name,
        )
        .await?,
        attributes: read_map(
            conn,
            FolioAttributes::Table,
            FolioAttributes::AttrId,
            FolioAttributes::Name,
        )
        .await?,
        aliases: read_map(conn, FolioAliases::Table, FolioAliases::AliasId, FolioAliases::Name)
            .await?,
    })
}

async fn read_map<C, T, K, N>(conn: &C, table: T, key: K, name: N) -> FolioResult<NameMap>
where
    C: ConnectionTrait,
    T: Iden + Copy + 'static,
    K: Iden + Copy + 'static,
    N: Iden + Copy + 'static,
{
    let select = Query::select()
        .from(table)
        .column(key)
        .column(name)
        .to_owned();
    let rows = query_all(conn, &select).await?;
    let mut map = NameMap::default();
    for row in rows {
        let id = read_i32(&row, key)?;
        let label = read_string(&row, name)?;
        map.insert(id, label);
    }
    if map.is_empty() {
        return Err(FolioError::configuration(format!(
            "lookup table '{}' is empty",
            col_name(table)
        )));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use folio_core::View;

    use super::{LookupTables, Lookups, NameMap};

    fn views() -> NameMap {
        let mut map = NameMap::default();
        map.insert(1, "p.latest".to_string());
        map.insert(3, "p.public".to_string());
        map
    }

    #[test]
    fn name_map_resolves_both_ways() {
        let map = views();
        assert_eq!(map.id("p.public"), Some(3));
        assert_eq!(map.name(1), Some("p.latest"));
        assert_eq!(map.id("p.deleted"), None);
    }

    #[test]
    fn missing_views_are_configuration_errors() {
        let lookups = Lookups::new(LookupTables {
            views: views(),
            ..LookupTables::default()
        });
        let tables = lookups.snapshot();
        assert_eq!(tables.require_view(&View::Latest).expect("latest"), 1);
        assert!(tables.require_view(&View::Deleted).is_err());
        assert_eq!(tables.view_id(&View::Other("p.archive".to_string())), None);
    }
}
