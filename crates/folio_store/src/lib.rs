pub mod config;
pub mod datastore;
mod db;
pub mod feed;
pub mod lookup;
pub mod manager;
pub mod migration;
mod sql;
pub mod store;

pub use folio_core::*;
pub use config::{DatabaseConfig, FeedConfig, FeedSettings, FolioConfig, IdsConfig, PoolConfig};
pub use datastore::{default_sqlite_path, load_or_init_config, open_manager, open_store};
pub use feed::{object_type_for, ChangeFeed, FAILPOINT_CHANGE_FEED_RECORD};
pub use lookup::{LookupTables, Lookups, NameMap};
pub use manager::ContentManager;
pub use store::{ContentStore, UpdateMode, FAILPOINT_AFTER_VERSION_INSERT};
