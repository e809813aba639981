use std::path::{Path, PathBuf};

use crate::{ContentManager, ContentStore, FolioConfig, FolioResult};

const DEFAULT_DB_NAME: &str = "folio.sqlite";

pub fn load_or_init_config(base: &Path) -> FolioResult<FolioConfig> {
    let default_sqlite = base.join(DEFAULT_DB_NAME);
    FolioConfig::load_or_init(base, &default_sqlite)
}

pub async fn open_store(base: &Path) -> FolioResult<ContentStore> {
    let config = load_or_init_config(base)?;
    ContentStore::connect(&config, base).await
}

pub async fn open_manager(base: &Path) -> FolioResult<ContentManager> {
    let config = load_or_init_config(base)?;
    ContentManager::connect(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}

#[cfg(test)]
mod tests {
    use super::{default_sqlite_path, load_or_init_config, open_manager};
    use tempfile::tempdir;

    #[tokio::test]
    async fn opens_manager_with_default_config() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path();
        let config = load_or_init_config(base).expect("config");
        assert_eq!(config.backend_name(), "sqlite");
        let manager = open_manager(base).await.expect("open manager");
        assert!(default_sqlite_path(base).exists());
        assert!(base.join("folio.json").exists());
        assert_eq!(manager.feed().max_commit_id(), 0);
    }
}
