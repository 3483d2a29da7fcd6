use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::dispatcher::Dispatcher;
use crate::store::FileStore;

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("MENTOR_CLI_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("mentor").join("cli")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn credentials_path() -> anyhow::Result<PathBuf> {
    Ok(get_config_dir()?.join("credentials.json"))
}

pub fn open_store() -> anyhow::Result<FileStore> {
    Ok(FileStore::new(credentials_path()?))
}

/// Dispatcher wired to the CLI credential file and the environment config
pub fn build_dispatcher() -> anyhow::Result<Dispatcher> {
    let store = Arc::new(open_store()?);
    let dispatcher = Dispatcher::builder(AppConfig::clone(crate::config::config()))
        .store(store)
        .on_status(401, |err| {
            tracing::warn!("Server rejected credentials ({}); run `mentor token set` to refresh", err.status);
        })
        .build()?;
    Ok(dispatcher)
}
