pub mod config;
pub mod core;
pub mod logging;
pub mod shutdown;
pub mod storage;

pub use config::{AppConfig, StorageConfig, StorageType};
pub use crate::core::{MigrationOperator, MigrationSummary, SyncConfig, SyncEngine, SyncReport};
pub use storage::{create_store, RemoteStore};

/// 默认配置目录
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::config_dir()
        .map(|p| p.join("assetsync"))
        .unwrap_or_else(|| std::path::PathBuf::from(".assetsync"))
}

pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
