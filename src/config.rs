//! 应用配置模块
//!
//! 所有配置保存在同一个 `config.json` 中，按功能分段（`log`、`remote`、
//! `transfer`、`backoff`、`migration`、`report`），缺省字段使用默认值。

use crate::core::retry::BackoffConfig;
use crate::logging::LogConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 存储类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Memory,
    Fs,
    S3,
    WebDav,
}

/// 远程存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub typ: StorageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// 列表分页大小
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    /// 临时链接有效期（秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_ttl_secs: Option<u64>,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            typ: StorageType::Memory,
            root: None,
            bucket: None,
            region: None,
            access_key: None,
            secret_key: None,
            endpoint: None,
            prefix: None,
            username: None,
            password: None,
            page_size: None,
            link_ttl_secs: None,
        }
    }

    pub fn link_ttl(&self) -> Duration {
        Duration::from_secs(self.link_ttl_secs.unwrap_or(4 * 3600))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::memory()
    }
}

/// 上传（同步）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    /// 本地根目录
    #[serde(default)]
    pub local_root: PathBuf,
    /// 远程根目录
    #[serde(default = "default_remote_root")]
    pub remote_root: String,
    /// 断点文件路径，未设置时放在配置目录下
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,
    /// 单文件大小上限（字节），超过则跳过
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// 单次运行最多处理的待上传文件数
    #[serde(default)]
    pub batch_limit: Option<usize>,
    /// 每完成多少个文件刷新一次断点
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    /// 最大并发上传数
    #[serde(default = "default_concurrency")]
    pub max_concurrent_transfers: usize,
    /// 是否跟随符号链接
    #[serde(default)]
    pub follow_links: bool,
    /// 排除规则（glob patterns）
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_remote_root() -> String {
    "/".to_string()
}

fn default_max_file_size() -> u64 {
    150 * 1024 * 1024 // 150 MiB
}

fn default_flush_every() -> usize {
    1
}

fn default_concurrency() -> usize {
    1
}

pub fn default_exclude_patterns() -> Vec<String> {
    vec![
        ".git/**".to_string(),
        ".svn/**".to_string(),
        ".DS_Store".to_string(),
        "Thumbs.db".to_string(),
        "*.tmp".to_string(),
    ]
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            local_root: PathBuf::new(),
            remote_root: default_remote_root(),
            checkpoint_path: None,
            max_file_size: default_max_file_size(),
            batch_limit: None,
            flush_every: default_flush_every(),
            max_concurrent_transfers: default_concurrency(),
            follow_links: false,
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// 远程批量重命名配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfig {
    /// 要列出的远程目录
    #[serde(default = "default_remote_root")]
    pub folder: String,
    /// 匹配子串
    #[serde(default, rename = "match")]
    pub pattern: String,
    /// 替换内容
    #[serde(default)]
    pub replace: String,
    #[serde(default = "default_concurrency")]
    pub max_concurrent: usize,
}

impl MigrationConfig {
    /// 替换内容包含匹配子串时，重命名后的路径仍会匹配，每次运行都会再改一次
    pub fn validate(&self) -> Result<()> {
        if self.pattern.is_empty() {
            anyhow::bail!("migration.match must not be empty");
        }
        if self.replace.contains(&self.pattern) {
            anyhow::bail!(
                "migration.replace \"{}\" contains migration.match \"{}\"; renamed paths would match again on every run",
                self.replace,
                self.pattern
            );
        }
        Ok(())
    }
}

/// 分类报告配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    /// 报告输出路径，未设置时输出到标准输出
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// 完整应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub remote: StorageConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl AppConfig {
    /// 从配置文件加载；文件不存在时返回默认配置
    pub fn load(config_file: &Path) -> Result<Self> {
        if !config_file.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(config_file)
            .with_context(|| format!("failed to read {}", config_file.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid config file {}", config_file.display()))
    }

    /// 保存配置
    pub fn save(&self, config_file: &Path) -> Result<()> {
        if let Some(parent) = config_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(config_file, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// 断点文件路径，未配置时放在 `config_dir` 下
    pub fn checkpoint_path(&self, config_dir: &Path) -> PathBuf {
        self.transfer
            .checkpoint_path
            .clone()
            .unwrap_or_else(|| config_dir.join("checkpoint.json"))
    }

    /// 通用校验（退避参数）
    pub fn validate(&self) -> Result<()> {
        self.backoff.validate()
    }

    /// 同步运行前的配置校验
    pub fn validate_sync(&self) -> Result<()> {
        if self.transfer.local_root.as_os_str().is_empty() {
            anyhow::bail!("transfer.localRoot is required");
        }
        if self.transfer.flush_every == 0 {
            anyhow::bail!("transfer.flushEvery must be at least 1");
        }
        self.validate()
    }

    /// 重命名运行前的配置校验
    pub fn validate_migration(&self) -> Result<()> {
        self.migration.validate()?;
        self.validate()
    }
}
