pub mod error;
pub mod local;
pub mod memory;
pub mod operator;
pub mod s3;
pub mod session;
pub mod webdav;

#[cfg(test)]
pub(crate) mod scripted;

use crate::config::{StorageConfig, StorageType};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use error::{ErrorClass, RemoteError};
pub use memory::MemoryStore;
pub use operator::OperatorStore;
pub use session::{Session, SessionProvider, StaticSessionProvider};

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, rename 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;
/// 单页列表的默认条目数
pub const DEFAULT_PAGE_SIZE: usize = 1000;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// 远程列表条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    /// 以 `/` 开头的远程路径
    pub path: String,
    pub size: u64,
    pub modified_time: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

impl RemoteEntry {
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            modified_time: None,
            is_dir: false,
        }
    }
}

/// 分页列表结果，`cursor` 为 `None` 表示已到末页
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    pub cursor: Option<String>,
}

/// 上传写入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// 覆盖已有对象（幂等）
    #[default]
    Overwrite,
    /// 仅当对象不存在时写入，否则返回 Conflict
    Add,
}

/// 远程对象存储接口
///
/// 所有方法都是单次请求/响应，不包含任何重试逻辑；重试由
/// [`crate::core::retry::RetryController`] 统一负责。
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 列出目录（第一页）
    async fn list_folder(&self, path: &str, recursive: bool) -> RemoteResult<ListPage>;

    /// 使用游标继续列出下一页
    async fn list_folder_continue(&self, cursor: &str) -> RemoteResult<ListPage>;

    /// 上传整个对象
    async fn upload(&self, path: &str, data: Bytes, mode: WriteMode) -> RemoteResult<()>;

    /// 移动/重命名对象，源不存在时返回 NotFound
    async fn move_object(&self, from: &str, to: &str) -> RemoteResult<()>;

    /// 获取临时下载链接
    async fn get_temporary_link(&self, path: &str) -> RemoteResult<String>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 规范化远程路径：统一使用 `/`，以 `/` 开头，去掉重复分隔符和结尾 `/`
pub fn normalize_remote_path(path: &str) -> String {
    let joined = path
        .replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined)
}

/// 根据配置创建远程存储实例
pub fn create_store(
    config: &StorageConfig,
    session: Option<Arc<dyn SessionProvider>>,
) -> Result<Arc<dyn RemoteStore>> {
    let page_size = config.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    match config.typ {
        StorageType::Memory => {
            tracing::info!("初始化内存存储");
            Ok(Arc::new(MemoryStore::new().with_page_size(page_size)) as Arc<dyn RemoteStore>)
        }
        StorageType::Fs => {
            let root = config
                .root
                .clone()
                .ok_or_else(|| anyhow::anyhow!("fs storage requires root"))?;
            tracing::info!("初始化本地目录存储: {}", root);
            let store = OperatorStore::new(format!("fs:{}", root), move |_| {
                local::fs_operator(&root)
            })?;
            Ok(Arc::new(store.with_page_size(page_size)) as Arc<dyn RemoteStore>)
        }
        StorageType::S3 => {
            let params = s3::S3Params::from_config(config)?;
            tracing::info!("初始化S3存储: bucket={}, region={}", params.bucket, params.region);
            let name = params.display_name();
            let mut store = OperatorStore::new(name, move |session| params.operator(session))?
                .with_page_size(page_size)
                .with_link_ttl(config.link_ttl());
            if let Some(provider) = session {
                store = store.with_session_provider(provider);
            }
            Ok(Arc::new(store) as Arc<dyn RemoteStore>)
        }
        StorageType::WebDav => {
            let params = webdav::WebDavParams::from_config(config)?;
            tracing::info!("创建WebDAV存储: endpoint={}, root={:?}", params.endpoint, params.root);
            let name = params.display_name();
            let mut store = OperatorStore::new(name, move |session| params.operator(session))?
                .with_page_size(page_size);
            if let Some(provider) = session {
                store = store.with_session_provider(provider);
            }
            Ok(Arc::new(store) as Arc<dyn RemoteStore>)
        }
    }
}
