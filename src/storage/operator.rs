use super::{
    ListPage, RemoteEntry, RemoteError, RemoteResult, RemoteStore, Session, SessionProvider,
    WriteMode, DEFAULT_PAGE_SIZE,
};
use crate::storage::ErrorClass;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use opendal::{Lister, Metakey, Operator};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

type OperatorBuilder = dyn Fn(Option<&Session>) -> Result<Operator> + Send + Sync;

/// 尚未读完的列表
struct PendingListing {
    lister: Lister,
    dir: String,
}

struct OperatorState {
    operator: Operator,
    session: Option<Session>,
}

/// 基于 opendal `Operator` 的远程存储（fs / S3 / WebDAV）
pub struct OperatorStore {
    name: String,
    build: Box<OperatorBuilder>,
    provider: Option<Arc<dyn SessionProvider>>,
    state: RwLock<OperatorState>,
    listings: Mutex<HashMap<String, PendingListing>>,
    page_size: usize,
    link_ttl: Duration,
}

/// 转换为 opendal 使用的相对路径（不带前导 `/`）
fn to_op_path(path: &str) -> String {
    super::normalize_remote_path(path)
        .trim_start_matches('/')
        .to_string()
}

fn to_op_dir(path: &str) -> String {
    let p = to_op_path(path);
    if p.is_empty() {
        p
    } else {
        format!("{}/", p)
    }
}

impl OperatorStore {
    pub fn new<F>(name: String, build: F) -> Result<Self>
    where
        F: Fn(Option<&Session>) -> Result<Operator> + Send + Sync + 'static,
    {
        let operator = build(None)?;
        Ok(Self {
            name,
            build: Box::new(build),
            provider: None,
            state: RwLock::new(OperatorState {
                operator,
                session: None,
            }),
            listings: Mutex::new(HashMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            link_ttl: Duration::from_secs(4 * 3600),
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_link_ttl(mut self, ttl: Duration) -> Self {
        self.link_ttl = ttl;
        self
    }

    pub fn with_session_provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// 显式刷新会话并重建 operator
    pub async fn refresh_session(&self) -> RemoteResult<()> {
        let Some(provider) = &self.provider else {
            return Ok(());
        };
        let session = provider.fetch().await.map_err(|e| {
            RemoteError::new(ErrorClass::Permanent, "", format!("session refresh failed: {:#}", e))
        })?;
        let operator = (self.build)(Some(&session)).map_err(|e| {
            RemoteError::new(ErrorClass::Permanent, "", format!("operator rebuild failed: {:#}", e))
        })?;

        let mut state = self.state.write().await;
        state.operator = operator;
        state.session = Some(session);
        info!("{}: 会话已刷新", self.name);
        Ok(())
    }

    /// 获取当前 operator，会话缺失或过期时先刷新
    async fn operator(&self) -> RemoteResult<Operator> {
        if self.provider.is_some() {
            let stale = {
                let state = self.state.read().await;
                state
                    .session
                    .as_ref()
                    .map_or(true, |s| s.is_expired(chrono::Utc::now()))
            };
            if stale {
                self.refresh_session().await?;
            }
        }
        Ok(self.state.read().await.operator.clone())
    }

    /// 从 lister 中读取一页；未读完时登记游标
    async fn read_page(&self, mut lister: Lister, dir: String) -> RemoteResult<ListPage> {
        let mut entries = Vec::new();
        let mut exhausted = false;

        while entries.len() < self.page_size {
            match lister
                .try_next()
                .await
                .map_err(|e| RemoteError::from_opendal(e, &dir))?
            {
                Some(entry) => {
                    let path = entry.path().to_string();
                    // 跳过目录本身
                    if path.is_empty() || path == "/" || path == dir {
                        continue;
                    }
                    let meta = entry.metadata();
                    entries.push(RemoteEntry {
                        path: super::normalize_remote_path(&path),
                        size: meta.content_length(),
                        modified_time: meta.last_modified(),
                        is_dir: meta.is_dir(),
                    });
                }
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        let cursor = if exhausted {
            None
        } else {
            let cursor = uuid::Uuid::new_v4().to_string();
            self.listings
                .lock()
                .await
                .insert(cursor.clone(), PendingListing { lister, dir });
            Some(cursor)
        };

        Ok(ListPage { entries, cursor })
    }
}

#[async_trait]
impl RemoteStore for OperatorStore {
    async fn list_folder(&self, path: &str, recursive: bool) -> RemoteResult<ListPage> {
        let operator = self.operator().await?;
        let dir = to_op_dir(path);

        let lister = operator
            .lister_with(&dir)
            .recursive(recursive)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode)
            .await
            .map_err(|e| RemoteError::from_opendal(e, path))?;

        self.read_page(lister, dir).await
    }

    async fn list_folder_continue(&self, cursor: &str) -> RemoteResult<ListPage> {
        let pending = self.listings.lock().await.remove(cursor).ok_or_else(|| {
            RemoteError::new(ErrorClass::Permanent, "", format!("unknown cursor: {}", cursor))
        })?;
        self.read_page(pending.lister, pending.dir).await
    }

    async fn upload(&self, path: &str, data: Bytes, mode: WriteMode) -> RemoteResult<()> {
        let operator = self.operator().await?;
        let op_path = to_op_path(path);

        if mode == WriteMode::Add {
            match operator.stat(&op_path).await {
                Ok(_) => {
                    return Err(RemoteError::new(
                        ErrorClass::Conflict,
                        path,
                        "object already exists",
                    ))
                }
                Err(e) if e.kind() == opendal::ErrorKind::NotFound => {}
                Err(e) => return Err(RemoteError::from_opendal(e, path)),
            }
        }

        debug!("{}: 写入 {} ({} 字节)", self.name, op_path, data.len());
        operator
            .write(&op_path, data)
            .await
            .map_err(|e| RemoteError::from_opendal(e, path))?;
        Ok(())
    }

    async fn move_object(&self, from: &str, to: &str) -> RemoteResult<()> {
        let operator = self.operator().await?;
        let (src, dst) = (to_op_path(from), to_op_path(to));
        let capability = operator.info().full_capability();

        if capability.rename {
            return operator
                .rename(&src, &dst)
                .await
                .map_err(|e| RemoteError::from_opendal(e, from));
        }

        if !capability.copy {
            return Err(RemoteError::new(
                ErrorClass::Permanent,
                from,
                format!("{} supports neither rename nor copy", self.name),
            ));
        }

        // 不支持 rename 的服务（如 S3）：复制后删除源对象
        operator
            .stat(&src)
            .await
            .map_err(|e| RemoteError::from_opendal(e, from))?;
        operator
            .copy(&src, &dst)
            .await
            .map_err(|e| RemoteError::from_opendal(e, from))?;
        operator
            .delete(&src)
            .await
            .map_err(|e| RemoteError::from_opendal(e, from))?;
        Ok(())
    }

    async fn get_temporary_link(&self, path: &str) -> RemoteResult<String> {
        let operator = self.operator().await?;
        if !operator.info().full_capability().presign_read {
            return Err(RemoteError::new(
                ErrorClass::Permanent,
                path,
                format!("{} does not support temporary links", self.name),
            ));
        }
        let req = operator
            .presign_read(&to_op_path(path), self.link_ttl)
            .await
            .map_err(|e| RemoteError::from_opendal(e, path))?;
        Ok(req.uri().to_string())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::local::fs_operator;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fs_store(dir: &std::path::Path) -> OperatorStore {
        let root = dir.to_string_lossy().to_string();
        OperatorStore::new("fs:test".into(), move |_| fs_operator(&root)).unwrap()
    }

    #[test]
    fn test_op_paths() {
        assert_eq!(to_op_path("/a/b.png"), "a/b.png");
        assert_eq!(to_op_dir("/a"), "a/");
        assert_eq!(to_op_dir("/"), "");
    }

    #[tokio::test]
    async fn test_fs_upload_list_and_move() {
        let dir = tempfile::tempdir().unwrap();
        let store = fs_store(dir.path()).with_page_size(2);

        for name in ["a.png", "b.png", "c.png"] {
            store
                .upload(&format!("/assets/{}", name), Bytes::from_static(b"x"), WriteMode::Overwrite)
                .await
                .unwrap();
        }

        let mut page = store.list_folder("/assets", true).await.unwrap();
        let mut paths: Vec<String> = page.entries.iter().map(|e| e.path.clone()).collect();
        while let Some(cursor) = page.cursor.take() {
            page = store.list_folder_continue(&cursor).await.unwrap();
            paths.extend(page.entries.iter().map(|e| e.path.clone()));
        }
        paths.sort();
        assert_eq!(paths, vec!["/assets/a.png", "/assets/b.png", "/assets/c.png"]);

        store.move_object("/assets/a.png", "/assets/z.png").await.unwrap();
        assert!(dir.path().join("assets/z.png").exists());

        let err = store
            .move_object("/assets/a.png", "/assets/z.png")
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::NotFound);
    }

    #[tokio::test]
    async fn test_add_mode_conflicts_on_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = fs_store(dir.path());
        store
            .upload("/x.bin", Bytes::from_static(b"1"), WriteMode::Add)
            .await
            .unwrap();
        let err = store
            .upload("/x.bin", Bytes::from_static(b"2"), WriteMode::Add)
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Conflict);
    }

    #[tokio::test]
    async fn test_fs_has_no_temporary_links() {
        let dir = tempfile::tempdir().unwrap();
        let store = fs_store(dir.path());
        let err = store.get_temporary_link("/x.bin").await.unwrap_err();
        assert_eq!(err.class, ErrorClass::Permanent);
    }

    struct CountingProvider(AtomicU32);

    #[async_trait]
    impl SessionProvider for CountingProvider {
        async fn fetch(&self) -> Result<Session> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Session::new("tok", None))
        }
    }

    #[tokio::test]
    async fn test_session_fetched_once_when_not_expiring() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(CountingProvider(AtomicU32::new(0)));
        let store = fs_store(dir.path()).with_session_provider(provider.clone());

        store
            .upload("/a.bin", Bytes::from_static(b"1"), WriteMode::Overwrite)
            .await
            .unwrap();
        store
            .upload("/b.bin", Bytes::from_static(b"1"), WriteMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);

        store.refresh_session().await.unwrap();
        assert_eq!(provider.0.load(Ordering::SeqCst), 2);
    }
}
