//! 进程内存储，用于演练运行（dry run）和测试

use super::{
    normalize_remote_path, ErrorClass, ListPage, RemoteEntry, RemoteError, RemoteResult,
    RemoteStore, WriteMode, DEFAULT_PAGE_SIZE,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone)]
struct Object {
    data: Bytes,
    modified_time: DateTime<Utc>,
}

pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Object>>,
    listings: Mutex<HashMap<String, VecDeque<RemoteEntry>>>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            listings: Mutex::new(HashMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// 读取对象内容
    pub async fn get(&self, path: &str) -> Option<Bytes> {
        self.objects
            .read()
            .await
            .get(&normalize_remote_path(path))
            .map(|o| o.data.clone())
    }

    /// 所有对象路径（有序）
    pub async fn paths(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    async fn next_page(&self, mut pending: VecDeque<RemoteEntry>) -> ListPage {
        let take = self.page_size.min(pending.len());
        let entries: Vec<RemoteEntry> = pending.drain(..take).collect();
        let cursor = if pending.is_empty() {
            None
        } else {
            let cursor = uuid::Uuid::new_v4().to_string();
            self.listings.lock().await.insert(cursor.clone(), pending);
            Some(cursor)
        };
        ListPage { entries, cursor }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_folder(&self, path: &str, recursive: bool) -> RemoteResult<ListPage> {
        let dir = normalize_remote_path(path);
        let prefix = if dir == "/" { dir.clone() } else { format!("{}/", dir) };

        let snapshot: VecDeque<RemoteEntry> = {
            let objects = self.objects.read().await;
            objects
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .filter(|(k, _)| recursive || !k[prefix.len()..].contains('/'))
                .map(|(k, o)| RemoteEntry {
                    path: k.clone(),
                    size: o.data.len() as u64,
                    modified_time: Some(o.modified_time),
                    is_dir: false,
                })
                .collect()
        };

        Ok(self.next_page(snapshot).await)
    }

    async fn list_folder_continue(&self, cursor: &str) -> RemoteResult<ListPage> {
        let pending = self.listings.lock().await.remove(cursor).ok_or_else(|| {
            RemoteError::new(ErrorClass::Permanent, "", format!("unknown cursor: {}", cursor))
        })?;
        Ok(self.next_page(pending).await)
    }

    async fn upload(&self, path: &str, data: Bytes, mode: WriteMode) -> RemoteResult<()> {
        let key = normalize_remote_path(path);
        let mut objects = self.objects.write().await;
        if mode == WriteMode::Add && objects.contains_key(&key) {
            return Err(RemoteError::new(ErrorClass::Conflict, path, "object already exists"));
        }
        objects.insert(
            key,
            Object {
                data,
                modified_time: Utc::now(),
            },
        );
        Ok(())
    }

    async fn move_object(&self, from: &str, to: &str) -> RemoteResult<()> {
        let (src, dst) = (normalize_remote_path(from), normalize_remote_path(to));
        let mut objects = self.objects.write().await;
        let object = objects
            .remove(&src)
            .ok_or_else(|| RemoteError::new(ErrorClass::NotFound, from, "source not found"))?;
        objects.insert(dst, object);
        Ok(())
    }

    async fn get_temporary_link(&self, path: &str) -> RemoteResult<String> {
        let key = normalize_remote_path(path);
        if !self.objects.read().await.contains_key(&key) {
            return Err(RemoteError::new(ErrorClass::NotFound, path, "object not found"));
        }
        Ok(format!("memory://{}", key.trim_start_matches('/')))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
