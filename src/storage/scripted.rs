//! 测试用存储：在内存存储之上按脚本注入失败并记录调用

use super::{
    ErrorClass, ListPage, MemoryStore, RemoteError, RemoteResult, RemoteStore, WriteMode,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    List,
    Upload,
    Move,
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub path: String,
    pub at: Instant,
}

pub struct ScriptedStore {
    pub inner: MemoryStore,
    failures: Mutex<VecDeque<(Op, Option<String>, RemoteError)>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 下一次匹配 `op`（以及可选的路径子串）的调用返回指定错误
    pub fn fail(&self, op: Op, path_contains: Option<&str>, class: ErrorClass) {
        self.fail_with(op, path_contains, RemoteError::new(class, "", "scripted failure"));
    }

    pub fn fail_with(&self, op: Op, path_contains: Option<&str>, err: RemoteError) {
        self.failures
            .lock()
            .unwrap()
            .push_back((op, path_contains.map(str::to_string), err));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    pub fn calls_for(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    fn record(&self, op: Op, path: &str) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(Call {
            op,
            path: path.to_string(),
            at: Instant::now(),
        });

        let mut failures = self.failures.lock().unwrap();
        let pos = failures.iter().position(|(o, p, _)| {
            *o == op && p.as_deref().map_or(true, |needle| path.contains(needle))
        });
        match pos.and_then(|i| failures.remove(i)) {
            Some((_, _, mut err)) => {
                err.path = path.to_string();
                Err(err)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for ScriptedStore {
    async fn list_folder(&self, path: &str, recursive: bool) -> RemoteResult<ListPage> {
        self.record(Op::List, path)?;
        self.inner.list_folder(path, recursive).await
    }

    async fn list_folder_continue(&self, cursor: &str) -> RemoteResult<ListPage> {
        self.record(Op::List, cursor)?;
        self.inner.list_folder_continue(cursor).await
    }

    async fn upload(&self, path: &str, data: Bytes, mode: WriteMode) -> RemoteResult<()> {
        self.record(Op::Upload, path)?;
        self.inner.upload(path, data, mode).await
    }

    async fn move_object(&self, from: &str, to: &str) -> RemoteResult<()> {
        self.record(Op::Move, from)?;
        self.inner.move_object(from, to).await
    }

    async fn get_temporary_link(&self, path: &str) -> RemoteResult<String> {
        self.record(Op::Link, path)?;
        self.inner.get_temporary_link(path).await
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
