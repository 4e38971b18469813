//! 断点记录 - 支持中断后续传
//!
//! 记录已完成（已上传或按策略跳过）的本地绝对路径，持久化为 JSON 数组。
//! 只按路径判断，文件在同步后被修改不会触发重新上传。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to write checkpoint {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 已完成路径集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint {
    completed: HashSet<String>,
}

impl Checkpoint {
    pub fn contains(&self, key: &str) -> bool {
        self.completed.contains(key)
    }

    pub fn insert(&mut self, key: String) -> bool {
        self.completed.insert(key)
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.completed.iter()
    }

    /// 排序后的路径列表，保证输出文件稳定
    fn sorted(&self) -> Vec<&String> {
        let mut paths: Vec<_> = self.completed.iter().collect();
        paths.sort();
        paths
    }
}

/// 断点键：本地绝对路径
pub fn checkpoint_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// 断点存储
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    checkpoint: Checkpoint,
    /// 上次刷新后新增的条目数
    unflushed: usize,
}

impl CheckpointStore {
    /// 加载断点；文件不存在或损坏时返回空断点（损坏时记录警告）
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let checkpoint = match fs::read(&path).await {
            Ok(data) => match serde_json::from_slice::<Checkpoint>(&data) {
                Ok(cp) => {
                    info!("已加载断点 {}: {} 条记录", path.display(), cp.len());
                    cp
                }
                Err(e) => {
                    warn!("断点文件损坏，从空断点开始 {}: {}", path.display(), e);
                    Checkpoint::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("断点文件不存在: {}", path.display());
                Checkpoint::default()
            }
            Err(e) => {
                warn!("无法读取断点文件，从空断点开始 {}: {}", path.display(), e);
                Checkpoint::default()
            }
        };

        Self {
            path,
            checkpoint,
            unflushed: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn has(&self, path: &Path) -> bool {
        self.checkpoint.contains(&checkpoint_key(path))
    }

    /// 标记完成（仅内存），返回是否为新条目
    pub fn mark_done(&mut self, path: &Path) -> bool {
        let inserted = self.checkpoint.insert(checkpoint_key(path));
        if inserted {
            self.unflushed += 1;
        }
        inserted
    }

    pub fn unflushed(&self) -> usize {
        self.unflushed
    }

    pub fn len(&self) -> usize {
        self.checkpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoint.is_empty()
    }

    /// 原子写入：先写临时文件并落盘，再重命名覆盖
    pub async fn flush(&mut self) -> Result<(), CheckpointError> {
        let data = serde_json::to_vec_pretty(&self.checkpoint.sorted())?;
        let write_err = |source| CheckpointError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp_path).await.map_err(write_err)?;
        file.write_all(&data).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);
        fs::rename(&tmp_path, &self.path).await.map_err(write_err)?;

        debug!(
            "断点已刷新: {} 条记录 ({} 条新增)",
            self.checkpoint.len(),
            self.unflushed
        );
        self.unflushed = 0;
        Ok(())
    }

    /// 清空断点并删除文件
    pub async fn clear(&mut self) -> Result<(), CheckpointError> {
        self.checkpoint = Checkpoint::default();
        self.unflushed = 0;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("已清除断点: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
