use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// 本地文件描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFile {
    /// 绝对路径，同时作为断点记录的键
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("local root does not exist: {0}")]
    RootMissing(PathBuf),
    #[error("local root is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("failed to resolve local root {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid exclude pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// 文件扫描器配置
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// 是否跟随符号链接
    pub follow_links: bool,
    /// 排除规则（glob patterns，相对根目录）
    pub exclude_patterns: Vec<String>,
}

/// 把 glob 规则转换为正则
///
/// `**` 匹配任意层级，`*` 和 `?` 不跨越 `/`；不以 `/` 开头的规则可匹配任意深度。
fn glob_to_regex(pattern: &str) -> Result<Regex, ScanError> {
    let anchored = pattern.starts_with('/');
    let body = pattern.trim_start_matches('/');

    let mut re = String::from("(?i)^");
    if !anchored {
        re.push_str("(?:.*/)?");
    }
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                re.push_str(".*");
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');

    Regex::new(&re).map_err(|source| ScanError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// 本地文件扫描器
///
/// 深度优先遍历，只产出普通文件。每次调用 [`FileScanner::scan`] 都从头开始。
#[derive(Debug, Clone)]
pub struct FileScanner {
    root: PathBuf,
    follow_links: bool,
    excludes: Vec<Regex>,
}

impl FileScanner {
    /// 创建扫描器；根目录不存在或不是目录时返回错误（整个运行应当终止）
    pub fn new(root: impl AsRef<Path>, config: ScanConfig) -> Result<Self, ScanError> {
        let root = root.as_ref();
        if !root.exists() {
            return Err(ScanError::RootMissing(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }
        let root = root.canonicalize().map_err(|source| ScanError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let excludes = config
            .exclude_patterns
            .iter()
            .map(|p| glob_to_regex(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root,
            follow_links: config.follow_links,
            excludes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 相对根目录的路径（统一使用 `/`）
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// 检查路径是否应该被排除
    pub fn should_exclude(&self, relative: &str) -> bool {
        self.excludes.iter().any(|re| re.is_match(relative))
    }

    fn keep_entry(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let Some(rel) = self.relative_path(entry.path()) else {
            return true;
        };
        let rel = if entry.file_type().is_dir() {
            format!("{}/", rel)
        } else {
            rel
        };
        if self.should_exclude(&rel) {
            debug!("排除: {}", rel);
            return false;
        }
        true
    }

    /// 惰性扫描
    pub fn scan(&self) -> impl Iterator<Item = LocalFile> + '_ {
        WalkDir::new(&self.root)
            .follow_links(self.follow_links)
            .into_iter()
            .filter_entry(|e| self.keep_entry(e))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    // 无权限等错误只跳过该目录
                    warn!("跳过无法读取的路径 {:?}: {}", e.path(), e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("无法读取文件信息 {}: {}", entry.path().display(), e);
                        return None;
                    }
                };
                let modified_at = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                Some(LocalFile {
                    path: entry.into_path(),
                    size: metadata.len(),
                    modified_at,
                })
            })
    }

    /// 在阻塞线程中扫描，通过有界通道逐个产出文件
    pub fn stream(self) -> ReceiverStream<LocalFile> {
        let (tx, rx) = mpsc::channel(256);
        tokio::task::spawn_blocking(move || {
            info!("开始扫描本地目录: {}", self.root.display());
            let mut count = 0usize;
            for file in self.scan() {
                if tx.blocking_send(file).is_err() {
                    // 接收端已关闭（批量上限或取消）
                    debug!("扫描提前结束，已产出 {} 个文件", count);
                    return;
                }
                count += 1;
            }
            info!("本地扫描完成: {} 个文件", count);
        });
        ReceiverStream::new(rx)
    }
}
