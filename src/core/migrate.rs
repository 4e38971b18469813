//! 远程批量重命名
//!
//! 不使用断点：远程列表本身就是“还有没有待处理对象”的依据，
//! 已移动的源对象返回 NotFound 时视为成功，因此重复运行是安全的。

use crate::config::MigrationConfig;
use crate::core::retry::{Completion, Operation, RetryController};
use crate::storage::{RemoteEntry, RemoteStore};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 单个重命名任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameJob {
    pub old_remote_path: String,
    pub new_remote_path: String,
}

impl RenameJob {
    /// 替换第一次出现的匹配子串，替换后路径不变时返回 None
    pub fn plan(path: &str, pattern: &str, replace: &str) -> Option<Self> {
        if pattern.is_empty() || !path.contains(pattern) {
            return None;
        }
        let new_path = path.replacen(pattern, replace, 1);
        if new_path == path {
            return None;
        }
        Some(Self {
            old_remote_path: path.to_string(),
            new_remote_path: new_path,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RenameOutcome {
    Renamed,
    AlreadyGone,
    Failed { error: String },
}

/// 重命名汇总
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub matched: u32,
    pub renamed: u32,
    pub already_gone: u32,
    pub failed: u32,
    pub errors: Vec<String>,
}

impl MigrationSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn record(&mut self, job: &RenameJob, outcome: RenameOutcome) {
        match outcome {
            RenameOutcome::Renamed => self.renamed += 1,
            RenameOutcome::AlreadyGone => self.already_gone += 1,
            RenameOutcome::Failed { error } => {
                self.failed += 1;
                self.errors
                    .push(format!("{} -> {}: {}", job.old_remote_path, job.new_remote_path, error));
            }
        }
    }
}

/// 通过重试控制器完整读取远程目录（包括所有分页）
pub async fn list_all(
    store: &dyn RemoteStore,
    retry: &RetryController,
    folder: &str,
    recursive: bool,
) -> Result<Vec<RemoteEntry>> {
    let first = retry
        .run(Operation::List, folder, || store.list_folder(folder, recursive))
        .await?
        .into_done()
        .unwrap_or_default();

    let mut entries = first.entries;
    let mut cursor = first.cursor;
    while let Some(c) = cursor.take() {
        let page = retry
            .run(Operation::List, folder, || store.list_folder_continue(&c))
            .await?
            .into_done()
            .unwrap_or_default();
        entries.extend(page.entries);
        cursor = page.cursor;
    }

    debug!("远程列表完成: {} ({} 项)", folder, entries.len());
    Ok(entries)
}

/// 远程重命名执行器
pub struct MigrationOperator {
    store: Arc<dyn RemoteStore>,
    retry: RetryController,
}

impl MigrationOperator {
    pub fn new(store: Arc<dyn RemoteStore>, retry: RetryController) -> Self {
        Self { store, retry }
    }

    /// 列出目录并生成重命名任务
    pub async fn plan(&self, config: &MigrationConfig) -> Result<Vec<RenameJob>> {
        config.validate()?;
        let entries = list_all(self.store.as_ref(), &self.retry, &config.folder, true)
            .await
            .with_context(|| format!("failed to list {}", config.folder))?;

        Ok(entries
            .iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| RenameJob::plan(&e.path, &config.pattern, &config.replace))
            .collect())
    }

    /// 执行一次批量重命名
    ///
    /// 只有列表失败会返回错误，单个对象的失败计入汇总。
    pub async fn run(&self, config: &MigrationConfig) -> Result<MigrationSummary> {
        let jobs = self.plan(config).await?;
        let mut summary = MigrationSummary {
            matched: jobs.len() as u32,
            ..MigrationSummary::default()
        };
        info!(
            "开始重命名: {} 中 {} 个对象匹配 \"{}\" -> \"{}\"",
            config.folder,
            jobs.len(),
            config.pattern,
            config.replace
        );

        let results: Vec<(RenameJob, RenameOutcome)> = stream::iter(jobs)
            .map(|job| async move {
                let outcome = self.move_one(&job).await;
                (job, outcome)
            })
            .buffer_unordered(config.max_concurrent.max(1))
            .collect()
            .await;

        for (job, outcome) in results {
            summary.record(&job, outcome);
        }

        info!(
            "重命名完成: 成功 {}, 已不存在 {}, 失败 {}",
            summary.renamed, summary.already_gone, summary.failed
        );
        Ok(summary)
    }

    async fn move_one(&self, job: &RenameJob) -> RenameOutcome {
        let (from, to) = (&job.old_remote_path, &job.new_remote_path);
        let result = self
            .retry
            .run(Operation::Move, from, || self.store.move_object(from, to))
            .await;

        match result {
            Ok(Completion::Done(())) => {
                debug!("已重命名: {} -> {}", from, to);
                RenameOutcome::Renamed
            }
            Ok(Completion::AlreadyGone) => RenameOutcome::AlreadyGone,
            Err(e) => {
                warn!("重命名失败 {}: {}", from, e);
                RenameOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// 获取临时下载链接
    pub async fn temporary_link(&self, path: &str) -> Result<String> {
        let link = self
            .retry
            .run(Operation::Link, path, || self.store.get_temporary_link(path))
            .await?
            .into_done()
            .with_context(|| format!("object not found: {}", path))?;
        Ok(link)
    }
}
