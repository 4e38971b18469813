use crate::config::TransferConfig;
use crate::core::checkpoint::{CheckpointError, CheckpointStore};
use crate::core::retry::{Operation, RetryController, RetryError};
use crate::core::scanner::{FileScanner, LocalFile, ScanConfig};
use crate::storage::{normalize_remote_path, RemoteStore, WriteMode};
use anyhow::{Context, Result};
use bytes::Bytes;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub local_root: PathBuf,
    pub remote_root: String,
    /// 单文件大小上限（字节）
    pub max_file_size: u64,
    /// 单次运行最多处理的待上传文件数
    pub batch_limit: Option<usize>,
    /// 每完成多少个文件刷新一次断点
    pub flush_every: usize,
    /// 最大并发上传数
    pub max_concurrent_transfers: usize,
    pub scan_config: ScanConfig,
}

impl SyncConfig {
    pub fn new(local_root: impl Into<PathBuf>, remote_root: impl Into<String>) -> Self {
        Self::from(&TransferConfig {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            ..TransferConfig::default()
        })
    }
}

impl From<&TransferConfig> for SyncConfig {
    fn from(c: &TransferConfig) -> Self {
        Self {
            local_root: c.local_root.clone(),
            remote_root: c.remote_root.clone(),
            max_file_size: c.max_file_size,
            batch_limit: c.batch_limit,
            flush_every: c.flush_every.max(1),
            max_concurrent_transfers: c.max_concurrent_transfers.max(1),
            scan_config: ScanConfig {
                follow_links: c.follow_links,
                exclude_patterns: c.exclude_patterns.clone(),
            },
        }
    }
}

/// 跳过原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SkipReason {
    TooLarge { size: u64, limit: u64 },
}

/// 单个文件的处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TransferOutcome {
    Uploaded { bytes: u64 },
    Skipped { reason: SkipReason },
    Failed { error: String },
    /// 运行被中断，文件未上传也不计为失败，下次运行继续处理
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub local_path: PathBuf,
    pub remote_path: String,
    #[serde(flatten)]
    pub outcome: TransferOutcome,
}

/// 同步报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub start_time: i64,
    pub end_time: i64,
    /// 扫描到的文件数（批量上限时可能不完整）
    pub files_scanned: u64,
    /// 断点中已存在、本次未处理的文件数
    pub already_synced: u64,
    pub uploaded: u32,
    pub skipped: u32,
    pub failed: u32,
    pub bytes_uploaded: u64,
    /// 达到批量上限，仍有待处理文件
    pub batch_exhausted: bool,
    pub cancelled: bool,
    pub outcomes: Vec<FileOutcome>,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn record(&mut self, outcome: FileOutcome) {
        match &outcome.outcome {
            TransferOutcome::Uploaded { bytes } => {
                self.uploaded += 1;
                self.bytes_uploaded += bytes;
            }
            TransferOutcome::Skipped { .. } => self.skipped += 1,
            TransferOutcome::Failed { error } => {
                self.failed += 1;
                self.errors
                    .push(format!("{}: {}", outcome.local_path.display(), error));
            }
            TransferOutcome::Cancelled => self.cancelled = true,
        }
        self.outcomes.push(outcome);
    }
}

/// 远程路径：远程根目录 + 相对路径
pub fn remote_path_for(remote_root: &str, relative: &str) -> String {
    normalize_remote_path(&format!("{}/{}", remote_root, relative))
}

type SharedCheckpoint = Arc<Mutex<CheckpointStore>>;

/// 同步引擎（增量、可续传的上传）
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    retry: RetryController,
    config: SyncConfig,
    checkpoint: SharedCheckpoint,
    cancelled: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        retry: RetryController,
        config: SyncConfig,
        checkpoint: CheckpointStore,
    ) -> Self {
        Self {
            store,
            retry,
            config,
            checkpoint: Arc::new(Mutex::new(checkpoint)),
            cancelled: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancelled = token;
        self
    }

    /// 取消同步（当前文件完成后停止）
    pub fn cancel(&self) {
        self.cancelled.cancel();
    }

    pub fn checkpoint(&self) -> &SharedCheckpoint {
        &self.checkpoint
    }

    /// 运行一次同步
    ///
    /// 只有本地根目录无效和断点写入失败会返回错误，单个文件的失败记录在报告中。
    pub async fn run_sync(&self) -> Result<SyncReport> {
        let mut report = SyncReport {
            start_time: chrono::Utc::now().timestamp(),
            ..SyncReport::default()
        };

        let scanner = FileScanner::new(&self.config.local_root, self.config.scan_config.clone())
            .context("cannot scan local root")?;
        info!(
            "开始同步: {} -> {}{}",
            scanner.root().display(),
            self.store.name(),
            self.config.remote_root
        );

        let mut files = scanner.clone().stream();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_transfers));
        let mut tasks: JoinSet<Result<FileOutcome, CheckpointError>> = JoinSet::new();
        let mut queued = 0usize;

        while let Some(file) = files.next().await {
            report.files_scanned += 1;

            if self.cancelled.is_cancelled() {
                report.cancelled = true;
                break;
            }

            if self.checkpoint.lock().await.has(&file.path) {
                report.already_synced += 1;
                continue;
            }

            if let Some(limit) = self.config.batch_limit {
                if queued >= limit {
                    report.batch_exhausted = true;
                    info!("已达到批量上限 {}，剩余文件留待下次运行", limit);
                    break;
                }
            }
            queued += 1;

            let Some(relative) = scanner.relative_path(&file.path) else {
                warn!("文件不在根目录下，跳过: {}", file.path.display());
                continue;
            };
            let remote_path = remote_path_for(&self.config.remote_root, &relative);

            if file.size > self.config.max_file_size {
                debug!(
                    "跳过大文件: {} ({} > {})",
                    file.path.display(),
                    file.size,
                    self.config.max_file_size
                );
                let outcome = FileOutcome {
                    local_path: file.path.clone(),
                    remote_path,
                    outcome: TransferOutcome::Skipped {
                        reason: SkipReason::TooLarge {
                            size: file.size,
                            limit: self.config.max_file_size,
                        },
                    },
                };
                if let Err(e) = mark_done(&self.checkpoint, &file, self.config.flush_every).await {
                    return self.abort(tasks, e).await;
                }
                report.record(outcome);
                continue;
            }

            let permit = semaphore.clone().acquire_owned().await?;

            // 收集已完成的任务，及时发现断点写入失败
            while let Some(joined) = tasks.try_join_next() {
                match joined? {
                    Ok(outcome) => report.record(outcome),
                    Err(e) => return self.abort(tasks, e).await,
                }
            }

            let store = self.store.clone();
            let retry = self.retry.clone();
            let checkpoint = self.checkpoint.clone();
            let flush_every = self.config.flush_every;
            tasks.spawn(async move {
                let outcome = upload_file(store.as_ref(), &retry, &file, remote_path).await;
                if matches!(outcome.outcome, TransferOutcome::Uploaded { .. }) {
                    mark_done(&checkpoint, &file, flush_every).await?;
                }
                drop(permit);
                Ok(outcome)
            });
        }
        drop(files);

        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(outcome) => report.record(outcome),
                Err(e) => return self.abort(tasks, e).await,
            }
        }

        {
            let mut checkpoint = self.checkpoint.lock().await;
            if checkpoint.unflushed() > 0 {
                checkpoint.flush().await.context("checkpoint flush failed")?;
            }
        }

        if self.cancelled.is_cancelled() {
            report.cancelled = true;
        }
        report.end_time = chrono::Utc::now().timestamp();

        info!(
            "同步完成: 上传 {}, 跳过 {}, 失败 {}, 已同步 {} ({} 字节)",
            report.uploaded,
            report.skipped,
            report.failed,
            report.already_synced,
            report.bytes_uploaded
        );
        Ok(report)
    }

    /// 断点无法写入时终止运行
    async fn abort(
        &self,
        mut tasks: JoinSet<Result<FileOutcome, CheckpointError>>,
        err: CheckpointError,
    ) -> Result<SyncReport> {
        error!("断点写入失败，终止同步: {}", err);
        self.cancelled.cancel();
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        Err(anyhow::Error::new(err).context("checkpoint flush failed"))
    }
}

/// 记录完成并按需刷新断点
async fn mark_done(
    checkpoint: &SharedCheckpoint,
    file: &LocalFile,
    flush_every: usize,
) -> Result<(), CheckpointError> {
    let mut checkpoint = checkpoint.lock().await;
    checkpoint.mark_done(&file.path);
    if checkpoint.unflushed() >= flush_every {
        checkpoint.flush().await?;
    }
    Ok(())
}

/// 读取并上传单个文件
async fn upload_file(
    store: &dyn RemoteStore,
    retry: &RetryController,
    file: &LocalFile,
    remote_path: String,
) -> FileOutcome {
    let failed = |error: String| TransferOutcome::Failed { error };

    let outcome = match tokio::fs::read(&file.path).await {
        Err(e) => {
            warn!("读取本地文件失败 {}: {}", file.path.display(), e);
            failed(format!("read failed: {}", e))
        }
        Ok(data) => {
            let data = Bytes::from(data);
            let bytes = data.len() as u64;
            debug!("上传: {} -> {} ({} 字节)", file.path.display(), remote_path, bytes);

            let result = retry
                .run(Operation::Upload, &remote_path, || {
                    store.upload(&remote_path, data.clone(), WriteMode::Overwrite)
                })
                .await;

            match result {
                Ok(_) => TransferOutcome::Uploaded { bytes },
                Err(RetryError::Cancelled(_)) => {
                    debug!("上传已取消: {}", file.path.display());
                    TransferOutcome::Cancelled
                }
                Err(e) => failed(e.to_string()),
            }
        }
    };

    FileOutcome {
        local_path: file.path.clone(),
        remote_path,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::retry::{BackoffConfig, BackoffPolicy};
    use std::time::Duration;
    use tokio::time::Instant;
    use crate::storage::scripted::{Op, ScriptedStore};
    use crate::storage::{ErrorClass, MemoryStore};
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::Path;

    fn retry() -> RetryController {
        RetryController::new(BackoffConfig::uniform(BackoffPolicy::new(0, 2.0, 0, 3)))
    }

    fn make_tree(root: &Path, count: usize) {
        for i in 0..count {
            let dir = root.join(format!("group{}", i % 5));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("file{:03}.png", i)), format!("content {}", i)).unwrap();
        }
    }

    fn config(root: &Path) -> SyncConfig {
        let mut c = SyncConfig::new(root, "/remote/assets");
        c.flush_every = 10;
        c
    }

    async fn engine(
        store: Arc<ScriptedStore>,
        config: SyncConfig,
        checkpoint_path: &Path,
    ) -> SyncEngine {
        let checkpoint = CheckpointStore::load(checkpoint_path).await;
        SyncEngine::new(store, retry(), config, checkpoint)
    }

    #[test]
    fn test_remote_path_for() {
        assert_eq!(remote_path_for("/remote", "a/b.png"), "/remote/a/b.png");
        assert_eq!(remote_path_for("remote/", "a/b.png"), "/remote/a/b.png");
        assert_eq!(remote_path_for("/", "b.png"), "/b.png");
    }

    #[tokio::test]
    async fn test_batches_resume_across_runs() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let cp_path = state.path().join("cp.json");
        make_tree(local.path(), 250);

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        let mut cfg = config(local.path());
        cfg.batch_limit = Some(200);

        let report = engine(store.clone(), cfg.clone(), &cp_path).await.run_sync().await.unwrap();
        assert_eq!(report.uploaded, 200);
        assert!(report.batch_exhausted);
        assert_eq!(CheckpointStore::load(&cp_path).await.len(), 200);

        let report = engine(store.clone(), cfg, &cp_path).await.run_sync().await.unwrap();
        assert_eq!(report.uploaded, 50);
        assert_eq!(report.already_synced, 200);
        assert!(!report.batch_exhausted);
        assert_eq!(CheckpointStore::load(&cp_path).await.len(), 250);
        assert_eq!(store.inner.len().await, 250);
    }

    #[tokio::test]
    async fn test_second_run_uploads_nothing() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let cp_path = state.path().join("cp.json");
        make_tree(local.path(), 12);

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        let first = engine(store.clone(), config(local.path()), &cp_path).await.run_sync().await.unwrap();
        assert_eq!(first.uploaded, 12);
        assert!(!first.has_failures());

        let uploads_before = store.count(Op::Upload);
        let second = engine(store.clone(), config(local.path()), &cp_path).await.run_sync().await.unwrap();
        assert_eq!(second.uploaded, 0);
        assert_eq!(second.already_synced, 12);
        assert_eq!(store.count(Op::Upload), uploads_before);
    }

    #[tokio::test]
    async fn test_resume_only_attempts_missing_paths() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let cp_path = state.path().join("cp.json");
        make_tree(local.path(), 10);

        let scanner = FileScanner::new(local.path(), ScanConfig::default()).unwrap();
        let all: Vec<LocalFile> = scanner.scan().collect();
        let subset: BTreeSet<PathBuf> = all.iter().take(4).map(|f| f.path.clone()).collect();

        let mut seed = CheckpointStore::load(&cp_path).await;
        for p in &subset {
            seed.mark_done(p);
        }
        seed.flush().await.unwrap();

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        let eng = engine(store.clone(), config(local.path()), &cp_path).await;
        let report = eng.run_sync().await.unwrap();
        assert_eq!(report.uploaded, 6);

        for p in &subset {
            let rel = scanner.relative_path(p).unwrap();
            assert_eq!(store.calls_for(&remote_path_for("/remote/assets", &rel)), 0);
        }
        let checkpoint = eng.checkpoint().lock().await;
        assert!(subset.iter().all(|p| checkpoint.has(p)));
        assert_eq!(checkpoint.len(), 10);
    }

    #[tokio::test]
    async fn test_oversized_file_skipped_without_network_call() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let cp_path = state.path().join("cp.json");

        let big = local.path().join("a_big.mov");
        fs::File::create(&big)
            .unwrap()
            .set_len(200 * 1024 * 1024)
            .unwrap();
        fs::write(local.path().join("b_small.png"), b"small").unwrap();
        fs::write(local.path().join("c_small.png"), b"small").unwrap();

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        let mut cfg = config(local.path());
        cfg.max_file_size = 150 * 1024 * 1024;
        cfg.flush_every = 1;
        let eng = engine(store.clone(), cfg, &cp_path).await;
        let report = eng.run_sync().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.uploaded, 2);
        assert_eq!(store.calls_for("/remote/assets/a_big.mov"), 0);
        let skipped = report
            .outcomes
            .iter()
            .find(|o| o.remote_path == "/remote/assets/a_big.mov")
            .unwrap();
        assert!(matches!(
            skipped.outcome,
            TransferOutcome::Skipped {
                reason: SkipReason::TooLarge { .. }
            }
        ));

        let big = big.canonicalize().unwrap();
        assert!(eng.checkpoint().lock().await.has(&big));
        assert!(CheckpointStore::load(&cp_path).await.has(&big));
    }

    #[tokio::test]
    async fn test_failed_file_not_checkpointed_and_batch_continues() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let cp_path = state.path().join("cp.json");
        make_tree(local.path(), 6);

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        store.fail(Op::Upload, Some("file003"), ErrorClass::Permanent);

        let report = engine(store.clone(), config(local.path()), &cp_path)
            .await
            .run_sync()
            .await
            .unwrap();
        assert_eq!(report.uploaded, 5);
        assert_eq!(report.failed, 1);
        assert!(report.has_failures());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(CheckpointStore::load(&cp_path).await.len(), 5);

        // 重新运行只重试失败的文件
        let report = engine(store.clone(), config(local.path()), &cp_path)
            .await
            .run_sync()
            .await
            .unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.failed, 0);
        assert!(report.outcomes[0].remote_path.ends_with("file003.png"));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        make_tree(local.path(), 3);

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        store.fail(Op::Upload, Some("file001"), ErrorClass::RateLimited);
        store.fail(Op::Upload, Some("file001"), ErrorClass::Transient);

        let report = engine(store.clone(), config(local.path()), &state.path().join("cp.json"))
            .await
            .run_sync()
            .await
            .unwrap();
        assert_eq!(report.uploaded, 3);
        assert_eq!(store.count(Op::Upload), 5);
    }

    #[tokio::test]
    async fn test_missing_root_aborts() {
        let state = tempfile::tempdir().unwrap();
        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        let eng = engine(
            store.clone(),
            config(&state.path().join("missing")),
            &state.path().join("cp.json"),
        )
        .await;
        assert!(eng.run_sync().await.is_err());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_write_failure_aborts() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        make_tree(local.path(), 3);
        let blocker = state.path().join("blocker");
        fs::write(&blocker, b"").unwrap();

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        let mut cfg = config(local.path());
        cfg.flush_every = 1;
        let eng = engine(store, cfg, &blocker.join("cp.json")).await;
        let err = eng.run_sync().await.unwrap_err();
        assert!(format!("{:#}", err).contains("checkpoint"));
    }

    #[tokio::test]
    async fn test_concurrent_workers_upload_everything() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let cp_path = state.path().join("cp.json");
        make_tree(local.path(), 40);

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        let mut cfg = config(local.path());
        cfg.max_concurrent_transfers = 4;
        cfg.flush_every = 3;
        let report = engine(store.clone(), cfg, &cp_path).await.run_sync().await.unwrap();

        assert_eq!(report.uploaded, 40);
        assert_eq!(store.inner.len().await, 40);
        assert_eq!(CheckpointStore::load(&cp_path).await.len(), 40);
    }

    #[tokio::test]
    async fn test_cancelled_run_uploads_nothing() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        make_tree(local.path(), 5);

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        let eng = engine(store.clone(), config(local.path()), &state.path().join("cp.json")).await;
        eng.cancel();
        let report = eng.run_sync().await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.uploaded, 0);
        assert_eq!(store.count(Op::Upload), 0);
    }

    #[tokio::test]
    async fn test_remote_layout_mirrors_local_tree() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        fs::create_dir_all(local.path().join("images/cards")).unwrap();
        fs::write(local.path().join("images/cards/ace.png"), b"ace").unwrap();

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        engine(store.clone(), config(local.path()), &state.path().join("cp.json"))
            .await
            .run_sync()
            .await
            .unwrap();
        assert_eq!(
            store.inner.get("/remote/assets/images/cards/ace.png").await.unwrap(),
            Bytes::from_static(b"ace")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_pauses_all_workers() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        make_tree(local.path(), 8);

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        store.fail(Op::Upload, None, ErrorClass::RateLimited);

        let mut cfg = config(local.path());
        cfg.max_concurrent_transfers = 4;
        let retry = RetryController::new(BackoffConfig::uniform(BackoffPolicy::new(5_000, 2.0, 30_000, 3)));
        let checkpoint = CheckpointStore::load(&state.path().join("cp.json")).await;
        let eng = SyncEngine::new(store.clone(), retry, cfg, checkpoint);

        let start = Instant::now();
        let report = eng.run_sync().await.unwrap();
        assert_eq!(report.uploaded, 8);
        assert_eq!(report.failed, 0);

        let uploads: Vec<_> = store.calls().into_iter().filter(|c| c.op == Op::Upload).collect();
        assert_eq!(uploads.len(), 9);
        assert!(uploads[0].at < start + Duration::from_secs(1));
        // 限流之后其余所有上传（包括其他并发任务）都要等到退避结束
        for call in &uploads[1..] {
            assert!(
                call.at >= start + Duration::from_secs(5),
                "{} uploaded {:?} after start",
                call.path,
                call.at - start
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_upload_is_not_a_failure() {
        let local = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let cp_path = state.path().join("cp.json");
        fs::write(local.path().join("hero.png"), b"hero").unwrap();

        let store = Arc::new(ScriptedStore::new(MemoryStore::new()));
        store.fail(Op::Upload, None, ErrorClass::Transient);

        let token = CancellationToken::new();
        let retry = RetryController::new(BackoffConfig::uniform(BackoffPolicy::new(60_000, 2.0, 60_000, 3)))
            .with_cancel(token.clone());
        let checkpoint = CheckpointStore::load(&cp_path).await;
        let eng = SyncEngine::new(store.clone(), retry, config(local.path()), checkpoint)
            .with_cancel(token.clone());

        let (report, _) = tokio::join!(eng.run_sync(), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });
        let report = report.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.failed, 0);
        assert_eq!(report.uploaded, 0);
        assert!(!report.has_failures());
        assert!(report.errors.is_empty());
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.outcome == TransferOutcome::Cancelled));
        assert!(CheckpointStore::load(&cp_path).await.is_empty());
    }
}
