use anyhow::Result;
use assetsync_lib::config::AppConfig;
use assetsync_lib::core::classifier::write_json;
use assetsync_lib::core::{
    list_all, AssetRecord, CheckpointStore, ClassificationReport, FileScanner, MigrationOperator,
    RetryController, SyncConfig, SyncEngine,
};
use assetsync_lib::logging::{get_log_dir, SizeRotatingWriter};
use assetsync_lib::shutdown::install_signal_handler;
use assetsync_lib::storage::{create_store, SessionProvider, StaticSessionProvider};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 资源同步与远程迁移工具
#[derive(Parser, Debug)]
#[command(name = "assetsync", version, about = "Resumable bulk asset sync and remote migration")]
struct Cli {
    /// 配置文件路径（默认为配置目录下的 config.json）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 上传本地目录中尚未同步的文件
    Sync,
    /// 按 migration 配置批量重命名远程对象
    Rename,
    /// 对本地目录生成分类报告
    Report,
    /// 对远程目录生成分类报告
    ReportRemote,
    /// 获取远程对象的临时下载链接
    Link { path: String },
    /// 清除断点记录
    ClearCheckpoint,
}

/// 初始化日志系统，返回的 guard 必须保持到进程结束
fn init_logging(config: &AppConfig, config_dir: &Path) -> Option<WorkerGuard> {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.log.tracing_level().into());
    for directive in ["opendal=warn", "hyper=warn", "reqwest=warn"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    let log_dir = get_log_dir(&config.log, config_dir);
    let mut file_error = None;
    let (file_writer, guard) = if config.log.enabled {
        match SizeRotatingWriter::new(&log_dir, config.log.max_size_mb) {
            Ok(writer) => {
                let (writer, guard) = tracing_appender::non_blocking(writer);
                (Some(writer), Some(guard))
            }
            Err(e) => {
                // 文件日志创建失败，回退到控制台
                file_error = Some(e);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
    });

    // 控制台输出到 stderr，stdout 留给报告
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    if let Some(e) = file_error {
        tracing::warn!("无法创建日志文件 {}: {}", log_dir.display(), e);
    }
    guard
}

fn session_provider() -> Option<Arc<dyn SessionProvider>> {
    std::env::var("ASSETSYNC_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
        .map(|t| Arc::new(StaticSessionProvider::new(t)) as Arc<dyn SessionProvider>)
}

/// 写入报告文件，未配置输出路径时打印到标准输出
fn emit_report<T: Serialize>(report: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            write_json(report, path)?;
            tracing::info!("报告已写入: {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

/// 执行命令，返回是否仍有失败项
async fn run(command: Command, config: AppConfig, config_dir: &Path) -> Result<bool> {
    let cancel = install_signal_handler();
    let retry = RetryController::new(config.backoff.clone()).with_cancel(cancel.clone());
    let checkpoint_path = config.checkpoint_path(config_dir);

    config.validate()?;
    match command {
        Command::ClearCheckpoint => {
            let mut store = CheckpointStore::load(&checkpoint_path).await;
            store.clear().await?;
            println!("checkpoint cleared: {}", checkpoint_path.display());
            Ok(false)
        }
        Command::Sync => {
            config.validate_sync()?;
            let store = create_store(&config.remote, session_provider())?;
            let checkpoint = CheckpointStore::load(&checkpoint_path).await;
            let engine = SyncEngine::new(store, retry, SyncConfig::from(&config.transfer), checkpoint)
                .with_cancel(cancel);
            let report = engine.run_sync().await?;

            println!(
                "uploaded {}, skipped {}, failed {}, already synced {}",
                report.uploaded, report.skipped, report.failed, report.already_synced
            );
            for error in &report.errors {
                eprintln!("  {}", error);
            }
            if let Some(output) = config.report.output.as_deref() {
                emit_report(&report, Some(output))?;
            }
            Ok(report.has_failures())
        }
        Command::Rename => {
            config.validate_migration()?;
            let store = create_store(&config.remote, session_provider())?;
            let summary = MigrationOperator::new(store, retry).run(&config.migration).await?;

            println!(
                "matched {}, renamed {}, already gone {}, failed {}",
                summary.matched, summary.renamed, summary.already_gone, summary.failed
            );
            for error in &summary.errors {
                eprintln!("  {}", error);
            }
            Ok(summary.has_failures())
        }
        Command::Report => {
            config.validate_sync()?;
            let scanner = FileScanner::new(&config.transfer.local_root, SyncConfig::from(&config.transfer).scan_config)?;
            let records: Vec<AssetRecord> = scanner
                .scan()
                .filter_map(|f| {
                    let rel = scanner.relative_path(&f.path)?;
                    Some(AssetRecord::from_local(&f, &rel))
                })
                .collect();
            let report = ClassificationReport::from_records(scanner.root().display().to_string(), &records);
            emit_report(&report, config.report.output.as_deref())?;
            Ok(false)
        }
        Command::ReportRemote => {
            let store = create_store(&config.remote, session_provider())?;
            let entries = list_all(store.as_ref(), &retry, &config.transfer.remote_root, true).await?;
            let records: Vec<AssetRecord> = entries
                .iter()
                .filter(|e| !e.is_dir)
                .map(|e| AssetRecord::from_remote(e, &config.transfer.remote_root))
                .collect();
            let source = format!("{}{}", store.name(), config.transfer.remote_root);
            let report = ClassificationReport::from_records(source, &records);
            emit_report(&report, config.report.output.as_deref())?;
            Ok(false)
        }
        Command::Link { path } => {
            let store = create_store(&config.remote, session_provider())?;
            let link = MigrationOperator::new(store, retry).temporary_link(&path).await?;
            println!("{}", link);
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_dir = assetsync_lib::default_config_dir();
    let config_file = cli.config.unwrap_or_else(|| config_dir.join("config.json"));
    let config = match AppConfig::load(&config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::from(2);
        }
    };

    let _guard = init_logging(&config, &config_dir);
    tracing::debug!("配置文件: {}", config_file.display());

    match run(cli.command, config, &config_dir).await {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
