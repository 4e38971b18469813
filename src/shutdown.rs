//! 退出信号处理
//!
//! 第一次 Ctrl+C / SIGTERM 取消令牌，当前文件处理完后停止；第二次直接退出。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 信号处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    Cancel,
    ForceExit,
}

fn on_signal(count: &AtomicU32, token: &CancellationToken) -> SignalAction {
    if count.fetch_add(1, Ordering::SeqCst) == 0 {
        tracing::info!("收到退出信号，等待当前文件完成...");
        tracing::info!("再次按 Ctrl+C 强制退出");
        token.cancel();
        SignalAction::Cancel
    } else {
        SignalAction::ForceExit
    }
}

/// 安装信号处理器，返回收到第一个信号时被取消的令牌
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("无法注册 SIGTERM 处理: {}", e);
                    None
                }
            }
        };

        loop {
            #[cfg(unix)]
            {
                let term = async {
                    match sigterm.as_mut() {
                        Some(s) => {
                            s.recv().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            tracing::warn!("无法监听 Ctrl+C: {}", e);
                            return;
                        }
                    }
                    _ = term => {}
                }
            }

            #[cfg(not(unix))]
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("无法监听 Ctrl+C: {}", e);
                return;
            }

            if on_signal(&count, &handler_token) == SignalAction::ForceExit {
                tracing::warn!("强制退出");
                std::process::exit(130);
            }
        }
    });

    token
}
