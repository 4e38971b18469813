use super::{IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use anyhow::Result;
use opendal::{layers::TimeoutLayer, Operator};
use std::time::Duration;

/// 以本地目录作为远程存储根（用于挂载盘、NAS 以及测试）
pub fn fs_operator(root: &str) -> Result<Operator> {
    use opendal::services::Fs;

    let root = root.replace('\\', "/");
    if !std::path::Path::new(&root).exists() {
        std::fs::create_dir_all(&root)?;
    }

    let operator = Operator::new(Fs::default().root(&root))?
        .layer(
            TimeoutLayer::default()
                .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
        )
        .finish();
    Ok(operator)
}
