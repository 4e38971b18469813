//! 重试与退避控制
//!
//! 每次远程调用都经过 [`RetryController::run`]：
//!
//! - `RateLimited` / `Transient`：未达到 `max_attempts` 时等待 `delay` 后重试，
//!   随后 `delay = min(delay * multiplier, max_delay)`
//! - `NotFound` 出现在 `Move` 中：视为已完成（[`Completion::AlreadyGone`]）
//! - `Conflict` 出现在覆盖上传中：按瞬时错误重试一次
//! - 其余错误直接放弃
//!
//! 所有并发任务共享一个 [`Pacer`]，限流退避和操作间的基础间隔都是全局的。

use crate::storage::{ErrorClass, RemoteError, RemoteResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// 远程操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Upload,
    Move,
    Link,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::List => write!(f, "list"),
            Operation::Upload => write!(f, "upload"),
            Operation::Move => write!(f, "move"),
            Operation::Link => write!(f, "link"),
        }
    }
}

/// 单类操作的退避参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// 总尝试次数（含第一次）
    pub max_attempts: u32,
    /// 相邻两次操作之间的最小间隔（成功时也生效）
    #[serde(default)]
    pub min_interval_ms: u64,
}

impl BackoffPolicy {
    pub fn new(initial_delay_ms: u64, multiplier: f64, max_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            initial_delay_ms,
            multiplier,
            max_delay_ms,
            max_attempts,
            min_interval_ms: 0,
        }
    }

    pub fn with_min_interval(mut self, ms: u64) -> Self {
        self.min_interval_ms = ms;
        self
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms))
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// 下一次退避时长：`min(current * multiplier, max_delay)`
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier).round();
        let next_ms = if next_ms.is_finite() && next_ms < u64::MAX as f64 {
            next_ms as u64
        } else {
            u64::MAX
        };
        Duration::from_millis(next_ms.min(self.max_delay_ms))
    }

    /// 连续重试时依次使用的退避时长（共 `max_attempts - 1` 个）
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut delay = self.initial_delay();
        for _ in 1..self.max_attempts {
            delays.push(delay);
            delay = self.next_delay(delay);
        }
        delays
    }

    pub fn validate(&self, name: &str) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("backoff.{}.maxAttempts must be at least 1", name);
        }
        if !(self.multiplier >= 1.0) {
            anyhow::bail!("backoff.{}.multiplier must be >= 1.0", name);
        }
        Ok(())
    }
}

/// 各类操作的退避参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    #[serde(default = "default_list_policy")]
    pub list: BackoffPolicy,
    #[serde(default = "default_upload_policy")]
    pub upload: BackoffPolicy,
    #[serde(default = "default_move_policy", rename = "move")]
    pub move_: BackoffPolicy,
    #[serde(default = "default_link_policy")]
    pub link: BackoffPolicy,
}

fn default_list_policy() -> BackoffPolicy {
    BackoffPolicy::new(2_000, 2.0, 30_000, 3)
}

fn default_upload_policy() -> BackoffPolicy {
    BackoffPolicy::new(5_000, 1.5, 30_000, 3).with_min_interval(250)
}

fn default_move_policy() -> BackoffPolicy {
    BackoffPolicy::new(10_000, 2.0, 120_000, 3).with_min_interval(500)
}

fn default_link_policy() -> BackoffPolicy {
    BackoffPolicy::new(2_000, 2.0, 30_000, 3)
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            list: default_list_policy(),
            upload: default_upload_policy(),
            move_: default_move_policy(),
            link: default_link_policy(),
        }
    }
}

impl BackoffConfig {
    /// 所有操作使用同一组参数
    pub fn uniform(policy: BackoffPolicy) -> Self {
        Self {
            list: policy.clone(),
            upload: policy.clone(),
            move_: policy.clone(),
            link: policy,
        }
    }

    pub fn policy(&self, op: Operation) -> &BackoffPolicy {
        match op {
            Operation::List => &self.list,
            Operation::Upload => &self.upload,
            Operation::Move => &self.move_,
            Operation::Link => &self.link,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.list.validate("list")?;
        self.upload.validate("upload")?;
        self.move_.validate("move")?;
        self.link.validate("link")
    }
}

/// 单次逻辑操作的重试状态，不跨操作保留
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// 当前是第几次尝试（从 1 开始）
    pub attempt: u32,
    /// 若本次失败，重试前需要等待的时长
    pub delay: Duration,
}

/// 成功结束的方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    Done(T),
    /// `Move` 的源对象已不存在，按幂等完成处理
    AlreadyGone,
}

impl<T> Completion<T> {
    pub fn into_done(self) -> Option<T> {
        match self {
            Completion::Done(v) => Some(v),
            Completion::AlreadyGone => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum RetryError {
    #[error("{operation} gave up after {attempts} attempt(s): {last}")]
    GaveUp {
        operation: Operation,
        attempts: u32,
        last: RemoteError,
    },
    #[error("{0} cancelled")]
    Cancelled(Operation),
}

/// 全局节流器：限制操作起始间隔，并在被限流时让所有任务一起退避
#[derive(Debug, Default)]
pub struct Pacer {
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预约下一个可用时间点，返回应当开始执行的时刻
    pub async fn reserve(&self, min_interval: Duration) -> Instant {
        let mut next = self.next_slot.lock().await;
        let now = Instant::now();
        let start = next.map_or(now, |slot| slot.max(now));
        *next = Some(start + min_interval);
        start
    }

    /// 推迟所有后续操作，至少等待 `delay`
    pub async fn hold_off(&self, delay: Duration) {
        let mut next = self.next_slot.lock().await;
        let until = Instant::now() + delay;
        *next = Some(next.map_or(until, |slot| slot.max(until)));
    }
}

/// 重试控制器，可在多个任务间克隆共享
#[derive(Clone)]
pub struct RetryController {
    backoff: Arc<BackoffConfig>,
    pacer: Arc<Pacer>,
    cancel: CancellationToken,
}

impl RetryController {
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            backoff: Arc::new(backoff),
            pacer: Arc::new(Pacer::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    pub fn pacer(&self) -> &Arc<Pacer> {
        &self.pacer
    }

    async fn sleep_until(&self, op: Operation, deadline: Instant) -> Result<(), RetryError> {
        if deadline <= Instant::now() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => Ok(()),
            _ = self.cancel.cancelled() => Err(RetryError::Cancelled(op)),
        }
    }

    /// 执行一次逻辑操作，按错误分类决定重试、完成或放弃
    pub async fn run<T, F, Fut>(
        &self,
        op: Operation,
        target: &str,
        mut call: F,
    ) -> Result<Completion<T>, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let policy = self.backoff.policy(op);
        let max_attempts = policy.max_attempts.max(1);
        let mut state = RetryState {
            attempt: 1,
            delay: policy.initial_delay(),
        };
        let mut conflict_retried = false;

        loop {
            let start = self.pacer.reserve(policy.min_interval()).await;
            self.sleep_until(op, start).await?;

            let err = match call().await {
                Ok(v) => return Ok(Completion::Done(v)),
                Err(e) => e,
            };

            let retryable = match err.class {
                ErrorClass::NotFound if op == Operation::Move => {
                    debug!("{} {}: 源对象已不存在，视为完成", op, target);
                    return Ok(Completion::AlreadyGone);
                }
                ErrorClass::RateLimited | ErrorClass::Transient => true,
                ErrorClass::Conflict if op == Operation::Upload && !conflict_retried => {
                    conflict_retried = true;
                    true
                }
                _ => false,
            };

            if !retryable || state.attempt >= max_attempts {
                error!(
                    "{} {} 最终失败 (第 {}/{} 次尝试): {}",
                    op, target, state.attempt, max_attempts, err
                );
                return Err(RetryError::GaveUp {
                    operation: op,
                    attempts: state.attempt,
                    last: err,
                });
            }

            let wait = err
                .retry_after
                .map_or(state.delay, |hint| hint.max(state.delay))
                .min(policy.max_delay());
            warn!(
                "{} {} 失败 ({})，{}ms 后重试 ({}/{})",
                op,
                target,
                err.class,
                wait.as_millis(),
                state.attempt,
                max_attempts
            );

            if err.class == ErrorClass::RateLimited {
                // 限流时所有任务一起等待
                self.pacer.hold_off(wait).await;
            } else {
                self.sleep_until(op, Instant::now() + wait).await?;
            }

            state = RetryState {
                attempt: state.attempt + 1,
                delay: policy.next_delay(state.delay),
            };
        }
    }
}
