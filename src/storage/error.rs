use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// 远程错误分类，在协议边界处确定一次，下游只读取不再推断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    RateLimited,
    Conflict,
    NotFound,
    Transient,
    Permanent,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::RateLimited => write!(f, "rate_limited"),
            ErrorClass::Conflict => write!(f, "conflict"),
            ErrorClass::NotFound => write!(f, "not_found"),
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

/// 远程存储操作返回的结构化错误
#[derive(Debug, Clone, Error)]
#[error("{class} error on {path}: {message}")]
pub struct RemoteError {
    pub class: ErrorClass,
    pub path: String,
    pub message: String,
    /// 服务端给出的 Retry-After 提示
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    pub fn new(class: ErrorClass, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class,
            path: path.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// 根据 HTTP 状态码构造错误（供基于 HTTP 的客户端在协议边界使用）
    ///
    /// `retry_after` 为响应头中的 Retry-After 秒数（若有）。
    pub fn from_status(
        status: u16,
        path: impl Into<String>,
        message: impl Into<String>,
        retry_after: Option<u64>,
    ) -> Self {
        let class = match status {
            429 => ErrorClass::RateLimited,
            409 => ErrorClass::Conflict,
            404 | 410 => ErrorClass::NotFound,
            408 | 500..=599 => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        };
        let mut err = Self::new(class, path, format!("HTTP {}: {}", status, message.into()));
        err.retry_after = retry_after.map(Duration::from_secs);
        err
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.class, ErrorClass::RateLimited | ErrorClass::Transient)
    }

    /// 将 opendal 错误归类为 [`ErrorClass`]
    pub fn from_opendal(e: opendal::Error, path: &str) -> Self {
        use opendal::ErrorKind;

        let class = match e.kind() {
            ErrorKind::RateLimited => ErrorClass::RateLimited,
            ErrorKind::NotFound => ErrorClass::NotFound,
            ErrorKind::AlreadyExists | ErrorKind::ConditionNotMatch => ErrorClass::Conflict,
            _ if e.is_temporary() => ErrorClass::Transient,
            ErrorKind::Unexpected => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        };
        Self::new(class, path, e.to_string())
    }
}
