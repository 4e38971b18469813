//! 会话凭证提供者
//!
//! 凭证获取由调用方负责，存储层只在会话缺失或过期时显式调用
//! [`SessionProvider::fetch`]，不保存任何全局状态。

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// 过期前提前刷新的余量（秒）
const EXPIRY_SKEW_SECS: i64 = 60;

/// 访问令牌
#[derive(Clone)]
pub struct Session {
    pub token: String,
    /// `None` 表示永不过期
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// 会话是否已过期（含提前量）
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|t| now + Duration::seconds(EXPIRY_SKEW_SECS) >= t)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// 获取一个新的会话
    async fn fetch(&self) -> Result<Session>;
}

/// 固定令牌，适用于长期凭证
pub struct StaticSessionProvider {
    session: Session,
}

impl StaticSessionProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            session: Session::new(token, None),
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn fetch(&self) -> Result<Session> {
        Ok(self.session.clone())
    }
}
