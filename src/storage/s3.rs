use super::{Session, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::config::StorageConfig;
use anyhow::Result;
use opendal::{layers::TimeoutLayer, Operator};
use std::time::Duration;

/// S3 连接参数
#[derive(Clone)]
pub struct S3Params {
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub endpoint: Option<String>,
    pub prefix: Option<String>,
}

impl S3Params {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let field = |v: &Option<String>, name: &str| {
            v.clone()
                .ok_or_else(|| anyhow::anyhow!("S3 storage requires {}", name))
        };
        Ok(Self {
            bucket: field(&config.bucket, "bucket")?,
            region: field(&config.region, "region")?,
            access_key: field(&config.access_key, "accessKey")?,
            secret_key: field(&config.secret_key, "secretKey")?,
            endpoint: config.endpoint.clone(),
            prefix: config.prefix.clone(),
        })
    }

    pub fn display_name(&self) -> String {
        format!(
            "s3://{}{}",
            self.bucket,
            self.prefix
                .as_deref()
                .map(|p| format!("/{}", p.trim_start_matches('/')))
                .unwrap_or_default()
        )
    }

    /// 构建 operator；有会话时附带临时会话令牌
    pub fn operator(&self, session: Option<&Session>) -> Result<Operator> {
        use opendal::services::S3;

        let mut builder = S3::default()
            .bucket(&self.bucket)
            .region(&self.region)
            .access_key_id(&self.access_key)
            .secret_access_key(&self.secret_key);

        if let Some(ref ep) = self.endpoint {
            builder = builder.endpoint(ep);
        }

        if let Some(ref p) = self.prefix {
            builder = builder.root(p);
        }

        if let Some(s) = session {
            builder = builder.session_token(&s.token);
        }

        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();
        Ok(operator)
    }
}

impl std::fmt::Debug for S3Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Params")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("secret_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}
