use super::Session;
use crate::config::StorageConfig;
use anyhow::Result;
use opendal::Operator;

/// WebDAV 连接参数
#[derive(Clone)]
pub struct WebDavParams {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub root: Option<String>,
}

impl WebDavParams {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("WebDAV storage requires endpoint"))?;
        Ok(Self {
            endpoint,
            username: config.username.clone(),
            password: config.password.clone(),
            root: config.root.clone(),
        })
    }

    pub fn display_name(&self) -> String {
        format!(
            "webdav://{}{}",
            self.endpoint.trim_end_matches('/'),
            self.root
                .as_deref()
                .map(|r| format!("/{}", r.trim_start_matches('/')))
                .unwrap_or_default()
        )
    }

    /// 有会话时使用 bearer token，否则使用用户名密码
    pub fn operator(&self, session: Option<&Session>) -> Result<Operator> {
        use opendal::services::Webdav;

        let mut builder = Webdav::default().endpoint(&self.endpoint);

        match session {
            Some(s) => builder = builder.token(&s.token),
            None => {
                if let Some(ref u) = self.username {
                    builder = builder.username(u);
                }
                if let Some(ref p) = self.password {
                    builder = builder.password(p);
                }
            }
        }

        if let Some(ref r) = self.root {
            builder = builder.root(r);
        }

        Ok(Operator::new(builder)?.finish())
    }
}
