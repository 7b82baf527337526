use std::fmt;

use async_trait::async_trait;

use crate::config::ChatStreamConfig;
use crate::error::{AssemblerError, AssemblerResult};

/// Bearer credential and the id of the signed-in user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bearer_token: String,
    pub user_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bearer_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn credentials(&self) -> AssemblerResult<Credentials>;
}

/// Fixed credentials, typically from config or the environment.
#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    credentials: Credentials,
}

impl StaticAuthenticator {
    pub fn new(bearer_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            credentials: Credentials {
                bearer_token: bearer_token.into(),
                user_id: user_id.into(),
            },
        }
    }

    pub fn from_config(config: &ChatStreamConfig) -> AssemblerResult<Self> {
        let token = config
            .api_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| AssemblerError::Auth("no API token configured".to_string()))?;
        let user_id = config.user_id.as_deref().unwrap_or("anonymous");
        Ok(Self::new(token, user_id))
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn credentials(&self) -> AssemblerResult<Credentials> {
        Ok(self.credentials.clone())
    }
}
