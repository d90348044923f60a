//! Per-application access-token lookup.
//!
//! Tokens are written and refreshed by an external credential service; this
//! side only reads them. An absent or stale token surfaces as an
//! authorization failure on the API call that needed it.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use lark_common::error::ClientError;

/// Read-only resolver from `app_id` to a tenant access token.
pub trait AccessTokens {
    fn access_token(
        &self,
        app_id: &str,
    ) -> impl Future<Output = Result<String, ClientError>> + Send;
}

/// Redis-backed token store.
#[derive(Clone)]
pub struct RedisTokenStore {
    redis: ConnectionManager,
}

impl RedisTokenStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(app_id: &str) -> String {
        format!("feishu:access_token:{}", app_id)
    }
}

impl AccessTokens for RedisTokenStore {
    async fn access_token(&self, app_id: &str) -> Result<String, ClientError> {
        let mut conn = self.redis.clone();
        let token: Option<String> = conn
            .get(Self::key(app_id))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        match token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(ClientError::Auth(app_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_key_format() {
        assert_eq!(
            RedisTokenStore::key("cli_a1b2c3"),
            "feishu:access_token:cli_a1b2c3"
        );
    }
}
