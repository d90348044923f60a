//! Feishu open-API adapters: read-receipt queries and urgent-phone notifies.
//!
//! One [`FeishuClient`] implements both of the engine's outbound ports. All
//! calls authenticate with a tenant access token resolved per `app_id` and
//! retry transient transport failures per [`retry::RetryPolicy`].

pub mod retry;
pub mod token;
pub mod wire;

use std::collections::HashSet;

use uuid::Uuid;

use lark_common::error::ClientError;
use lark_engine::driver::{ReadReceipts, UrgentNotify};

use crate::retry::RetryPolicy;
use crate::token::{AccessTokens, RedisTokenStore};

/// Page size for the read-users listing.
const READ_USERS_PAGE_SIZE: &str = "100";

/// HTTP client for the Feishu open API.
#[derive(Clone)]
pub struct FeishuClient<T = RedisTokenStore> {
    http: reqwest::Client,
    base_url: String,
    tokens: T,
    retry: RetryPolicy,
}

impl<T: AccessTokens + Sync> FeishuClient<T> {
    pub fn new(base_url: &str, tokens: T, retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            retry,
        }
    }

    /// Send a request, retrying transport failures with the configured
    /// policy. Platform errors (non-zero codes) are not retried here — the
    /// caller decides what a modeled API failure means.
    async fn send_text(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<String, ClientError> {
        let mut attempt = 0u32;
        loop {
            let result = async {
                let response = build()
                    .send()
                    .await
                    .map_err(|e| ClientError::Transport(e.to_string()))?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| ClientError::Transport(e.to_string()))?;
                if !status.is_success() {
                    return Err(ClientError::Transport(format!(
                        "http status {}: {}",
                        status,
                        body.chars().take(200).collect::<String>()
                    )));
                }
                Ok(body)
            }
            .await;

            match result {
                Err(ClientError::Transport(error)) if attempt < self.retry.retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %error, "Feishu request failed, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                }
                other => return other,
            }
        }
    }
}

impl<T: AccessTokens + Sync + Send> ReadReceipts for FeishuClient<T> {
    async fn read_user_ids(
        &self,
        app_id: &str,
        message_id: &str,
    ) -> Result<HashSet<String>, ClientError> {
        let token = self.tokens.access_token(app_id).await?;
        let url = format!(
            "{}/open-apis/im/v1/messages/{}/read_users",
            self.base_url, message_id
        );

        let mut readers = HashSet::new();
        let mut page_token: Option<String> = None;
        loop {
            let body = self
                .send_text(|| {
                    let mut request = self.http.get(&url).bearer_auth(&token).query(&[
                        ("user_id_type", "user_id"),
                        ("page_size", READ_USERS_PAGE_SIZE),
                    ]);
                    if let Some(token) = &page_token {
                        request = request.query(&[("page_token", token.as_str())]);
                    }
                    request
                })
                .await?;

            let page = wire::parse_read_users(&body)?;
            readers.extend(page.user_ids);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(message_id, readers = readers.len(), "Read-users query complete");
        Ok(readers)
    }
}

impl<T: AccessTokens + Sync + Send> UrgentNotify for FeishuClient<T> {
    async fn send_urgent(
        &self,
        app_id: &str,
        user_id: &str,
        message_id: &str,
        idempotency_key: Uuid,
    ) -> Result<(), ClientError> {
        let token = self.tokens.access_token(app_id).await?;
        let url = format!(
            "{}/open-apis/im/v1/messages/{}/urgent_phone",
            self.base_url, message_id
        );
        let body = serde_json::json!({ "user_id_list": [user_id] });
        // The uuid is stable across transport retries of this call, so the
        // platform can deduplicate a re-sent PATCH.
        let key = idempotency_key.to_string();

        let response = self
            .send_text(|| {
                self.http
                    .patch(&url)
                    .bearer_auth(&token)
                    .query(&[("user_id_type", "user_id"), ("uuid", key.as_str())])
                    .json(&body)
            })
            .await?;

        wire::parse_ack(&response)
    }
}
