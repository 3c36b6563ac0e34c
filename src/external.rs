//! External collaborators: the provisioning panel that owns real user
//! identities, and the notification webhook. Both sit behind traits so the
//! ledger can be exercised without the network.

use std::time::Duration;

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use tracing::{info, warn};

/// Returns or creates a stable external account id for an email. The
/// ledger treats the id as opaque.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn ensure_user(&self, email: &str, username: &str) -> Result<u64, String>;
}

/// Fire-and-forget delivery of human-readable event strings. Failures are
/// logged and swallowed; the ledger never blocks on the outcome.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, title: &str, message: &str);
}

/// Pterodactyl-style application API client.
pub struct PanelProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl PanelProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { base_url, api_key, client }
    }
}

#[async_trait]
impl IdentityProvider for PanelProvider {
    async fn ensure_user(&self, email: &str, username: &str) -> Result<u64, String> {
        // Look the email up first; the panel is the source of truth.
        let url = format!(
            "{}/api/application/users?filter[email]={}",
            self.base_url, email
        );
        let response: serde_json::Value = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        if let Some(id) = response
            .pointer("/data/0/attributes/id")
            .and_then(|v| v.as_u64())
        {
            return Ok(id);
        }

        // No panel user yet; create one with a generated password.
        let password: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        let body = serde_json::json!({
            "username": username,
            "email": email,
            "first_name": "user",
            "last_name": "user",
            "password": password,
        });
        let created: serde_json::Value = self
            .client
            .post(format!("{}/api/application/users", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        created
            .pointer("/attributes/id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| "panel returned no user id".to_string())
    }
}

/// Discord webhook sink.
pub struct DiscordWebhook {
    url: String,
    client: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { url, client }
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhook {
    async fn notify(&self, title: &str, message: &str) {
        info!("[{}] {}", title, message);
        let body = serde_json::json!({
            "embeds": [{ "title": title, "description": message }]
        });
        if let Err(e) = self.client.post(&self.url).json(&body).send().await {
            warn!("Failed to deliver notification '{}': {}", title, e);
        }
    }
}

/// Sink that only logs, for deployments without a webhook.
pub struct LogOnlySink;

#[async_trait]
impl NotificationSink for LogOnlySink {
    async fn notify(&self, title: &str, message: &str) {
        info!("[{}] {}", title, message);
    }
}
