//! HTTP bridge connector.
//!
//! Talks to a small automation service running next to the desktop chat
//! client. The bridge drives the client's UI and exposes:
//!
//! - `GET  /health` → 2xx when the client is attached
//! - `GET  /sessions` → `[{"name": "..."}]` (bare strings also accepted)
//! - `POST /chat` with `{"name": "..."}` → focus a conversation
//! - `GET  /messages?chat=<name>` → `[RawMessage]`, most recent last

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::config::BridgeConfig;
use crate::connectors::{ChatConnector, ChatSource};
use crate::error::ConnectorError;
use crate::pipeline::types::RawMessage;

/// Session entry as reported by the bridge.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionEntry {
    Named { name: String },
    Bare(String),
}

impl From<SessionEntry> for ChatSource {
    fn from(entry: SessionEntry) -> Self {
        match entry {
            SessionEntry::Named { name } | SessionEntry::Bare(name) => ChatSource { name },
        }
    }
}

/// Connector speaking the bridge's JSON-over-HTTP protocol.
pub struct BridgeConnector {
    base_url: String,
    token: Option<SecretString>,
    client: reqwest::Client,
}

impl BridgeConnector {
    pub fn new(config: &BridgeConfig) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConnectorError::Http(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Send a request and fail on non-2xx status.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, String> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("bridge returned {status}: {body}"));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatConnector for BridgeConnector {
    fn name(&self) -> &str {
        "bridge"
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        self.send(self.client.get(self.url("health")))
            .await
            .map(|_| ())
            .map_err(|reason| ConnectorError::Unreachable {
                name: format!("bridge at {}", self.base_url),
                reason,
            })
    }

    async fn list_sources(&self) -> Result<Vec<ChatSource>, ConnectorError> {
        let response = self
            .send(self.client.get(self.url("sessions")))
            .await
            .map_err(ConnectorError::Enumeration)?;
        let entries: Vec<SessionEntry> = response
            .json()
            .await
            .map_err(|e| ConnectorError::Enumeration(format!("invalid session list: {e}")))?;
        Ok(entries.into_iter().map(ChatSource::from).collect())
    }

    async fn select_source(&self, name: &str) -> Result<(), ConnectorError> {
        let body = serde_json::json!({ "name": name });
        self.send(self.client.post(self.url("chat")).json(&body))
            .await
            .map(|_| ())
            .map_err(|reason| ConnectorError::Fetch {
                source_name: name.to_string(),
                reason,
            })
    }

    async fn recent_messages(&self, source: &ChatSource) -> Result<Vec<RawMessage>, ConnectorError> {
        let fetch_err = |reason: String| ConnectorError::Fetch {
            source_name: source.name.clone(),
            reason,
        };

        let response = self
            .send(
                self.client
                    .get(self.url("messages"))
                    .query(&[("chat", source.name.as_str())]),
            )
            .await
            .map_err(fetch_err)?;
        let values: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| fetch_err(format!("invalid message list: {e}")))?;

        // Shapes neither variant understands are dropped here, like any other
        // non-content message.
        let total = values.len();
        let messages: Vec<RawMessage> = values
            .into_iter()
            .filter_map(RawMessage::from_value)
            .collect();
        if messages.len() < total {
            debug!(
                source = %source.name,
                skipped = total - messages.len(),
                "Skipped undecodable messages"
            );
        }
        Ok(messages)
    }
}
