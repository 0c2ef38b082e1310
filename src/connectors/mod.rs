//! Chat-source connectors.
//!
//! A connector exposes the conversations of one chat client. It is pure I/O;
//! normalization, classification and persistence live in the pipeline.

pub mod bridge;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;
use crate::pipeline::types::RawMessage;

pub use bridge::BridgeConnector;
pub use memory::MemoryConnector;

/// A conversation the connector can address by display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSource {
    pub name: String,
}

impl ChatSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Access to the chat client's conversations.
#[async_trait]
pub trait ChatConnector: Send + Sync {
    /// Connector name for logging (e.g. "bridge").
    fn name(&self) -> &str;

    /// Verify the chat client is reachable. Called once at startup.
    async fn connect(&self) -> Result<(), ConnectorError>;

    /// Currently active conversations, in the client's order.
    async fn list_sources(&self) -> Result<Vec<ChatSource>, ConnectorError>;

    /// Focus a conversation so its messages can be read.
    async fn select_source(&self, name: &str) -> Result<(), ConnectorError>;

    /// Messages of the selected conversation, most recent last.
    async fn recent_messages(&self, source: &ChatSource) -> Result<Vec<RawMessage>, ConnectorError>;
}
