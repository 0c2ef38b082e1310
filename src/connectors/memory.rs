//! In-memory connector with scripted conversations.
//!
//! Used by tests and local dry runs. Failures can be injected per source
//! to exercise the orchestrator's recovery paths.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::connectors::{ChatConnector, ChatSource};
use crate::error::ConnectorError;
use crate::pipeline::types::RawMessage;

#[derive(Debug, Default)]
struct Script {
    sources: Vec<String>,
    messages: HashMap<String, Vec<RawMessage>>,
    failing_sources: HashSet<String>,
    fail_listing: bool,
    unreachable: bool,
    selected: Vec<String>,
}

/// Connector backed by in-memory conversations.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    script: Mutex<Script>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a conversation (or replace its messages), keeping insertion order.
    pub fn with_source(self, name: &str, messages: Vec<RawMessage>) -> Self {
        self.set_messages(name, messages);
        self
    }

    /// Replace the messages of a conversation, adding it if new.
    pub fn set_messages(&self, name: &str, messages: Vec<RawMessage>) {
        let mut script = self.lock();
        if !script.sources.iter().any(|s| s == name) {
            script.sources.push(name.to_string());
        }
        script.messages.insert(name.to_string(), messages);
    }

    /// Make reads from `name` fail until cleared.
    pub fn fail_source(&self, name: &str, failing: bool) {
        let mut script = self.lock();
        if failing {
            script.failing_sources.insert(name.to_string());
        } else {
            script.failing_sources.remove(name);
        }
    }

    /// Make `list_sources` fail until cleared.
    pub fn fail_listing(&self, failing: bool) {
        self.lock().fail_listing = failing;
    }

    /// Make `connect` fail.
    pub fn unreachable(self) -> Self {
        self.lock().unreachable = true;
        self
    }

    /// Names passed to `select_source`, in call order.
    pub fn selected(&self) -> Vec<String> {
        self.lock().selected.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ChatConnector for MemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        if self.lock().unreachable {
            return Err(ConnectorError::Unreachable {
                name: "memory".into(),
                reason: "scripted as unreachable".into(),
            });
        }
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<ChatSource>, ConnectorError> {
        let script = self.lock();
        if script.fail_listing {
            return Err(ConnectorError::Enumeration("scripted listing failure".into()));
        }
        Ok(script.sources.iter().map(ChatSource::new).collect())
    }

    async fn select_source(&self, name: &str) -> Result<(), ConnectorError> {
        let mut script = self.lock();
        if !script.sources.iter().any(|s| s == name) {
            return Err(ConnectorError::Fetch {
                source_name: name.to_string(),
                reason: "no such conversation".into(),
            });
        }
        script.selected.push(name.to_string());
        Ok(())
    }

    async fn recent_messages(&self, source: &ChatSource) -> Result<Vec<RawMessage>, ConnectorError> {
        let script = self.lock();
        if script.failing_sources.contains(&source.name) {
            return Err(ConnectorError::Fetch {
                source_name: source.name.clone(),
                reason: "scripted fetch failure".into(),
            });
        }
        Ok(script
            .messages
            .get(&source.name)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_sources_in_insertion_order() {
        let connector = MemoryConnector::new()
            .with_source("work2", vec![])
            .with_source("work1", vec![]);
        let names: Vec<String> = connector
            .list_sources()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["work2", "work1"]);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let connector = MemoryConnector::new().with_source("work1", vec![RawMessage::pair("a", "b")]);
        connector.fail_source("work1", true);
        assert!(matches!(
            connector.recent_messages(&ChatSource::new("work1")).await,
            Err(ConnectorError::Fetch { .. })
        ));
        connector.fail_source("work1", false);
        assert_eq!(
            connector
                .recent_messages(&ChatSource::new("work1"))
                .await
                .unwrap()
                .len(),
            1
        );

        connector.fail_listing(true);
        assert!(connector.list_sources().await.is_err());
    }

    #[tokio::test]
    async fn unreachable_fails_connect() {
        let connector = MemoryConnector::new().unreachable();
        assert!(matches!(
            connector.connect().await,
            Err(ConnectorError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn select_records_calls() {
        let connector = MemoryConnector::new().with_source("work1", vec![]);
        connector.select_source("work1").await.unwrap();
        assert!(connector.select_source("missing").await.is_err());
        assert_eq!(connector.selected(), vec!["work1"]);
    }
}
