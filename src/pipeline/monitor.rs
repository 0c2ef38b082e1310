//! The polling loop that drives the pipeline.
//!
//! Each cycle:
//! 1. List active conversations, keep those whose name contains a listen name
//! 2. For each, read the last few messages: normalize → dedup → classify
//! 3. Append the cycle's leads to the table in one batch
//! 4. Sleep, then start over
//!
//! Failures never end the loop. A failing source is skipped for the cycle; a
//! failing append keeps the batch and retries it on the next flush.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::connectors::{ChatConnector, ChatSource};
use crate::error::{ConnectorError, PipelineError, StorageError};
use crate::pipeline::dedup::DedupMemory;
use crate::pipeline::normalize::normalize;
use crate::pipeline::rules::RulesEngine;
use crate::pipeline::types::{CycleOutcome, LeadRecord, MonitorState};
use crate::store::LeadTable;

/// Characters of a lead shown in log lines.
const LOG_PREVIEW_CHARS: usize = 15;

/// Polls chat sources and persists leads.
///
/// Owns all run-scoped state: the dedup memory, the table handle and any
/// leads still waiting to be written.
pub struct LeadMonitor {
    connector: Arc<dyn ChatConnector>,
    rules: RulesEngine,
    listen_names: Vec<String>,
    recent_window: usize,
    poll_interval: Duration,
    dedup: DedupMemory,
    table: LeadTable,
    /// Leads accepted but not yet written (a previous append failed).
    pending: Vec<LeadRecord>,
    state: MonitorState,
    cycles: u64,
    leads_written: usize,
}

impl LeadMonitor {
    pub fn new(config: &MonitorConfig, connector: Arc<dyn ChatConnector>) -> Self {
        Self {
            connector,
            rules: RulesEngine::from_config(config),
            listen_names: config.listen_names.clone(),
            recent_window: config.recent_window,
            poll_interval: config.poll_interval,
            dedup: DedupMemory::new(),
            table: LeadTable::new(&config.result_path),
            pending: Vec::new(),
            state: MonitorState::Idle,
            cycles: 0,
            leads_written: 0,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn dedup(&self) -> &DedupMemory {
        &self.dedup
    }

    pub fn table(&self) -> &LeadTable {
        &self.table
    }

    /// Leads accepted but not yet persisted.
    pub fn pending_leads(&self) -> usize {
        self.pending.len()
    }

    /// True if a conversation with this display name is monitored.
    pub fn is_monitored(&self, name: &str) -> bool {
        self.listen_names.iter().any(|listen| name.contains(listen.as_str()))
    }

    /// Run cycles until `shutdown` becomes `true`.
    ///
    /// Shutdown is observed between cycles, between sources, and during the
    /// sleep. An in-flight append always completes first.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            connector = self.connector.name(),
            table = %self.table.path().display(),
            interval_secs = self.poll_interval.as_secs(),
            "Lead monitor started"
        );

        while !*shutdown.borrow() {
            let outcome = self.cycle(Some(&shutdown)).await;
            log_outcome(self.cycles, &outcome);

            if *shutdown.borrow() {
                break;
            }

            self.state = MonitorState::Sleeping;
            let stop = tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => false,
                _ = wait_for_stop(&mut shutdown) => true,
            };
            if stop {
                break;
            }
        }

        self.state = MonitorState::Stopped;
        info!(
            cycles = self.cycles,
            leads_written = self.leads_written,
            seen = self.dedup.len(),
            unsaved = self.pending.len(),
            "Lead monitor stopped"
        );
    }

    /// Run a single cycle: poll, process, flush.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycle(None).await
    }

    async fn cycle(&mut self, shutdown: Option<&watch::Receiver<bool>>) -> CycleOutcome {
        self.cycles += 1;
        match self.poll_and_flush(shutdown).await {
            Ok((leads, failures)) if failures.is_empty() => CycleOutcome::Ok { leads },
            Ok((leads, failures)) => CycleOutcome::PartialFailure {
                leads,
                reason: failures.join("; "),
            },
            Err(e) => CycleOutcome::FatalFailure {
                reason: e.to_string(),
            },
        }
    }

    /// Poll every monitored source and flush the batch.
    ///
    /// Returns the number of leads written and why any sources were skipped.
    async fn poll_and_flush(
        &mut self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> crate::error::Result<(usize, Vec<String>)> {
        self.state = MonitorState::Polling;
        let sources = self
            .connector
            .list_sources()
            .await
            .map_err(PipelineError::Enumeration)?;

        self.state = MonitorState::Processing;
        let monitored: Vec<ChatSource> = sources
            .into_iter()
            .filter(|s| self.is_monitored(&s.name))
            .collect();
        let mut batch = Vec::new();
        let mut failures = Vec::new();

        for source in &monitored {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                debug!("Shutdown requested; skipping remaining sources");
                break;
            }
            if let Err(e) = self.process_source(source, &mut batch).await {
                warn!(source = %source.name, error = %e, "Skipping source for this cycle");
                failures.push(e.to_string());
            }
        }

        self.state = MonitorState::Flushing;
        let leads = self.flush(batch).await.map_err(PipelineError::Flush)?;
        Ok((leads, failures))
    }

    /// Read one conversation and push its new leads onto `batch`.
    async fn process_source(
        &mut self,
        source: &ChatSource,
        batch: &mut Vec<LeadRecord>,
    ) -> Result<(), ConnectorError> {
        self.connector.select_source(&source.name).await?;
        let messages = self.connector.recent_messages(source).await?;

        let start = messages.len().saturating_sub(self.recent_window);
        for raw in &messages[start..] {
            let Some(message) = normalize(raw) else {
                continue;
            };

            if !self.dedup.check_and_mark(&message.content) {
                continue;
            }

            let verdict = self.rules.explain(&message.content);
            if !verdict.is_lead() {
                debug!(
                    source = %source.name,
                    verdict = verdict.label(),
                    preview = %preview(&message.content),
                    "Message rejected"
                );
                continue;
            }

            info!(
                source = %source.name,
                sender = %message.sender,
                preview = %preview(&message.content),
                "Lead found"
            );
            batch.push(LeadRecord::new(Local::now(), &source.name, message));
        }
        Ok(())
    }

    /// Write `batch` plus anything left over from a failed flush.
    async fn flush(&mut self, batch: Vec<LeadRecord>) -> Result<usize, StorageError> {
        self.pending.extend(batch);
        if self.pending.is_empty() {
            return Ok(0);
        }

        match self.table.append_async(self.pending.clone()).await {
            Ok(report) => {
                let written = std::mem::take(&mut self.pending).len();
                self.leads_written += written;
                info!(
                    count = written,
                    prior_rows = ?report.prior_rows,
                    table = %self.table.path().display(),
                    "Saved new leads"
                );
                Ok(written)
            }
            Err(e) => {
                warn!(
                    unsaved = self.pending.len(),
                    error = %e,
                    "Append failed; keeping leads for the next cycle"
                );
                Err(e)
            }
        }
    }
}

/// Resolve once `shutdown` is set to `true`.
///
/// Never resolves if the sender is gone, since nothing can request a stop.
async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    let sender_alive = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !sender_alive {
        std::future::pending::<()>().await;
    }
}

fn log_outcome(cycle: u64, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Ok { leads: 0 } => debug!(cycle, "Cycle complete, no new leads"),
        CycleOutcome::Ok { leads } => info!(cycle, leads, "Cycle complete"),
        CycleOutcome::PartialFailure { leads, reason } => {
            warn!(cycle, leads, reason = %reason, "Cycle completed with errors")
        }
        CycleOutcome::FatalFailure { reason } => error!(cycle, reason = %reason, "Cycle failed"),
    }
}

fn preview(content: &str) -> String {
    let mut preview: String = content.chars().take(LOG_PREVIEW_CHARS).collect();
    if content.chars().nth(LOG_PREVIEW_CHARS).is_some() {
        preview.push_str("...");
    }
    preview
}
