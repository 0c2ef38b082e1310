//! Lead pipeline.
//!
//! Every message read from a monitored conversation flows through:
//! 1. `normalize()`: connector shape → `ParsedMessage` (or skipped)
//! 2. `DedupMemory::check_and_mark()`: each content is evaluated once per run
//! 3. `RulesEngine::classify()`: keyword policy
//! 4. `LeadTable::append()`: one batch per cycle, append-only
//!
//! `LeadMonitor` owns the state and runs the loop.

pub mod dedup;
pub mod monitor;
pub mod normalize;
pub mod rules;
pub mod types;

pub use dedup::DedupMemory;
pub use monitor::LeadMonitor;
pub use normalize::normalize;
pub use rules::{RulesEngine, Verdict, classify};
pub use types::{CycleOutcome, LeadRecord, MonitorState, ParsedMessage, RawMessage};
