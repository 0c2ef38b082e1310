//! Persistence: the append-only lead table.

pub mod table;

pub use table::{AppendReport, LeadTable};
