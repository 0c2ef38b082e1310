//! leadwatch watches chat conversations and records keyword-matched leads.

pub mod config;
pub mod connectors;
pub mod error;
pub mod pipeline;
pub mod store;
