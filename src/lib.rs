//! Sibyl Trading System Library
//!
//! This library provides the core components for the Sibyl automated
//! futures trading loop: exchange gateway, decision oracle, news feed,
//! order planning and the SQLite trade ledger.

pub mod config;
pub mod cycle;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod snapshot;
