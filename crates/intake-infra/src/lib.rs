//! Infrastructure implementations for the intake engine.
//!
//! Implements the port traits from `intake-core` against real backends:
//! the SQLite table store with split reader/writer pools, and the strict
//! TOML configuration loader. Chat-platform transports implement the
//! `Messenger`/`SideChannelHost` ports in their own crates.

pub mod config;
pub mod sqlite;
