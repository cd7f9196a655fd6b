//! Shared domain types for Intake.
//!
//! This crate contains the core domain types used across the intake engine:
//! column and table schemas, dynamic row values, script and question
//! definitions, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, regex, thiserror.

pub mod config;
pub mod error;
pub mod ids;
pub mod schema;
pub mod script;
