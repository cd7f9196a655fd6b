//! Conversation engine and port trait definitions for Intake.
//!
//! This crate defines the "ports" (store and transport traits) that the
//! infrastructure layer implements, plus the business logic that drives
//! script conversations: the catalog, the state machine, the session
//! registry and service, and the side-channel lifecycle. It depends only
//! on `intake-types` -- never on `intake-infra` or any database/IO crate.

pub mod catalog;
pub mod conversation;
pub mod store;
pub mod transport;
