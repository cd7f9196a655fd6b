//! Script-driven conversations: state machine, registry, service, and
//! side-channel lifecycle.
//!
//! The state machine in `session` is pure (text in, action out); the
//! `service` performs the sends and commits it decides on, the `registry`
//! enforces one serialized session per participant, and `lifecycle` owns
//! the private channels conversations run in.

pub mod lifecycle;
pub mod registry;
pub mod service;
pub mod session;
