//! Identity newtypes for chat-platform entities.
//!
//! Participants and channels are identified by the platform's integer
//! snowflake ids. The newtypes keep the two from being swapped at call
//! sites; both store directly into integer columns.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A chat participant (platform user id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub i64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat channel or thread (platform channel id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_display_as_plain_integers() {
        assert_eq!(ParticipantId(42).to_string(), "42");
        assert_eq!(ChannelId(-7).to_string(), "-7");
    }

    #[test]
    fn test_ids_serde_roundtrip() {
        let id = ParticipantId(123_456_789_012_345);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "123456789012345");
        let parsed: ParticipantId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
