//! Core identifier and time types for AgentLink

use core::fmt;
use core::ops::Sub;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Account and Topic Identifiers
// ----------------------------------------------------------------------------

/// Identifier of an agent account on the topic substrate (e.g. `0.0.1234`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Placeholder used when a request envelope carries no account
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Account used for requests that did not identify their sender
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of an append-only topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(String);

impl TopicId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopicId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TopicId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ----------------------------------------------------------------------------
// Locally Generated Identifiers
// ----------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a pending connection request, stable for the process lifetime
    RequestId
);

uuid_id!(
    /// Identifier of an accepted connection
    ConnectionId
);

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get current wall-clock timestamp
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Get duration since another timestamp
    pub fn duration_since(&self, other: Self) -> core::time::Duration {
        core::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Trait for providing timestamps
///
/// The handler stamps `received_at`, `created_at` and `closed_at` through this trait
/// so tests can drive time deterministically.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Wall-clock implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock; clones share the same underlying time
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    millis: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start.as_millis())),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, timestamp: Timestamp) {
        self.millis.store(timestamp.as_millis(), Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.millis.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_account() {
        let account = AccountId::unknown();
        assert!(account.is_unknown());
        assert_eq!(account.to_string(), "unknown");
        assert!(!AccountId::from("0.0.42").is_unknown());
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);

        let parsed: ConnectionId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn test_topic_id_serializes_as_plain_string() {
        let topic = TopicId::from("0.0.7");
        assert_eq!(serde_json::to_string(&topic).unwrap(), "\"0.0.7\"");
    }

    #[test]
    fn test_manual_time_source_is_shared_between_clones() {
        let clock = ManualTimeSource::new(Timestamp::new(1_000));
        let view = clock.clone();

        clock.advance(250);
        assert_eq!(view.now(), Timestamp::new(1_250));
        assert_eq!(view.now() - Timestamp::new(1_000), 250);
    }
}
