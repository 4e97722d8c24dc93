//! Core data types for instance lifecycle management.

use std::fmt;

use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::state::InstanceStatus;

// ============================================================================
// INSTANCE ID
// ============================================================================

/// Instance identifier (64-character lowercase hex).
///
/// Derived deterministically from the `(user_id, challenge_id)` pair so that
/// a user can hold at most one instance per challenge. The digest covers a
/// length-prefixed, order-preserving encoding: swapping the two ids, or
/// moving characters between them, yields a different instance id.
///
/// The id doubles as the workload (container) name.
///
/// # Example
///
/// ```
/// use labbox::InstanceId;
///
/// let id = InstanceId::derive("user-1", "web-100");
/// assert_eq!(id.as_str().len(), 64);
/// assert_ne!(id, InstanceId::derive("web-100", "user-1"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Length of full instance ID (64 hex chars = 256 bits).
    pub const FULL_LENGTH: usize = 64;

    /// Length of short instance ID for display (12 hex chars).
    pub const SHORT_LENGTH: usize = 12;

    /// Derive the instance id for a user and a challenge.
    pub fn derive(user_id: &str, challenge_id: &str) -> Self {
        let mut hasher = Sha256::new();
        for (tag, value) in [("user", user_id), ("challenge", challenge_id)] {
            hasher.update(tag.as_bytes());
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse an InstanceId from an existing string.
    ///
    /// Returns `None` if the string is not a valid 64-char lowercase hex string.
    pub fn parse(s: &str) -> Option<Self> {
        if Self::is_valid(s) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Check if a string is a valid instance ID format.
    pub fn is_valid(s: &str) -> bool {
        s.len() == Self::FULL_LENGTH
            && s.chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the short form (first 12 characters) for display.
    pub fn short(&self) -> &str {
        &self.0[..Self::SHORT_LENGTH]
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.short())
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for InstanceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl ToSql for InstanceId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.0.as_bytes())))
    }
}

impl FromSql for InstanceId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(|s| Self(s.to_string()))
    }
}

// ============================================================================
// INSTANCE RECORD
// ============================================================================

/// Persisted instance record.
///
/// Timestamps are unix milliseconds. `expires_at` is fixed when the instance
/// is created and is never extended by activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub user_id: String,
    pub user_name: String,
    pub challenge_id: String,
    pub challenge_name: String,
    /// Flag expected from the user (static or generated for this run).
    pub flag: String,
    /// Comma separated container ports inherited from the image.
    pub exposed: String,
    pub duration_minutes: u32,
    /// CPU limit in (fractional) cores.
    pub cpu_limit: f64,
    pub memory_limit_mib: u64,
    pub status: InstanceStatus,
    /// Generated subdomain label; empty unless the gateway is enabled.
    pub subdomain: String,
    /// Public URL in gateway mode, otherwise the published host port.
    pub access_url: String,
    /// Diagnostic message recorded on failure.
    pub message: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Instance {
    /// Milliseconds until expiry at `now`, or `None` when already expired.
    pub fn remaining_millis(&self, now: i64) -> Option<u64> {
        let remaining = self.expires_at - now;
        (remaining > 0).then_some(remaining as u64)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.remaining_millis(now).is_none()
    }

    /// Whether the instance is exposed through the gateway.
    pub fn has_subdomain(&self) -> bool {
        !self.subdomain.is_empty()
    }

    pub fn view(&self) -> InstanceView {
        InstanceView::from(self)
    }
}

/// What a user sees about their own instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    pub status: InstanceStatus,
    pub created_at: i64,
    pub expires_at: i64,
    pub access_url: String,
}

impl From<&Instance> for InstanceView {
    fn from(instance: &Instance) -> Self {
        Self {
            status: instance.status,
            created_at: instance.created_at,
            expires_at: instance.expires_at,
            access_url: instance.access_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_derive_is_deterministic() {
        let a = InstanceId::derive("alice", "web-1");
        let b = InstanceId::derive("alice", "web-1");
        assert_eq!(a, b);
        assert!(InstanceId::is_valid(a.as_str()));
        assert_eq!(a.short().len(), InstanceId::SHORT_LENGTH);
    }

    #[test]
    fn test_derive_is_order_sensitive() {
        // Sorted concatenation would map both of these to the same digest.
        assert_ne!(
            InstanceId::derive("42", "7"),
            InstanceId::derive("7", "42")
        );
        assert_ne!(
            InstanceId::derive("ab", "c"),
            InstanceId::derive("a", "bc")
        );
    }

    #[test]
    fn test_parse() {
        let id = InstanceId::derive("u", "c");
        assert_eq!(InstanceId::parse(id.as_str()), Some(id.clone()));
        assert!(InstanceId::parse("not-an-id").is_none());
        assert!(InstanceId::parse(&id.as_str().to_uppercase()).is_none());
    }

    #[test]
    fn test_remaining_millis() {
        let instance = Instance {
            id: InstanceId::derive("u", "c"),
            user_id: "u".into(),
            user_name: "user".into(),
            challenge_id: "c".into(),
            challenge_name: "challenge".into(),
            flag: "flag{x}".into(),
            exposed: "80".into(),
            duration_minutes: 1,
            cpu_limit: 0.5,
            memory_limit_mib: 128,
            status: InstanceStatus::Running,
            subdomain: String::new(),
            access_url: "32768".into(),
            message: String::new(),
            created_at: 1_000,
            expires_at: 61_000,
        };
        assert_eq!(instance.remaining_millis(1_000), Some(60_000));
        assert_eq!(instance.remaining_millis(61_000), None);
        assert!(instance.is_expired(70_000));
        assert!(!instance.has_subdomain());

        let view = serde_json::to_value(instance.view()).unwrap();
        assert_eq!(view["status"], "running");
        assert_eq!(view["createdAt"], 1_000);
        assert_eq!(view["expiresAt"], 61_000);
        assert_eq!(view["accessUrl"], "32768");
    }

    proptest! {
        #[test]
        fn prop_distinct_pairs_get_distinct_ids(
            user in "[a-z0-9]{1,12}",
            challenge in "[a-z0-9]{1,12}",
        ) {
            prop_assume!(user != challenge);
            prop_assert_ne!(
                InstanceId::derive(&user, &challenge),
                InstanceId::derive(&challenge, &user)
            );
        }
    }
}
