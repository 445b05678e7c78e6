//! Authenticated-user context carried by the state machine.

use serde::{Deserialize, Serialize};

/// The session budget's extension allowance.
///
/// Servers may grant a finite number of same-badge extensions or leave
/// the allowance unbounded (serialized as `null`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Extensions {
    Remaining(u32),
    Unbounded,
}

impl Extensions {
    /// Whether at least one extension may still be taken.
    pub fn available(self) -> bool {
        !matches!(self, Self::Remaining(0))
    }
}

/// Everything known about the authenticated user (or trainer) for the
/// duration of one session.
///
/// Created from a successful server login; `remaining_seconds` is
/// decremented once per session-timer tick and topped up by extensions;
/// the whole context is dropped on logout, e-stop, bypass, training
/// exit, and termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// Opaque identifier emitted by the RFID reader.
    pub badge_code: String,
    /// Server-side user id, echoed back on student registration.
    pub user_id: String,
    /// Display name rendered on the LCD while the session runs.
    pub user_name: String,
    /// The budget one login (or one extension) grants, in seconds.
    pub session_seconds: u64,
    /// Seconds left before auto-logout.
    pub remaining_seconds: u64,
    /// How many extensions this user may still take.
    pub remaining_extensions: Extensions,
}
