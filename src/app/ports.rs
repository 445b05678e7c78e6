//! Port traits — the boundary between the controller core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller (domain)
//! ```
//!
//! Driven adapters (the GPIO/serial/LCD backend, the authorization HTTP
//! client) implement these traits. The controller consumes them via
//! generics, so the core never touches hardware or the network directly
//! and the full state machine runs against mocks on the host.
//!
//! Both traits require `Send + Sync`: timer threads render through the
//! device port and the fire-and-forget server logout runs on a detached
//! thread.

use std::fmt;

use crate::error::DeviceError;
use crate::fsm::context::UserContext;
use crate::screen::LcdLine;

// ───────────────────────────────────────────────────────────────
// Input events (device → core)
// ───────────────────────────────────────────────────────────────

/// Edge-triggered events the device layer delivers, in physical arrival
/// order, one per [`DevicePort::wait`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A badge code arrived on the serial reader.
    BadgeScanned(String),
    /// Rising edge on the logout pushbutton.
    LogoutPressed,
    /// The e-stop input changed level (either edge).
    EstopChanged,
    /// The bypass-detect input changed level (either edge).
    BypassChanged,
}

// ───────────────────────────────────────────────────────────────
// Device port (GPIO / LED / LCD / serial)
// ───────────────────────────────────────────────────────────────

/// Hardware access port.
///
/// The LED channel is a single RGB indicator: red `(1,0,0)`,
/// green `(0,1,0)`, blue `(0,0,1)`, yellow `(1,1,0)`, magenta `(1,0,1)`.
/// LCD lines arrive already padded/centered to exactly 16 characters —
/// the [`LcdLine`] type enforces the width at the boundary.
pub trait DevicePort: Send + Sync {
    /// Read a GPIO input level.
    fn read_pin(&self, pin: u8) -> Result<bool, DeviceError>;

    /// Drive a GPIO output level.
    fn write_pin(&self, pin: u8, level: bool) -> Result<(), DeviceError>;

    /// Set the RGB status LED.
    fn write_led(&self, red: bool, green: bool, blue: bool) -> Result<(), DeviceError>;

    /// Write one or both LCD lines.
    fn write_lcd(&self, line1: &LcdLine, line2: Option<&LcdLine>) -> Result<(), DeviceError>;

    /// Block until the next registered edge callback has fired and
    /// return the corresponding event.
    fn wait(&self) -> Result<InputEvent, DeviceError>;
}

// ───────────────────────────────────────────────────────────────
// Authorization service port
// ───────────────────────────────────────────────────────────────

/// Remote authorization service port.
pub trait AuthPort: Send + Sync {
    /// Validate a badge and return the granted session.
    fn login(&self, badge_code: &str) -> Result<UserContext, AuthError>;

    /// Notify the server that a session ended. Invoked fire-and-forget
    /// from the logout path; failures are logged, never surfaced.
    fn logout(&self, badge_code: &str) -> Result<(), AuthError>;

    /// Enroll a student badge under a trainer's authority.
    fn register_user(
        &self,
        trainer_id: &str,
        trainer_badge_code: &str,
        student_badge_code: &str,
    ) -> Result<(), RegisterError>;
}

// ───────────────────────────────────────────────────────────────
// Port error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`AuthPort::login`] / [`AuthPort::logout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The server rejected the badge.
    Unauthorized,
    /// Anything else — connection refused, timeout, malformed response.
    Transport(String),
}

/// Errors from [`AuthPort::register_user`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// The server explicitly rejected the student registration.
    Rejected,
    /// Anything else during the call.
    Transport(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "registration rejected"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}
