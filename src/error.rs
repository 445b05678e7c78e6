//! Unified error types for the controller core.
//!
//! A single `Error` enum that every fallible path funnels into, keeping
//! the dispatch loop's error handling uniform. Server-call failures
//! (`AuthError`, `RegisterError` in [`crate::app::ports`]) are handled
//! locally by the controller and never reach this type; what propagates
//! out of the main loop is device I/O, the status file, and config
//! loading.

use std::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible controller operation funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// A device channel (GPIO, LED, LCD, serial wait) failed.
    Device(DeviceError),
    /// Status-file or config-file I/O failed.
    Io(std::io::Error),
    /// Configuration could not be parsed.
    Config(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(e) => write!(f, "device: {e}"),
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Device(_) => None,
            Self::Io(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Device errors
// ---------------------------------------------------------------------------

/// Errors surfaced by a [`DevicePort`](crate::app::ports::DevicePort)
/// adapter. The message carries whatever detail the backend has; the
/// variant records which channel failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// A GPIO read or write failed.
    Gpio(String),
    /// An LCD write failed.
    Lcd(String),
    /// An RGB LED write failed.
    Led(String),
    /// Waiting for the next input event failed.
    Wait(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpio(msg) => write!(f, "gpio: {msg}"),
            Self::Lcd(msg) => write!(f, "lcd: {msg}"),
            Self::Led(msg) => write!(f, "led: {msg}"),
            Self::Wait(msg) => write!(f, "wait: {msg}"),
        }
    }
}

impl std::error::Error for DeviceError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;
