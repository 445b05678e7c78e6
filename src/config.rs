//! Controller configuration.
//!
//! All recognized options for one interlock installation. The struct is
//! immutable for the lifetime of the controller; deployments load it from
//! a JSON file, tests build it from [`Default`] and override fields.

use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Core controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    // --- GPIO assignments (BCM numbering) ---
    /// Pin driving the relay that powers the tool or door strike.
    pub pin_power_relay: u8,
    /// Pin reading machine current draw.
    pub pin_current_sense: u8,
    /// Pin for the logout pushbutton.
    pub pin_logout: u8,
    /// Pin for the emergency-stop input.
    pub pin_estop: u8,
    /// Pin for the bypass-detect input.
    pub pin_bypass_detect: u8,
    /// Pin used to read back the red-LED state for blink toggling.
    pub pin_led_red: u8,
    /// Pin for the alarm output.
    pub pin_alarm: u8,

    // --- Input monitoring ---
    /// When false, the e-stop input is not monitored.
    pub use_estop: bool,
    /// Polarity of the e-stop input.
    pub estop_active_hi: bool,
    /// When false, the bypass input is not monitored.
    pub use_bypass_detect: bool,
    /// When false, the alarm output is never driven.
    pub use_alarm: bool,

    // --- Door semantics ---
    /// Selects door semantics for this installation.
    pub is_a_door: bool,
    /// Enables the continuous-unlock mode (and disables training mode).
    pub door_continuous_unlock: bool,
    /// Start of normal hours as an HHMM integer (e.g. `0800`).
    pub door_normal_hr_start: i32,
    /// End of normal hours as an HHMM integer (e.g. `1700`), inclusive.
    pub door_normal_hr_end: i32,

    // --- Sessions ---
    /// Forces the waiting-for-training guard false.
    pub disable_training_mode: bool,
    /// Allows a different badge to take over an in-use session.
    pub allow_user_override: bool,

    // --- Power-down interlock ---
    /// Seconds to wait for current draw to clear; unbounded when `None`.
    pub max_power_down_timeout: Option<u64>,
    /// Extra seconds to wait after current drops, letting the tool coast
    /// to a mechanical stop. Zero skips the coast phase.
    pub logout_coast_time: u64,

    // --- Reporting ---
    /// File overwritten with the current mode name after every transition.
    pub status_file: PathBuf,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pin_power_relay: 17,
            pin_current_sense: 27,
            pin_logout: 22,
            pin_estop: 23,
            pin_bypass_detect: 24,
            pin_led_red: 25,
            pin_alarm: 5,

            use_estop: true,
            estop_active_hi: false,
            use_bypass_detect: true,
            use_alarm: false,

            is_a_door: false,
            door_continuous_unlock: false,
            door_normal_hr_start: 800,
            door_normal_hr_end: 1700,

            disable_training_mode: false,
            allow_user_override: false,

            max_power_down_timeout: None,
            logout_coast_time: 0,

            status_file: PathBuf::from("/var/lib/toolgate/status"),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The clamped `[start, end]` normal-hours window.
    pub fn normal_hours(&self) -> (NaiveTime, NaiveTime) {
        (
            clamp_hhmm(self.door_normal_hr_start),
            clamp_hhmm(self.door_normal_hr_end),
        )
    }

    /// Whether `now` falls inside the normal-hours window, bounds inclusive.
    pub fn within_normal_hours(&self, now: NaiveTime) -> bool {
        let (start, end) = self.normal_hours();
        start <= now && now <= end
    }
}

/// Convert a raw HHMM integer to a time of day.
///
/// The whole value is clamped to `[0, 2359]` and the minute component to
/// `[0, 59]`, so any integer yields a valid time.
fn clamp_hhmm(raw: i32) -> NaiveTime {
    let value = raw.clamp(0, 2359);
    let hour = (value / 100) as u32;
    let minute = ((value % 100).min(59)) as u32;
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}
