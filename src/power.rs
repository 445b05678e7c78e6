//! Safe power-down interlock.
//!
//! Runs synchronously inside a transition whenever the destination mode
//! requires the relay de-energized. Cutting power while the machine
//! still draws current is the failure this exists to prevent: the relay
//! only drops after the current-sense input clears (bounded by the
//! configured timeout) plus an optional coast period for the tool to
//! spin down mechanically.

use std::thread;
use std::time::{Duration, Instant};

use log::warn;

use crate::app::ports::DevicePort;
use crate::config::ControllerConfig;
use crate::error::DeviceError;
use crate::screen::Screen;

/// How often the current-sense input is polled while waiting.
const CURRENT_POLL: Duration = Duration::from_millis(500);

/// Wait for the machine to stop drawing current, then drop the relay.
///
/// Returns immediately if the relay already reads low. While current is
/// sensed the operator sees "WAITING FOR ... / MACHINE TO STOP" with a
/// red LED; the wait is bounded by `max_power_down_timeout` (unbounded
/// when unset). If the machine was ever observed running,
/// `logout_coast_time` extra seconds pass before the relay drops.
pub fn safe_power_down<D: DevicePort>(
    device: &D,
    screen: &Screen<D>,
    config: &ControllerConfig,
) -> Result<(), DeviceError> {
    if !device.read_pin(config.pin_power_relay)? {
        return Ok(());
    }

    let deadline = config
        .max_power_down_timeout
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let mut machine_was_running = false;
    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                warn!("power-down timeout elapsed with current still sensed");
                break;
            }
        }
        if !device.read_pin(config.pin_current_sense)? {
            break;
        }
        machine_was_running = true;
        screen.red_led()?;
        screen.show_waiting_for_power_down()?;
        thread::sleep(CURRENT_POLL);
    }

    if machine_was_running && config.logout_coast_time > 0 {
        screen.show_coasting_down()?;
        thread::sleep(Duration::from_secs(config.logout_coast_time));
    }

    if device.read_pin(config.pin_power_relay)? {
        device.write_pin(config.pin_power_relay, false)?;
        screen.show_disabling_power()?;
    }
    Ok(())
}
