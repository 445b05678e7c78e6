//! 16×2 LCD and status-LED presentation.
//!
//! Every user-facing string the controller shows lives here, one method
//! per screen, padded/centered into fixed-width [`LcdLine`]s before it
//! crosses the device port. Methods that announce a result hold the
//! screen for a readability pause before returning, which is safe
//! because transitions are serialized.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::app::ports::DevicePort;
use crate::config::ControllerConfig;
use crate::error::DeviceError;

/// Character width of the LCD.
pub const LCD_WIDTH: usize = 16;

/// Remaining-session threshold below which the red LED blinks and the
/// alarm output is asserted.
pub const LOW_TIME_WARNING_SECS: u64 = 300;

/// Readability pause after short confirmations.
const PAUSE_BRIEF: Duration = Duration::from_secs(1);
/// Readability pause after warnings and denials.
const PAUSE_NOTICE: Duration = Duration::from_secs(2);

/// One display line, exactly [`LCD_WIDTH`] characters once centered.
pub type LcdLine = heapless::String<LCD_WIDTH>;

/// Center `text` into a full-width [`LcdLine`].
///
/// Text longer than the display is truncated; shorter text is padded
/// with spaces on both sides, the extra space going to the right. The
/// result always fills the line, so stale characters from a previous
/// screen never show through.
pub fn center(text: &str) -> LcdLine {
    let mut line = LcdLine::new();
    let width = text.chars().count().min(LCD_WIDTH);
    let left_pad = (LCD_WIDTH - width) / 2;
    for _ in 0..left_pad {
        let _ = line.push(' ');
    }
    for c in text.chars().take(LCD_WIDTH) {
        if line.push(c).is_err() {
            break;
        }
    }
    while line.push(' ').is_ok() {}
    line
}

/// Presentation front-end over the device port: LCD text, the RGB
/// status LED, and the alarm output.
pub struct Screen<D> {
    device: Arc<D>,
    pin_led_red: u8,
    pin_alarm: u8,
    use_alarm: bool,
}

impl<D: DevicePort> Screen<D> {
    pub fn new(device: Arc<D>, config: &ControllerConfig) -> Self {
        Self {
            device,
            pin_led_red: config.pin_led_red,
            pin_alarm: config.pin_alarm,
            use_alarm: config.use_alarm,
        }
    }

    // ── LED + alarm ───────────────────────────────────────────

    /// Red: fault or denial. The alarm output follows.
    pub fn red_led(&self) -> Result<(), DeviceError> {
        self.device.write_led(true, false, false)?;
        self.set_alarm(true)
    }

    /// Green: power is (or is about to be) available.
    pub fn green_led(&self) -> Result<(), DeviceError> {
        self.device.write_led(false, true, false)?;
        self.set_alarm(false)
    }

    /// Blue: idle, waiting for a badge.
    pub fn blue_led(&self) -> Result<(), DeviceError> {
        self.device.write_led(false, false, true)?;
        self.set_alarm(false)
    }

    /// Yellow (red+green): bypassed.
    pub fn yellow_led(&self) -> Result<(), DeviceError> {
        self.device.write_led(true, true, false)?;
        self.set_alarm(false)
    }

    /// Magenta (red+blue): training mode.
    pub fn magenta_led(&self) -> Result<(), DeviceError> {
        self.device.write_led(true, false, true)?;
        self.set_alarm(false)
    }

    /// Invert the red LED (read back through its GPIO) and keep the
    /// alarm asserted. Drives the low-time blink.
    pub fn toggle_red_led(&self) -> Result<(), DeviceError> {
        let lit = self.device.read_pin(self.pin_led_red)?;
        self.device.write_led(!lit, false, false)?;
        self.set_alarm(true)
    }

    fn set_alarm(&self, on: bool) -> Result<(), DeviceError> {
        if self.use_alarm {
            self.device.write_pin(self.pin_alarm, on)?;
        }
        Ok(())
    }

    // ── Idle / login screens ──────────────────────────────────

    pub fn show_scan_badge(&self) -> Result<(), DeviceError> {
        self.show("SCAN BADGE", Some("TO LOGIN"))
    }

    pub fn show_attempting_login(&self) -> Result<(), DeviceError> {
        self.show("ATTEMPTING", Some("LOGIN..."))?;
        thread::sleep(PAUSE_BRIEF);
        Ok(())
    }

    pub fn show_access_granted(&self) -> Result<(), DeviceError> {
        self.show("ACCESS GRANTED", None)?;
        thread::sleep(PAUSE_BRIEF);
        Ok(())
    }

    pub fn show_access_denied(&self) -> Result<(), DeviceError> {
        self.show("ACCESS DENIED", Some("TAKE THE CLASS"))?;
        thread::sleep(PAUSE_NOTICE);
        Ok(())
    }

    // ── Session screens ───────────────────────────────────────

    /// Render the running session: user name over `HH:MM:SS` remaining.
    /// Under [`LOW_TIME_WARNING_SECS`] the red LED blinks once per call.
    pub fn show_remaining_time(&self, user_name: &str, remaining: u64) -> Result<(), DeviceError> {
        if remaining < LOW_TIME_WARNING_SECS {
            self.toggle_red_led()?;
        }
        self.show(user_name, Some(&format_clock(remaining)))
    }

    pub fn show_session_extended(&self) -> Result<(), DeviceError> {
        self.show("SESSION EXTENDED", None)?;
        thread::sleep(PAUSE_BRIEF);
        Ok(())
    }

    pub fn show_no_extensions_remaining(&self) -> Result<(), DeviceError> {
        self.show("NO EXTENSIONS", Some("REMAINING..."))?;
        thread::sleep(PAUSE_NOTICE);
        Ok(())
    }

    // ── Door screens ──────────────────────────────────────────

    pub fn show_unlocked(&self) -> Result<(), DeviceError> {
        self.show("TOOLGATE", Some("IS UNLOCKED"))
    }

    // ── Safety screens ────────────────────────────────────────

    pub fn show_estop_activated(&self) -> Result<(), DeviceError> {
        self.show("E-STOP ACTIVATED", Some("RESET THE SWITCH"))
    }

    pub fn show_bypassed(&self) -> Result<(), DeviceError> {
        self.show("TOOLGATE", Some("IS BYPASSED"))
    }

    pub fn show_waiting_for_power_down(&self) -> Result<(), DeviceError> {
        self.show("WAITING FOR ...", Some("MACHINE TO STOP"))
    }

    pub fn show_coasting_down(&self) -> Result<(), DeviceError> {
        self.show("COASTING", Some("DOWN..."))
    }

    pub fn show_disabling_power(&self) -> Result<(), DeviceError> {
        self.show("DISABLING", Some("POWER..."))
    }

    // ── Training screens ──────────────────────────────────────

    pub fn show_training_mode_activated(&self) -> Result<(), DeviceError> {
        self.show("TRAINING MODE", Some("ACTIVATED..."))?;
        thread::sleep(PAUSE_BRIEF);
        Ok(())
    }

    pub fn show_scan_trainer_badge(&self) -> Result<(), DeviceError> {
        self.show("SCAN", Some("TRAINER BADGE..."))
    }

    pub fn show_trainer_accepted(&self) -> Result<(), DeviceError> {
        self.show("TRAINER", Some("ACCEPTED..."))?;
        thread::sleep(PAUSE_BRIEF);
        Ok(())
    }

    pub fn show_scan_student_badge(&self) -> Result<(), DeviceError> {
        self.show("SCAN", Some("STUDENT BADGE..."))
    }

    pub fn show_attempting_registration(&self) -> Result<(), DeviceError> {
        self.show("ATTEMPTING", Some("REGISTRATION..."))?;
        thread::sleep(PAUSE_BRIEF);
        Ok(())
    }

    pub fn show_student_registered(&self) -> Result<(), DeviceError> {
        self.show("STUDENT", Some("REGISTERED..."))?;
        thread::sleep(PAUSE_BRIEF);
        Ok(())
    }

    pub fn show_registration_failed(&self) -> Result<(), DeviceError> {
        self.show("REGISTRATION", Some("FAILED..."))?;
        thread::sleep(PAUSE_NOTICE);
        Ok(())
    }

    pub fn show_invalid_user(&self) -> Result<(), DeviceError> {
        self.show("INVALID", Some("USER..."))?;
        thread::sleep(PAUSE_NOTICE);
        Ok(())
    }

    // ── Error screens ─────────────────────────────────────────

    /// The two-screen unexpected-error sequence shown after any server
    /// failure that is not a plain rejection.
    pub fn show_unexpected_error(&self) -> Result<(), DeviceError> {
        self.show("THERE WAS AN", Some("UNEXPECTED ERROR"))?;
        thread::sleep(PAUSE_NOTICE);
        self.show("PLEASE", Some("TRY AGAIN..."))?;
        thread::sleep(PAUSE_NOTICE);
        Ok(())
    }

    // ── Internal ──────────────────────────────────────────────

    fn show(&self, line1: &str, line2: Option<&str>) -> Result<(), DeviceError> {
        let top = center(line1);
        let bottom = line2.map(center);
        self.device.write_lcd(&top, bottom.as_ref())
    }
}

/// `HH:MM:SS` for the remaining-time display.
fn format_clock(remaining: u64) -> String {
    let hours = remaining / 3600;
    let minutes = (remaining % 3600) / 60;
    let seconds = remaining % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
