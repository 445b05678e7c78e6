//! The binding between the controller and a live device: startup mode
//! selection and the main event loop.
//!
//! A deployment wires real adapters to the ports, builds the
//! controller, and hands it to [`run`]:
//!
//! ```ignore
//! let device = Arc::new(GpioDevice::open(&config)?);
//! let auth = Arc::new(HttpAuthService::new(&server_url));
//! let controller = Controller::new(device, auth, config);
//! runner::run(&controller)?;
//! ```
//!
//! [`run`] returns when the controller reaches `TERMINATED` (another
//! thread — a signal handler, typically — calls
//! [`Controller::terminate`]) or when device I/O fails, in which case
//! the error propagates so the supervisor can log it and decide whether
//! to reboot the platform.

use anyhow::Context;
use log::debug;

use crate::app::ports::{AuthPort, DevicePort, InputEvent};
use crate::controller::Controller;
use crate::fsm::Mode;

/// Drive the controller against its device until termination.
pub fn run<D, A>(controller: &Controller<D, A>) -> anyhow::Result<()>
where
    D: DevicePort + 'static,
    A: AuthPort + 'static,
{
    controller
        .publish_status()
        .context("writing initial status")?;

    // Startup: the physical inputs decide the first mode.
    if controller.is_estop_activated()? {
        controller.estop()?;
    } else if controller.is_bypass_detected()? {
        controller.bypass()?;
    } else {
        controller.idle()?;
    }

    while controller.mode() != Mode::Terminated {
        debug!("waiting for the next device event");
        let event = controller
            .device()
            .wait()
            .context("waiting for device input")?;
        match event {
            InputEvent::BadgeScanned(badge_code) => controller.handle_badge_scan(&badge_code)?,
            InputEvent::LogoutPressed => controller.handle_logout_pressed()?,
            InputEvent::EstopChanged => controller.handle_estop_change()?,
            InputEvent::BypassChanged => controller.handle_bypass_change()?,
        }
    }
    Ok(())
}
