//! Training-mode sub-protocol: trainer activation, then repeated
//! student enrollment against the server.
//!
//! Runs entirely inside badge-scan handling while the controller is in
//! `IN_TRAINING` — the dispatch mutex is held by the caller, so the
//! protocol never interleaves with a transition. The mode is only left
//! through the externally mapped triggers (logout / e-stop / bypass).

use log::{info, warn};

use crate::app::ports::{AuthError, AuthPort, DevicePort, RegisterError};
use crate::controller::Controller;
use crate::error::Result;

impl<D, A> Controller<D, A>
where
    D: DevicePort + 'static,
    A: AuthPort + 'static,
{
    /// Route one badge scan received in training mode: the first badge
    /// authenticates the trainer, every later distinct badge is
    /// enrolled as a student. The trainer re-scanning their own badge
    /// is ignored.
    pub(crate) fn training_scan(&self, badge_code: &str) -> Result<()> {
        match self.session.current_badge() {
            None => self.activate_trainer(badge_code),
            Some(trainer_badge) if trainer_badge != badge_code => {
                self.register_student(badge_code)
            }
            Some(_) => Ok(()),
        }
    }

    /// Authenticate the trainer via the normal server login. The server
    /// enforces trainer privileges when students are registered.
    fn activate_trainer(&self, badge_code: &str) -> Result<()> {
        self.screen.show_attempting_login()?;
        match self.auth.login(badge_code) {
            Ok(trainer) => {
                info!("trainer {} activated", trainer.user_name);
                self.session.set_user(trainer);
                self.screen.show_trainer_accepted()?;
                self.prompt_for_student_badge()
            }
            Err(AuthError::Unauthorized) => {
                warn!("trainer badge {badge_code} rejected by the server");
                self.screen.red_led()?;
                self.screen.show_access_denied()?;
                self.prompt_for_trainer_badge()
            }
            Err(AuthError::Transport(message)) => {
                warn!("trainer login failed: {message}");
                self.screen.red_led()?;
                self.screen.show_unexpected_error()?;
                self.prompt_for_trainer_badge()
            }
        }
    }

    /// Enroll one student badge under the active trainer, then
    /// re-prompt for the next student whatever the outcome.
    fn register_student(&self, badge_code: &str) -> Result<()> {
        let Some(trainer) = self.session.user_snapshot() else {
            return Ok(());
        };
        self.screen.show_attempting_registration()?;
        match self
            .auth
            .register_user(&trainer.user_id, &trainer.badge_code, badge_code)
        {
            Ok(()) => {
                info!("student badge {badge_code} registered by {}", trainer.user_name);
                self.screen.show_student_registered()?;
            }
            Err(RegisterError::Rejected) => {
                warn!("student badge {badge_code} rejected by the server");
                self.screen.red_led()?;
                self.screen.show_registration_failed()?;
                self.screen.show_invalid_user()?;
            }
            Err(RegisterError::Transport(message)) => {
                warn!("student registration failed: {message}");
                self.screen.red_led()?;
                self.screen.show_registration_failed()?;
                self.screen.show_unexpected_error()?;
            }
        }
        self.prompt_for_student_badge()
    }

    fn prompt_for_trainer_badge(&self) -> Result<()> {
        self.screen.magenta_led()?;
        self.screen.show_scan_trainer_badge()?;
        Ok(())
    }

    fn prompt_for_student_badge(&self) -> Result<()> {
        self.screen.magenta_led()?;
        self.screen.show_scan_student_badge()?;
        Ok(())
    }
}
