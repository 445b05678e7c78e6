//! The access controller: serialized trigger dispatch over the
//! declarative transition table, entry actions, and the mapping from
//! device input events to triggers.
//!
//! ```text
//!  DevicePort ──▶ ┌───────────────────────────┐ ──▶ relay / LED / LCD
//!  (badge, button,│        Controller          │
//!   e-stop, bypass│  table dispatch · guards   │ ──▶ status file
//!   edges)        │  session + relock timers   │
//!  AuthPort  ◀──▶ └───────────────────────────┘
//! ```
//!
//! Serialization model: one mutex guards the dispatch core and is held
//! across a whole transition, entry actions included. Triggers raised
//! from inside an entry action (the idle-entry bypass probe) go onto a
//! FIFO that is drained before the mutex is released, so they run as
//! their own transitions immediately after — never nested. Timer
//! threads and input handlers post through the same mutex; the session
//! timer's per-second tick is the only work that runs outside it,
//! serialized separately by the session mutex.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::app::ports::{AuthError, AuthPort, DevicePort};
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::fsm::context::UserContext;
use crate::fsm::{GuardId, Mode, Trigger, find_rule};
use crate::power;
use crate::relock::{RelockTick, RelockTimer};
use crate::screen::Screen;
use crate::session::{ExtendOutcome, SessionTick, SessionTimer};
use crate::status;

/// Session metering interval.
const SESSION_TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Business-hours re-check interval while a door is held unlocked.
const RELOCK_INTERVAL: Duration = Duration::from_secs(60);
/// How long the logout button must stay held to enter training mode.
const TRAINING_HOLD: Duration = Duration::from_secs(2);
/// Poll interval for the training-mode hold check.
const TRAINING_POLL: Duration = Duration::from_millis(100);
/// Settle time before re-reading the bypass input after entering idle
/// or clearing an e-stop.
const BYPASS_SETTLE: Duration = Duration::from_millis(500);

/// Mutable dispatch state, guarded by the controller's core mutex.
struct Core {
    mode: Mode,
    /// Triggers raised while a transition is running, drained in FIFO
    /// order before the mutex is released.
    pending: VecDeque<Trigger>,
}

/// The access controller. Constructed once per process via [`new`] and
/// shared behind an `Arc`; timer threads keep only weak back-references
/// so dropping the last strong handle winds everything down.
///
/// [`new`]: Controller::new
pub struct Controller<D: DevicePort, A: AuthPort> {
    pub(crate) config: ControllerConfig,
    pub(crate) device: Arc<D>,
    pub(crate) auth: Arc<A>,
    pub(crate) screen: Screen<D>,
    pub(crate) session: SessionTimer,
    relock: RelockTimer,
    /// Lock-free mirror of `Core::mode` for timer threads and queries.
    mode_cell: AtomicU8,
    core: Mutex<Core>,
    weak_self: Weak<Self>,
}

impl<D, A> Controller<D, A>
where
    D: DevicePort + 'static,
    A: AuthPort + 'static,
{
    pub fn new(device: Arc<D>, auth: Arc<A>, config: ControllerConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            screen: Screen::new(Arc::clone(&device), &config),
            device,
            auth,
            config,
            session: SessionTimer::new(),
            relock: RelockTimer::new(),
            mode_cell: AtomicU8::new(Mode::Initialized as u8),
            core: Mutex::new(Core {
                mode: Mode::Initialized,
                pending: VecDeque::new(),
            }),
            weak_self: weak.clone(),
        })
    }

    // ── Queries ───────────────────────────────────────────────

    /// The current mode, readable from any thread without waiting on a
    /// transition in progress.
    pub fn mode(&self) -> Mode {
        Mode::from_index(self.mode_cell.load(Ordering::SeqCst))
    }

    /// Clone of the current user context, if a session is active.
    pub fn user_snapshot(&self) -> Option<UserContext> {
        self.session.user_snapshot()
    }

    /// The device port this controller drives.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Rewrite the status file with the current mode name.
    pub fn publish_status(&self) -> Result<()> {
        status::write_mode(&self.config.status_file, self.mode())?;
        Ok(())
    }

    // ── Triggers (public surface) ─────────────────────────────

    pub fn idle(&self) -> Result<()> {
        self.fire(Trigger::Idle)
    }

    pub fn estop(&self) -> Result<()> {
        self.fire(Trigger::Estop)
    }

    pub fn bypass(&self) -> Result<()> {
        self.fire(Trigger::Bypass)
    }

    pub fn unlock(&self) -> Result<()> {
        self.fire(Trigger::Unlock)
    }

    pub fn login(&self, badge_code: &str) -> Result<()> {
        self.fire(Trigger::Login {
            badge_code: badge_code.to_owned(),
        })
    }

    pub fn logout(&self) -> Result<()> {
        self.fire(Trigger::Logout)
    }

    pub fn terminate(&self) -> Result<()> {
        self.fire(Trigger::Terminate)
    }

    fn fire(&self, trigger: Trigger) -> Result<()> {
        let mut core = self.core.lock();
        core.pending.push_back(trigger);
        self.drain(&mut core)
    }

    // ── Input-event mapping ───────────────────────────────────

    /// A badge code arrived on the serial reader.
    ///
    /// In training mode the scan drives the trainer/student protocol
    /// directly; everywhere else it becomes a `login` trigger.
    pub fn handle_badge_scan(&self, badge_code: &str) -> Result<()> {
        let mut core = self.core.lock();
        if core.mode == Mode::InTraining {
            self.training_scan(badge_code)
        } else {
            core.pending.push_back(Trigger::Login {
                badge_code: badge_code.to_owned(),
            });
            self.drain(&mut core)
        }
    }

    /// Rising edge on the logout pushbutton.
    pub fn handle_logout_pressed(&self) -> Result<()> {
        let mut core = self.core.lock();
        let trigger = if core.mode == Mode::InTraining && self.is_estop_activated()? {
            // Leaving training with the e-stop still latched: go
            // straight back to the e-stop mode it deferred.
            Trigger::Estop
        } else if core.mode == Mode::InTraining && self.is_bypass_detected()? {
            Trigger::Bypass
        } else if self.config.is_a_door
            && self.config.door_continuous_unlock
            && matches!(core.mode, Mode::Idle | Mode::InUse)
        {
            Trigger::Unlock
        } else {
            Trigger::Logout
        };
        core.pending.push_back(trigger);
        self.drain(&mut core)
    }

    /// The e-stop input changed level.
    pub fn handle_estop_change(&self) -> Result<()> {
        let mut core = self.core.lock();
        if self.is_estop_activated()? {
            // Training defers the e-stop until the trainer exits.
            if core.mode != Mode::InTraining {
                core.pending.push_back(Trigger::Estop);
                return self.drain(&mut core);
            }
        } else if core.mode == Mode::Estop {
            // Switch was reset: give a just-thrown bypass switch a
            // moment to settle before deciding where to go.
            thread::sleep(BYPASS_SETTLE);
            let trigger = if self.is_bypass_detected()? {
                Trigger::Bypass
            } else {
                Trigger::Idle
            };
            core.pending.push_back(trigger);
            return self.drain(&mut core);
        }
        Ok(())
    }

    /// The bypass-detect input changed level.
    pub fn handle_bypass_change(&self) -> Result<()> {
        let mut core = self.core.lock();
        if self.is_bypass_detected()? {
            // Positive edge only matters from idle; training defers it.
            if core.mode == Mode::Idle {
                core.pending.push_back(Trigger::Bypass);
                return self.drain(&mut core);
            }
        } else if core.mode == Mode::Bypassed {
            core.pending.push_back(Trigger::Idle);
            return self.drain(&mut core);
        }
        Ok(())
    }

    // ── Dispatch ──────────────────────────────────────────────

    fn drain(&self, core: &mut Core) -> Result<()> {
        while let Some(trigger) = core.pending.pop_front() {
            let Some(rule) = find_rule(trigger.kind(), core.mode) else {
                debug!("ignoring {:?} in mode {}", trigger.kind(), core.mode.name());
                continue;
            };
            let admitted = match rule.guard {
                None => true,
                Some(guard) => self.eval_guard(guard, &trigger)?,
            };
            if !admitted {
                continue;
            }

            let from = core.mode;
            // Any timers the source mode left live die before the
            // destination's entry actions run.
            self.session.cancel();
            self.relock.cancel();

            core.mode = rule.dest;
            self.mode_cell.store(rule.dest as u8, Ordering::SeqCst);
            info!("{} -> {}", from.name(), rule.dest.name());

            self.run_entry_actions(core)?;
            self.publish_status()?;
        }
        Ok(())
    }

    fn eval_guard(&self, guard: GuardId, trigger: &Trigger) -> Result<bool> {
        match guard {
            GuardId::NormalHours => Ok(self.is_normal_hours()),
            GuardId::Authorized => {
                let Trigger::Login { badge_code } = trigger else {
                    return Ok(false);
                };
                self.do_login(badge_code, false)
            }
            GuardId::ExtendOrOverride => {
                let Trigger::Login { badge_code } = trigger else {
                    return Ok(false);
                };
                if self.session.current_badge().as_deref() == Some(badge_code.as_str()) {
                    self.extend_current_session()?;
                    Ok(true)
                } else if self.config.allow_user_override {
                    info!("override login attempt by badge {badge_code}");
                    // The displaced user is logged out before the fresh
                    // attempt, so their server session always closes.
                    self.do_logout();
                    self.do_login(badge_code, true)
                } else {
                    Ok(false)
                }
            }
            GuardId::WaitingForTraining => self.is_waiting_for_training(),
        }
    }

    // ── Entry actions ─────────────────────────────────────────

    fn run_entry_actions(&self, core: &mut Core) -> Result<()> {
        match core.mode {
            Mode::Initialized => Ok(()),
            Mode::Idle => {
                self.ensure_idle()?;
                // A bypass thrown while we were busy elsewhere must not
                // leave the controller sitting in idle.
                thread::sleep(BYPASS_SETTLE);
                if self.is_bypass_detected()? {
                    core.pending.push_back(Trigger::Bypass);
                }
                Ok(())
            }
            Mode::InUse => {
                self.ensure_in_use()?;
                self.start_session_timer();
                Ok(())
            }
            Mode::Unlocked => {
                self.do_logout();
                self.device.write_pin(self.config.pin_power_relay, true)?;
                self.screen.green_led()?;
                self.screen.show_unlocked()?;
                self.start_relock_timer();
                info!("door held unlocked until hours end or explicit logout");
                Ok(())
            }
            Mode::InTraining => {
                self.do_logout();
                power::safe_power_down(self.device.as_ref(), &self.screen, &self.config)?;
                self.screen.magenta_led()?;
                self.screen.show_training_mode_activated()?;
                self.screen.show_scan_trainer_badge()?;
                Ok(())
            }
            Mode::Estop => {
                self.do_logout();
                power::safe_power_down(self.device.as_ref(), &self.screen, &self.config)?;
                self.screen.red_led()?;
                self.screen.show_estop_activated()?;
                warn!("emergency stop detected");
                Ok(())
            }
            Mode::Bypassed => {
                self.do_logout();
                power::safe_power_down(self.device.as_ref(), &self.screen, &self.config)?;
                self.screen.yellow_led()?;
                self.screen.show_bypassed()?;
                warn!("access control is bypassed");
                Ok(())
            }
            Mode::Terminated => self.ensure_idle(),
        }
    }

    /// The idle ambience: session closed, power safely down, blue LED,
    /// scan prompt. Shared by the idle and terminated entries and by
    /// failed non-override logins.
    fn ensure_idle(&self) -> Result<()> {
        self.do_logout();
        power::safe_power_down(self.device.as_ref(), &self.screen, &self.config)?;
        self.screen.blue_led()?;
        self.screen.show_scan_badge()?;
        Ok(())
    }

    /// The in-use ambience: relay energized, green LED.
    fn ensure_in_use(&self) -> Result<()> {
        self.device.write_pin(self.config.pin_power_relay, true)?;
        self.screen.green_led()?;
        Ok(())
    }

    // ── Session lifecycle ─────────────────────────────────────

    /// Close the current session, if any: cancel both timers, clear the
    /// user context, and notify the server on a detached thread so the
    /// transition never stalls on the network.
    fn do_logout(&self) {
        self.relock.cancel();
        if let Some(user) = self.session.clear() {
            info!("ending session for {}", user.user_name);
            let auth = Arc::clone(&self.auth);
            let badge_code = user.badge_code;
            thread::spawn(move || {
                if let Err(e) = auth.logout(&badge_code) {
                    warn!("server logout for badge {badge_code} failed: {e}");
                }
            });
        }
    }

    /// Perform the server login and publish the user context.
    ///
    /// On failure the user sees the denied or unexpected-error screens
    /// and the source mode's ambience is restored: idle normally, or
    /// relay-on/green when the attempt was an in-use override. Returns
    /// whether a user context is now present.
    fn do_login(&self, badge_code: &str, override_attempt: bool) -> Result<bool> {
        self.screen.show_attempting_login()?;
        match self.auth.login(badge_code) {
            Ok(user) => {
                info!(
                    "badge {badge_code} authorized: {} ({}s budget)",
                    user.user_name, user.remaining_seconds
                );
                self.session.set_user(user);
                self.screen.show_access_granted()?;
                Ok(true)
            }
            Err(AuthError::Unauthorized) => {
                warn!("badge {badge_code} rejected by the server");
                self.screen.red_led()?;
                self.screen.show_access_denied()?;
                self.restore_source_ambience(override_attempt)?;
                Ok(false)
            }
            Err(AuthError::Transport(message)) => {
                warn!("login for badge {badge_code} failed: {message}");
                self.screen.red_led()?;
                self.screen.show_unexpected_error()?;
                self.restore_source_ambience(override_attempt)?;
                Ok(false)
            }
        }
    }

    fn restore_source_ambience(&self, override_attempt: bool) -> Result<()> {
        if override_attempt {
            self.ensure_in_use()
        } else {
            self.ensure_idle()
        }
    }

    /// Same-badge extension: top up the budget, show the outcome,
    /// redraw the clock and restart the metering timer.
    fn extend_current_session(&self) -> Result<()> {
        match self.session.extend() {
            Some(ExtendOutcome::Extended { remaining }) => {
                info!("session extended, {remaining}s remaining");
                self.screen.show_session_extended()?;
            }
            Some(ExtendOutcome::NoExtensions) => {
                info!("extension denied, allowance exhausted");
                self.screen.show_no_extensions_remaining()?;
            }
            None => {}
        }
        if let Some(user) = self.session.user_snapshot() {
            self.screen
                .show_remaining_time(&user.user_name, user.remaining_seconds)?;
        }
        self.start_session_timer();
        Ok(())
    }

    // ── Guard conditions ──────────────────────────────────────

    /// Whether the e-stop input currently reads active, honoring the
    /// configured polarity. Always false when monitoring is disabled.
    pub fn is_estop_activated(&self) -> Result<bool> {
        if !self.config.use_estop {
            return Ok(false);
        }
        let level = self.device.read_pin(self.config.pin_estop)?;
        Ok(level == self.config.estop_active_hi)
    }

    /// Whether the bypass input currently reads detected.
    pub fn is_bypass_detected(&self) -> Result<bool> {
        if !self.config.use_bypass_detect {
            return Ok(false);
        }
        Ok(self.device.read_pin(self.config.pin_bypass_detect)?)
    }

    fn is_normal_hours(&self) -> bool {
        self.config.within_normal_hours(chrono::Local::now().time())
    }

    /// Distinguish a brief logout press from a training-mode hold: poll
    /// the button every 100 ms for up to 2 s and report whether it is
    /// still asserted at the end of the window.
    fn is_waiting_for_training(&self) -> Result<bool> {
        if (self.config.is_a_door && self.config.door_continuous_unlock)
            || self.config.disable_training_mode
        {
            return Ok(false);
        }
        let deadline = Instant::now() + TRAINING_HOLD;
        while self.mode() != Mode::Terminated
            && Instant::now() < deadline
            && self.device.read_pin(self.config.pin_logout)?
        {
            thread::sleep(TRAINING_POLL);
        }
        Ok(self.device.read_pin(self.config.pin_logout)?)
    }

    // ── Timers ────────────────────────────────────────────────

    fn start_session_timer(&self) {
        let generation = self.session.begin();
        let weak = self.weak_self.clone();
        thread::spawn(move || session_loop(&weak, generation));
    }

    fn start_relock_timer(&self) {
        let weak = self.weak_self.clone();
        self.relock.start(RELOCK_INTERVAL, move || {
            let Some(controller) = weak.upgrade() else {
                return RelockTick::Stop;
            };
            if controller.mode() == Mode::Terminated {
                return RelockTick::Stop;
            }
            if controller.is_normal_hours() {
                RelockTick::Rearm
            } else {
                info!("outside normal hours, relocking door");
                if let Err(e) = controller.logout() {
                    warn!("door relock failed: {e}");
                }
                RelockTick::Stop
            }
        });
    }
}

/// Body of one session-timer thread. Exits as soon as its generation is
/// superseded, the user is gone, the budget expires, or the controller
/// terminates or drops.
fn session_loop<D, A>(weak: &Weak<Controller<D, A>>, generation: u64)
where
    D: DevicePort + 'static,
    A: AuthPort + 'static,
{
    loop {
        thread::sleep(SESSION_TICK_INTERVAL);
        let Some(controller) = weak.upgrade() else {
            return;
        };
        if controller.mode() == Mode::Terminated {
            return;
        }
        let tick = controller
            .session
            .advance(generation, |user_name, remaining| {
                if let Err(e) = controller.screen.show_remaining_time(user_name, remaining) {
                    warn!("remaining-time display failed: {e}");
                }
            });
        match tick {
            SessionTick::Rearm => {}
            SessionTick::Stopped => return,
            SessionTick::Expired => {
                info!("session budget exhausted, logging out");
                if let Err(e) = controller.logout() {
                    warn!("expiry logout failed: {e}");
                }
                return;
            }
        }
    }
}
