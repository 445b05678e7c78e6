//! Session state and the metering timer's shared core.
//!
//! The timer itself is a plain thread (spawned by the controller) that
//! calls [`SessionTimer::advance`] once per second. Everything the
//! thread and the dispatch path share — the user context and the live
//! handle's generation — sits behind one mutex, which is what makes
//! re-arm vs. cancel races safe:
//!
//! * a transition cancels by bumping the generation (and optionally
//!   taking the user), never by joining the thread;
//! * a tick that wakes up with a stale generation returns without
//!   touching anything;
//! * expiry returns [`SessionTick::Expired`] so the caller fires the
//!   `logout` trigger *after* the mutex is released.

use parking_lot::Mutex;

use crate::fsm::context::{Extensions, UserContext};

/// What one timer tick decided, reported to the timer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTick {
    /// Time was metered and displayed; sleep another second.
    Rearm,
    /// The budget hit zero — fire `logout` and stop.
    Expired,
    /// The handle was cancelled or the user is gone; stop silently.
    Stopped,
}

/// Outcome of a same-badge extension attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendOutcome {
    /// The budget grew by `session_seconds`.
    Extended { remaining: u64 },
    /// The allowance is exhausted; the budget is unchanged.
    NoExtensions,
}

#[derive(Debug, Default)]
struct SessionState {
    user: Option<UserContext>,
    /// Generation of the currently live timer handle. A bump
    /// invalidates every thread spawned for an earlier generation.
    generation: u64,
}

/// Shared session core: at most one live metering handle at a time.
#[derive(Debug, Default)]
pub struct SessionTimer {
    state: Mutex<SessionState>,
}

impl SessionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the user context for a fresh session.
    pub fn set_user(&self, user: UserContext) {
        self.state.lock().user = Some(user);
    }

    /// Cancel the live handle and take the user context, if any.
    /// Atomic with respect to a tick in flight: a tick either completes
    /// before this call locks, or observes the stale generation after.
    pub fn clear(&self) -> Option<UserContext> {
        let mut state = self.state.lock();
        state.generation += 1;
        state.user.take()
    }

    /// Cancel the live handle, leaving the user context in place.
    /// Idempotent; cancelling an already-fired handle is a no-op.
    pub fn cancel(&self) {
        self.state.lock().generation += 1;
    }

    /// Invalidate any prior handle and return the generation a newly
    /// spawned timer thread must carry.
    pub fn begin(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.generation
    }

    /// One metering tick for the handle identified by `generation`.
    ///
    /// Decrements the budget and renders through `render` (user name,
    /// seconds remaining) while the mutex is held, so a concurrent
    /// transition cannot repaint the screen mid-tick. On expiry the
    /// mutex is released before the caller fires `logout`.
    pub fn advance(&self, generation: u64, render: impl FnOnce(&str, u64)) -> SessionTick {
        let mut state = self.state.lock();
        if state.generation != generation {
            return SessionTick::Stopped;
        }
        let Some(user) = state.user.as_mut() else {
            return SessionTick::Stopped;
        };
        if user.remaining_seconds == 0 {
            return SessionTick::Expired;
        }
        user.remaining_seconds -= 1;
        let remaining = user.remaining_seconds;
        let user_name = user.user_name.clone();
        render(&user_name, remaining);
        SessionTick::Rearm
    }

    /// Same-badge extension: cancel the live handle, then top up the
    /// budget by `session_seconds` and burn one extension unless the
    /// allowance is unbounded. An exhausted allowance changes nothing.
    /// The caller restarts the timer afterwards in both cases.
    pub fn extend(&self) -> Option<ExtendOutcome> {
        let mut state = self.state.lock();
        state.generation += 1;
        let user = state.user.as_mut()?;
        if !user.remaining_extensions.available() {
            return Some(ExtendOutcome::NoExtensions);
        }
        if let Extensions::Remaining(n) = user.remaining_extensions {
            user.remaining_extensions = Extensions::Remaining(n - 1);
        }
        user.remaining_seconds += user.session_seconds;
        Some(ExtendOutcome::Extended {
            remaining: user.remaining_seconds,
        })
    }

    /// Badge code of the current user, if one is present.
    pub fn current_badge(&self) -> Option<String> {
        self.state.lock().user.as_ref().map(|u| u.badge_code.clone())
    }

    /// Clone of the current user context, for telemetry and tests.
    pub fn user_snapshot(&self) -> Option<UserContext> {
        self.state.lock().user.clone()
    }
}
