//! Access state machine definition.
//!
//! The machine is declarative: a tagged [`Mode`] plus a table of
//! transition rules, each naming its trigger, admissible source modes,
//! destination, and an optional guard. The [`Controller`] owns the
//! dispatch loop and evaluates guards; this module stays pure so the
//! table can be checked exhaustively on the host.
//!
//! ```text
//!            ┌──────── estop ────────────────────────────┐
//!            │                                           │
//!  INITIALIZED ── idle ──▶ IDLE ── login ──▶ IN_USE      ▼
//!      │                   │  ▲              │  │      ESTOP
//!      │                   │  └── logout ────┘  │        │
//!      │                bypass              unlock      idle
//!      ▼                   ▼                    ▼        │
//!   BYPASSED ◀── bypass  BYPASSED           UNLOCKED     ▼
//!                                                      IDLE
//!
//!  long-hold logout from IDLE / ESTOP / BYPASSED ──▶ IN_TRAINING
//!  terminate from anywhere ──▶ TERMINATED
//! ```
//!
//! [`Controller`]: crate::controller::Controller

pub mod context;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Operational mode of the controller. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    Initialized = 0,
    Idle = 1,
    InUse = 2,
    Unlocked = 3,
    InTraining = 4,
    Estop = 5,
    Bypassed = 6,
    Terminated = 7,
}

impl Mode {
    /// Total number of modes — used by table-coverage tests.
    pub const COUNT: usize = 8;

    /// All modes, in discriminant order.
    pub const ALL: [Mode; Mode::COUNT] = [
        Mode::Initialized,
        Mode::Idle,
        Mode::InUse,
        Mode::Unlocked,
        Mode::InTraining,
        Mode::Estop,
        Mode::Bypassed,
        Mode::Terminated,
    ];

    /// The lowercase name written to the status file.
    pub fn name(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Idle => "idle",
            Self::InUse => "in_use",
            Self::Unlocked => "unlocked",
            Self::InTraining => "in_training",
            Self::Estop => "estop",
            Self::Bypassed => "bypassed",
            Self::Terminated => "terminated",
        }
    }

    /// Convert a raw `u8` back to a `Mode`. Panics on out-of-range in
    /// debug builds; returns `Terminated` in release (inert fallback).
    pub fn from_index(idx: u8) -> Self {
        match idx {
            0 => Self::Initialized,
            1 => Self::Idle,
            2 => Self::InUse,
            3 => Self::Unlocked,
            4 => Self::InTraining,
            5 => Self::Estop,
            6 => Self::Bypassed,
            7 => Self::Terminated,
            _ => {
                debug_assert!(false, "invalid mode index: {idx}");
                Self::Terminated
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// A trigger posted to the controller, with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Idle,
    Estop,
    Bypass,
    Unlock,
    Login { badge_code: String },
    Logout,
    Terminate,
}

impl Trigger {
    /// The payload-free identity used for table lookup.
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Idle => TriggerKind::Idle,
            Self::Estop => TriggerKind::Estop,
            Self::Bypass => TriggerKind::Bypass,
            Self::Unlock => TriggerKind::Unlock,
            Self::Login { .. } => TriggerKind::Login,
            Self::Logout => TriggerKind::Logout,
            Self::Terminate => TriggerKind::Terminate,
        }
    }
}

/// Trigger identity without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Idle,
    Estop,
    Bypass,
    Unlock,
    Login,
    Logout,
    Terminate,
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Identifies the guard the controller must evaluate before a rule is
/// admitted. Guards live on the controller because two of them perform
/// device polling and remote calls with user-visible side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardId {
    /// Current wall-clock time is inside the configured hours window.
    NormalHours,
    /// Remote login succeeds and publishes a user context.
    Authorized,
    /// Same-badge session extension, or takeover when override is allowed.
    ExtendOrOverride,
    /// The logout button is still held after the training-mode delay.
    WaitingForTraining,
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// One row of the transition table.
pub struct TransitionRule {
    pub trigger: TriggerKind,
    pub sources: &'static [Mode],
    pub dest: Mode,
    pub guard: Option<GuardId>,
}

/// The complete transition table. Order matters only for the two `Login`
/// rows, which are distinguished by source mode.
pub const TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        trigger: TriggerKind::Idle,
        sources: &[Mode::Initialized, Mode::Estop, Mode::Bypassed],
        dest: Mode::Idle,
        guard: None,
    },
    TransitionRule {
        trigger: TriggerKind::Estop,
        sources: &[
            Mode::Initialized,
            Mode::Bypassed,
            Mode::Idle,
            Mode::InUse,
            Mode::InTraining,
        ],
        dest: Mode::Estop,
        guard: None,
    },
    TransitionRule {
        trigger: TriggerKind::Bypass,
        sources: &[Mode::Initialized, Mode::Estop, Mode::Idle, Mode::InTraining],
        dest: Mode::Bypassed,
        guard: None,
    },
    TransitionRule {
        trigger: TriggerKind::Unlock,
        sources: &[Mode::Idle, Mode::InUse],
        dest: Mode::Unlocked,
        guard: Some(GuardId::NormalHours),
    },
    TransitionRule {
        trigger: TriggerKind::Login,
        sources: &[Mode::Idle],
        dest: Mode::InUse,
        guard: Some(GuardId::Authorized),
    },
    TransitionRule {
        trigger: TriggerKind::Login,
        sources: &[Mode::InUse],
        dest: Mode::InUse,
        guard: Some(GuardId::ExtendOrOverride),
    },
    TransitionRule {
        trigger: TriggerKind::Logout,
        sources: &[Mode::Unlocked, Mode::InUse, Mode::InTraining],
        dest: Mode::Idle,
        guard: None,
    },
    TransitionRule {
        trigger: TriggerKind::Logout,
        sources: &[Mode::Idle, Mode::Estop, Mode::Bypassed],
        dest: Mode::InTraining,
        guard: Some(GuardId::WaitingForTraining),
    },
    TransitionRule {
        trigger: TriggerKind::Terminate,
        sources: &Mode::ALL,
        dest: Mode::Terminated,
        guard: None,
    },
];

/// Look up the rule for a trigger fired from `source`.
/// Returns `None` for pairs the table does not list — such triggers are
/// dropped silently by the dispatcher.
pub fn find_rule(trigger: TriggerKind, source: Mode) -> Option<&'static TransitionRule> {
    TRANSITIONS
        .iter()
        .find(|rule| rule.trigger == trigger && rule.sources.contains(&source))
}
