//! End-to-end tests of the access state machine: login, session
//! metering and expiry, extensions, override, e-stop, bypass, and
//! termination. Timer behaviour runs in real time against small
//! budgets, so a handful of these tests take a few seconds each.

use std::thread;
use std::time::Duration;

use crate::mock_hw::Harness;
use toolgate::config::ControllerConfig;
use toolgate::fsm::Mode;
use toolgate::fsm::context::Extensions;

/// Give detached threads (server logout notifications) time to land.
fn settle() {
    thread::sleep(Duration::from_millis(300));
}

// ── Idle ambience ────────────────────────────────────────────

#[test]
fn startup_enters_idle_with_relay_low() {
    let h = Harness::build_default();
    h.controller.idle().unwrap();

    assert_eq!(h.controller.mode(), Mode::Idle);
    assert_eq!(h.status(), "idle\n");
    assert!(!h.relay());
    assert_eq!(h.device.last_led(), Some((false, false, true)), "blue LED in idle");
    assert!(h.device.saw_screen("SCAN BADGE / TO LOGIN"));
}

// ── Login ────────────────────────────────────────────────────

#[test]
fn authorized_login_energizes_relay_and_starts_session() {
    let h = Harness::build_default();
    h.auth.grant("A1", "Alice", 3600, 3600, Extensions::Remaining(2));
    h.controller.idle().unwrap();

    h.controller.handle_badge_scan("A1").unwrap();

    assert_eq!(h.controller.mode(), Mode::InUse);
    assert_eq!(h.status(), "in_use\n");
    assert!(h.relay(), "relay must be energized in use");
    assert_eq!(h.device.last_led(), Some((false, true, false)), "green LED in use");
    assert!(h.device.saw_screen("ACCESS GRANTED"));

    let user = h.controller.user_snapshot().expect("session active");
    assert_eq!(user.user_name, "Alice");
    assert_eq!(h.auth.login_count("A1"), 1);
}

#[test]
fn unauthorized_login_shows_denied_and_stays_idle() {
    let h = Harness::build_default();
    h.controller.idle().unwrap();

    h.controller.handle_badge_scan("Z9").unwrap();

    assert_eq!(h.controller.mode(), Mode::Idle);
    assert!(h.controller.user_snapshot().is_none());
    assert!(!h.relay());
    assert!(h.device.saw_screen("ACCESS DENIED / TAKE THE CLASS"));
    // No transition happened, so the status file still says idle.
    assert_eq!(h.status(), "idle\n");
}

#[test]
fn transport_error_shows_unexpected_error_and_stays_idle() {
    let h = Harness::build_default();
    h.auth.set_transport_down(true);
    h.controller.idle().unwrap();

    h.controller.handle_badge_scan("A1").unwrap();

    assert_eq!(h.controller.mode(), Mode::Idle);
    assert!(h.controller.user_snapshot().is_none());
    assert!(h.device.saw_screen("THERE WAS AN / UNEXPECTED ERROR"));
    assert!(h.device.saw_screen("PLEASE / TRY AGAIN..."));
}

// ── Session metering ─────────────────────────────────────────

#[test]
fn session_expiry_returns_to_idle_and_notifies_server_once() {
    let h = Harness::build_default();
    h.auth.grant("A1", "Alice", 3600, 1, Extensions::Remaining(0));
    h.controller.idle().unwrap();
    h.controller.handle_badge_scan("A1").unwrap();
    assert_eq!(h.controller.mode(), Mode::InUse);

    // One metering tick burns the single remaining second; the next
    // tick fires the auto-logout.
    thread::sleep(Duration::from_secs(4));

    assert_eq!(h.controller.mode(), Mode::Idle);
    assert_eq!(h.status(), "idle\n");
    assert!(!h.relay(), "relay must be low after auto-logout");
    assert!(h.controller.user_snapshot().is_none());
    assert_eq!(h.auth.logout_count("A1"), 1);
}

#[test]
fn low_time_warning_blinks_red_and_renders_clock() {
    let h = Harness::build_default();
    // 5 seconds remaining is far below the 300 s warning threshold.
    h.auth.grant("A1", "Alice", 3600, 5, Extensions::Remaining(0));
    h.controller.idle().unwrap();
    h.controller.handle_badge_scan("A1").unwrap();

    thread::sleep(Duration::from_millis(2500));

    assert!(h.device.saw_screen("Alice / 00:00:0"), "clock render expected");
    let reds: Vec<_> = h
        .device
        .calls()
        .iter()
        .filter(|c| {
            matches!(
                c,
                crate::mock_hw::DeviceCall::WriteLed { green: false, blue: false, .. }
            )
        })
        .cloned()
        .collect();
    assert!(!reds.is_empty(), "red-channel blink writes expected");
}

// ── Extensions ───────────────────────────────────────────────

#[test]
fn same_badge_scan_extends_the_session() {
    let h = Harness::build_default();
    h.auth.grant("A1", "Alice", 3600, 2600, Extensions::Remaining(2));
    h.controller.idle().unwrap();
    h.controller.handle_badge_scan("A1").unwrap();

    h.controller.handle_badge_scan("A1").unwrap();

    assert_eq!(h.controller.mode(), Mode::InUse);
    assert!(h.device.saw_screen("SESSION EXTENDED"));
    let user = h.controller.user_snapshot().unwrap();
    // A couple of metering ticks may have run between login and the
    // second scan; the extension must still add a full hour.
    assert!(
        (6195..=6200).contains(&user.remaining_seconds),
        "remaining = {}",
        user.remaining_seconds
    );
    assert_eq!(user.remaining_extensions, Extensions::Remaining(1));
    // Extension is local bookkeeping — no server logout happened.
    assert_eq!(h.auth.logout_count("A1"), 0);
}

#[test]
fn exhausted_extensions_leave_budget_unchanged() {
    let h = Harness::build_default();
    h.auth.grant("A1", "Alice", 3600, 2600, Extensions::Remaining(0));
    h.controller.idle().unwrap();
    h.controller.handle_badge_scan("A1").unwrap();

    h.controller.handle_badge_scan("A1").unwrap();

    assert!(h.device.saw_screen("NO EXTENSIONS / REMAINING..."));
    let user = h.controller.user_snapshot().unwrap();
    assert!(
        (2595..=2600).contains(&user.remaining_seconds),
        "budget must not grow, remaining = {}",
        user.remaining_seconds
    );
}

// ── Override ─────────────────────────────────────────────────

#[test]
fn override_swaps_user_and_logs_out_the_displaced_badge() {
    let h = Harness::build(ControllerConfig {
        allow_user_override: true,
        ..ControllerConfig::default()
    });
    h.auth.grant("A1", "Alice", 3600, 3600, Extensions::Remaining(2));
    h.auth.grant("B2", "Bob", 1800, 1800, Extensions::Unbounded);
    h.controller.idle().unwrap();
    h.controller.handle_badge_scan("A1").unwrap();

    h.controller.handle_badge_scan("B2").unwrap();
    settle();

    assert_eq!(h.controller.mode(), Mode::InUse);
    assert!(h.relay());
    let user = h.controller.user_snapshot().expect("Bob's session");
    assert_eq!(user.user_name, "Bob");
    assert_eq!(h.auth.logout_count("A1"), 1, "displaced badge must be logged out");
}

#[test]
fn foreign_badge_without_override_is_refused() {
    let h = Harness::build_default();
    h.auth.grant("A1", "Alice", 3600, 3600, Extensions::Remaining(2));
    h.auth.grant("B2", "Bob", 1800, 1800, Extensions::Unbounded);
    h.controller.idle().unwrap();
    h.controller.handle_badge_scan("A1").unwrap();

    h.controller.handle_badge_scan("B2").unwrap();
    settle();

    let user = h.controller.user_snapshot().expect("Alice keeps the machine");
    assert_eq!(user.user_name, "Alice");
    assert_eq!(h.auth.login_count("B2"), 0, "guard must refuse before the server call");
    assert_eq!(h.auth.logout_count("A1"), 0);
}

#[test]
fn failed_override_leaves_in_use_with_relay_on_and_no_user() {
    let h = Harness::build(ControllerConfig {
        allow_user_override: true,
        ..ControllerConfig::default()
    });
    h.auth.grant("A1", "Alice", 3600, 3600, Extensions::Remaining(2));
    h.controller.idle().unwrap();
    h.controller.handle_badge_scan("A1").unwrap();

    // "Z9" is unknown: the override attempt fails after Alice has
    // already been displaced.
    h.controller.handle_badge_scan("Z9").unwrap();
    settle();

    assert_eq!(h.controller.mode(), Mode::InUse);
    assert!(h.relay(), "relay stays energized on a failed override");
    assert!(h.controller.user_snapshot().is_none());
    assert!(h.device.saw_screen("ACCESS DENIED / TAKE THE CLASS"));
    assert_eq!(h.auth.logout_count("A1"), 1);
}

// ── E-stop ───────────────────────────────────────────────────

#[test]
fn estop_during_use_cuts_power_and_clears_the_session() {
    let h = Harness::build_default();
    h.auth.grant("A1", "Alice", 3600, 3600, Extensions::Remaining(2));
    h.controller.idle().unwrap();
    h.controller.handle_badge_scan("A1").unwrap();
    assert!(h.relay());

    // Default polarity is active-low: drive the input low to stop.
    h.device.set_pin(h.config.pin_estop, false);
    h.controller.handle_estop_change().unwrap();
    settle();

    assert_eq!(h.controller.mode(), Mode::Estop);
    assert_eq!(h.status(), "estop\n");
    assert!(!h.relay());
    assert!(h.controller.user_snapshot().is_none());
    assert!(h.device.saw_screen("E-STOP ACTIVATED / RESET THE SWITCH"));
    assert_eq!(h.device.last_led(), Some((true, false, false)), "red LED in e-stop");
    assert_eq!(h.auth.logout_count("A1"), 1);

    // Reset the switch with no bypass asserted: back to idle.
    h.device.set_pin(h.config.pin_estop, true);
    h.controller.handle_estop_change().unwrap();
    assert_eq!(h.controller.mode(), Mode::Idle);
    assert_eq!(h.status(), "idle\n");
}

#[test]
fn estop_reset_with_bypass_asserted_goes_to_bypassed() {
    let h = Harness::build_default();
    h.controller.idle().unwrap();
    h.device.set_pin(h.config.pin_estop, false);
    h.controller.handle_estop_change().unwrap();
    assert_eq!(h.controller.mode(), Mode::Estop);

    h.device.set_pin(h.config.pin_bypass_detect, true);
    h.device.set_pin(h.config.pin_estop, true);
    h.controller.handle_estop_change().unwrap();

    assert_eq!(h.controller.mode(), Mode::Bypassed);
    assert_eq!(h.status(), "bypassed\n");
}

// ── Bypass ───────────────────────────────────────────────────

#[test]
fn bypass_round_trip_is_a_no_op_on_the_session() {
    let h = Harness::build_default();
    h.controller.idle().unwrap();

    h.device.set_pin(h.config.pin_bypass_detect, true);
    h.controller.handle_bypass_change().unwrap();

    assert_eq!(h.controller.mode(), Mode::Bypassed);
    assert_eq!(h.status(), "bypassed\n");
    assert!(!h.relay());
    assert_eq!(h.device.last_led(), Some((true, true, false)), "yellow LED bypassed");
    assert!(h.device.saw_screen("IS BYPASSED"));

    h.device.set_pin(h.config.pin_bypass_detect, false);
    h.controller.handle_bypass_change().unwrap();

    assert_eq!(h.controller.mode(), Mode::Idle);
    assert!(h.controller.user_snapshot().is_none());
    assert!(!h.relay());
}

#[test]
fn bypass_still_asserted_after_idle_entry_reenters_bypassed() {
    let h = Harness::build_default();
    // Bypass goes up before the controller ever reaches idle: the
    // idle-entry settle probe must route it onward.
    h.device.set_pin(h.config.pin_bypass_detect, true);
    h.controller.idle().unwrap();

    assert_eq!(h.controller.mode(), Mode::Bypassed);
    assert_eq!(h.status(), "bypassed\n");
}

// ── Silent drops ─────────────────────────────────────────────

#[test]
fn badge_scans_are_ignored_outside_login_modes() {
    let h = Harness::build_default();
    h.controller.idle().unwrap();
    h.device.set_pin(h.config.pin_estop, false);
    h.controller.handle_estop_change().unwrap();
    assert_eq!(h.controller.mode(), Mode::Estop);

    h.controller.handle_badge_scan("A1").unwrap();

    assert_eq!(h.controller.mode(), Mode::Estop, "login from estop must be dropped");
    assert_eq!(h.auth.login_count("A1"), 0, "dropped before any server call");
}

// ── Termination ──────────────────────────────────────────────

#[test]
fn terminate_performs_a_clean_shutdown() {
    let h = Harness::build_default();
    h.auth.grant("A1", "Alice", 3600, 3600, Extensions::Remaining(2));
    h.controller.idle().unwrap();
    h.controller.handle_badge_scan("A1").unwrap();

    h.controller.terminate().unwrap();
    settle();

    assert_eq!(h.controller.mode(), Mode::Terminated);
    assert_eq!(h.status(), "terminated\n");
    assert!(!h.relay());
    assert!(h.controller.user_snapshot().is_none());
    assert_eq!(h.auth.logout_count("A1"), 1);
}

// ── Power interlock under load ───────────────────────────────

#[test]
fn logout_waits_for_current_to_clear_before_cutting_power() {
    let h = Harness::build(ControllerConfig {
        max_power_down_timeout: Some(1),
        ..ControllerConfig::default()
    });
    h.auth.grant("A1", "Alice", 3600, 3600, Extensions::Remaining(2));
    h.controller.idle().unwrap();
    h.controller.handle_badge_scan("A1").unwrap();

    // The machine keeps drawing current; the timeout must still bound
    // the wait and the relay must end up low.
    h.device.set_pin(h.config.pin_current_sense, true);
    h.controller.handle_logout_pressed().unwrap();

    assert_eq!(h.controller.mode(), Mode::Idle);
    assert!(!h.relay());
    assert!(h.device.saw_screen("WAITING FOR ... / MACHINE TO STOP"));
    assert!(h.device.saw_screen("DISABLING / POWER..."));
}

// ── Event loop binding ───────────────────────────────────────

#[test]
fn runner_drives_a_full_session_from_scripted_events() {
    use toolgate::app::ports::InputEvent;

    let h = Harness::build_default();
    h.auth.grant("A1", "Alice", 3600, 3600, Extensions::Remaining(2));

    let controller = std::sync::Arc::clone(&h.controller);
    let loop_thread = thread::spawn(move || toolgate::runner::run(&controller));

    h.device.push_event(InputEvent::BadgeScanned("A1".into()));
    // Wait out the login screens, then confirm the session.
    thread::sleep(Duration::from_secs(4));
    assert_eq!(h.controller.mode(), Mode::InUse);

    h.controller.terminate().unwrap();
    // Any queued event unblocks the loop so it can observe termination.
    h.device.push_event(InputEvent::LogoutPressed);

    loop_thread.join().unwrap().unwrap();
    assert_eq!(h.controller.mode(), Mode::Terminated);
    assert_eq!(h.status(), "terminated\n");
}
