//! Training-mode protocol: the long-hold entry gesture, trainer
//! activation, student enrollment, and deferred e-stop/bypass exits.
//!
//! The entry gesture polls the real button input for two seconds, so
//! every test that enters training pays that wait.

use std::thread;
use std::time::Duration;

use crate::mock_hw::{AuthCall, Harness};
use toolgate::config::ControllerConfig;
use toolgate::fsm::Mode;
use toolgate::fsm::context::Extensions;

/// Hold the logout button and press it: the long-hold gesture.
fn enter_training(h: &Harness) {
    h.device.set_pin(h.config.pin_logout, true);
    h.controller.handle_logout_pressed().unwrap();
    h.device.set_pin(h.config.pin_logout, false);
}

#[test]
fn long_hold_enters_training_mode() {
    let h = Harness::build_default();
    h.controller.idle().unwrap();

    enter_training(&h);

    assert_eq!(h.controller.mode(), Mode::InTraining);
    assert_eq!(h.status(), "in_training\n");
    assert!(!h.relay());
    assert_eq!(h.device.last_led(), Some((true, false, true)), "magenta LED in training");
    assert!(h.device.saw_screen("TRAINING MODE / ACTIVATED..."));
    assert!(h.device.saw_screen("SCAN / TRAINER BADGE..."));
}

#[test]
fn brief_press_stays_in_idle() {
    let h = Harness::build_default();
    h.controller.idle().unwrap();

    // Button already released when the handler runs: the hold guard
    // fails and the logout trigger has nowhere to go from idle.
    h.controller.handle_logout_pressed().unwrap();

    assert_eq!(h.controller.mode(), Mode::Idle);
    assert_eq!(h.status(), "idle\n");
}

#[test]
fn disabled_training_mode_never_activates() {
    let h = Harness::build(ControllerConfig {
        disable_training_mode: true,
        ..ControllerConfig::default()
    });
    h.controller.idle().unwrap();

    enter_training(&h);

    assert_eq!(h.controller.mode(), Mode::Idle);
}

#[test]
fn trainer_activates_then_registers_students() {
    let h = Harness::build_default();
    h.auth.grant("T1", "Tessa", 3600, 3600, Extensions::Unbounded);
    h.controller.idle().unwrap();
    enter_training(&h);

    // First scan authenticates the trainer.
    h.controller.handle_badge_scan("T1").unwrap();
    assert!(h.device.saw_screen("TRAINER / ACCEPTED..."));
    assert!(h.device.saw_screen("SCAN / STUDENT BADGE..."));
    let trainer = h.controller.user_snapshot().expect("trainer context");
    assert_eq!(trainer.badge_code, "T1");

    // A different badge is enrolled as a student.
    h.controller.handle_badge_scan("S9").unwrap();
    assert!(h.auth.calls().contains(&AuthCall::Register {
        trainer_id: "uid_T1".into(),
        trainer_badge: "T1".into(),
        student_badge: "S9".into(),
    }));
    assert!(h.device.saw_screen("STUDENT / REGISTERED..."));

    // The trainer re-scanning their own badge is not an enrollment.
    let registrations_before = h.auth.calls().len();
    h.controller.handle_badge_scan("T1").unwrap();
    assert_eq!(h.auth.calls().len(), registrations_before);

    // A brief button press exits training and closes the trainer's
    // server session.
    h.controller.handle_logout_pressed().unwrap();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(h.controller.mode(), Mode::Idle);
    assert_eq!(h.auth.logout_count("T1"), 1);
}

#[test]
fn rejected_trainer_is_reprompted() {
    let h = Harness::build_default();
    h.controller.idle().unwrap();
    enter_training(&h);

    h.controller.handle_badge_scan("X0").unwrap();

    assert_eq!(h.controller.mode(), Mode::InTraining);
    assert!(h.controller.user_snapshot().is_none());
    assert!(h.device.saw_screen("ACCESS DENIED / TAKE THE CLASS"));
    // The prompt returns to the trainer scan, not the student scan.
    assert_eq!(
        h.device.lcd_history().last().map(String::clone),
        Some("SCAN / TRAINER BADGE...".to_owned())
    );
}

#[test]
fn rejected_student_shows_invalid_user_and_reprompts() {
    let h = Harness::build_default();
    h.auth.grant("T1", "Tessa", 3600, 3600, Extensions::Unbounded);
    h.auth.set_reject_registrations(true);
    h.controller.idle().unwrap();
    enter_training(&h);
    h.controller.handle_badge_scan("T1").unwrap();

    h.controller.handle_badge_scan("S9").unwrap();

    assert_eq!(h.controller.mode(), Mode::InTraining);
    assert!(h.device.saw_screen("REGISTRATION / FAILED..."));
    assert!(h.device.saw_screen("INVALID / USER..."));
    assert_eq!(
        h.device.lcd_history().last().map(String::clone),
        Some("SCAN / STUDENT BADGE...".to_owned())
    );
    // The trainer context survives a failed enrollment.
    assert!(h.controller.user_snapshot().is_some());
}

#[test]
fn estop_is_deferred_until_training_exits() {
    let h = Harness::build_default();
    h.controller.idle().unwrap();
    enter_training(&h);

    // The e-stop latches while training runs: the mode must not move.
    h.device.set_pin(h.config.pin_estop, false);
    h.controller.handle_estop_change().unwrap();
    assert_eq!(h.controller.mode(), Mode::InTraining);

    // Exiting training with the e-stop still latched lands in estop,
    // not idle.
    h.controller.handle_logout_pressed().unwrap();
    assert_eq!(h.controller.mode(), Mode::Estop);
    assert_eq!(h.status(), "estop\n");
}

#[test]
fn bypass_is_deferred_until_training_exits() {
    let h = Harness::build_default();
    h.controller.idle().unwrap();
    enter_training(&h);

    h.device.set_pin(h.config.pin_bypass_detect, true);
    h.controller.handle_bypass_change().unwrap();
    assert_eq!(h.controller.mode(), Mode::InTraining);

    h.controller.handle_logout_pressed().unwrap();
    assert_eq!(h.controller.mode(), Mode::Bypassed);
    assert_eq!(h.status(), "bypassed\n");
}
