//! 端到端场景测试
//!
//! 在模拟驱动器上走完 初始化 → 点动 → 变速 → 停止 → 查询 的完整流程，
//! 检查线上指令序列与状态变化。

use escl_sdk::prelude::*;
use escl_sdk::transport::mock::SimulatedDrive;
use std::sync::Arc;
use std::time::Duration;

fn connected() -> (SimulatedDrive, Arc<ControllerSession>) {
    let drive = SimulatedDrive::new();
    let session = SessionBuilder::new()
        .transport(drive.clone())
        .build()
        .unwrap();
    (drive, Arc::new(session))
}

fn ready() -> (SimulatedDrive, Arc<ControllerSession>, MotionController) {
    let (drive, session) = connected();
    initialize(&session, &MotorConfig::default()).unwrap();
    drive.clear_sent();
    let motion = MotionController::new(session.clone());
    (drive, session, motion)
}

#[test]
fn test_initialize_then_poll_is_enabled_and_still() {
    let (drive, session) = connected();
    let applied = initialize(&session, &MotorConfig::default()).unwrap();
    assert!(applied.was_skipped(Mnemonic::MaxVelocity));

    drive.clear_sent();
    let snapshot = poll(&session).unwrap();
    assert_eq!(snapshot.status, StatusFlags::ENABLED);
    assert_eq!(snapshot.actual_rpm, 0);
    assert_eq!(snapshot.target_rpm, 0);
    assert_eq!(snapshot.phase(), ObservedPhase::Stationary);
}

#[test]
fn test_spin_counter_clockwise() {
    let (drive, _, motion) = ready();
    motion.spin(Rpm(-100.0)).unwrap();
    let sent = drive.sent();
    assert!(sent.contains(&"DI-1".to_string()));
    assert!(sent.contains(&"JS1.667".to_string()));
    assert_eq!(sent.last().map(String::as_str), Some("CJ"));
}

#[test]
fn test_change_speed_reverses_without_stop() {
    let (drive, session, motion) = ready();
    motion.spin(Rpm(-100.0)).unwrap();
    drive.clear_sent();

    motion.change_speed(Rpm(150.0)).unwrap();
    assert_eq!(drive.sent(), vec!["CS2.5"]);

    let snapshot = wait_until(&session, Duration::from_secs(5), Duration::ZERO, |s| {
        s.phase() == ObservedPhase::AtSpeed
    })
    .unwrap();
    assert_eq!(snapshot.actual_rpm, 150);
    assert_eq!(snapshot.target_rpm, 150);
}

#[test]
fn test_stop_sends_only_stop_jog() {
    let (drive, _, motion) = ready();
    motion.spin(Rpm(60.0)).unwrap();
    drive.clear_sent();

    assert_eq!(motion.stop().unwrap(), MotionState::Idle);
    assert_eq!(drive.sent(), vec!["SJ"]);
}

#[test]
fn test_stop_twice_is_idempotent() {
    let (drive, _, motion) = ready();
    motion.spin(Rpm(60.0)).unwrap();
    drive.clear_sent();

    motion.stop().unwrap();
    let state = motion.stop().unwrap();
    assert_eq!(state, MotionState::Idle);
    assert_eq!(drive.sent(), vec!["SJ", "SJ"]);
}

#[test]
fn test_deceleration_visible_only_through_poll() {
    let (_, session, motion) = ready();
    motion.spin(Rpm(600.0)).unwrap();
    wait_until(&session, Duration::from_secs(5), Duration::ZERO, |s| {
        s.phase() == ObservedPhase::AtSpeed
    })
    .unwrap();

    motion.stop().unwrap();
    assert_eq!(motion.state(), MotionState::Idle);
    let snapshot = poll(&session).unwrap();
    assert!(snapshot.actual_rpm > 0);
    assert_eq!(snapshot.phase(), ObservedPhase::Decelerating);
}

#[test]
fn test_spin_refused_while_alarm_present() {
    let (drive, _, motion) = ready();
    drive.set_alarm(0x0008);

    match motion.spin(Rpm(60.0)).unwrap_err() {
        MotionError::StepFailed {
            step,
            command,
            source,
            ..
        } => {
            assert_eq!(step, 6);
            assert_eq!(command.mnemonic(), Mnemonic::CommenceJog);
            assert_eq!(source.class(), Some(ErrorClass::Unknown));
            assert!(source.to_string().contains("?1"));
        },
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(motion.state(), MotionState::Idle);

    let report = check_alarms(motion.session(), true).unwrap();
    assert!(report.is_clear());
    motion.spin(Rpm(60.0)).unwrap();
}

#[test]
fn test_dropped_replies_are_retried() {
    let drive = SimulatedDrive::with_seed(7);
    let session = Arc::new(ControllerSession::with_transport(drive.clone()));
    initialize(&session, &MotorConfig::default()).unwrap();

    drive.inject("CJ", None, 2);
    let motion = MotionController::new(session.clone());
    motion.spin(Rpm(120.0)).unwrap();
    assert_eq!(drive.sent().iter().filter(|c| *c == "CJ").count(), 3);
}

#[test]
fn test_close_stops_and_disables() {
    let (drive, session, motion) = ready();
    motion.spin(Rpm(60.0)).unwrap();
    drive.clear_sent();

    session.close();
    assert_eq!(drive.sent(), vec!["ST", "MD"]);
    assert!(!drive.is_enabled());
    assert!(matches!(
        motion.stop(),
        Err(MotionError::Driver(DriverError::SessionClosed))
    ));
}

#[test]
fn test_drive_info_on_simulated_drive() {
    let (_, session) = connected();
    let info = drive_info(&session).unwrap();
    assert_eq!(info.model.family(), Some("STM23-Q"));
}
