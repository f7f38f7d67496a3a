//! 初始化流程
//!
//! 固定顺序的配置指令（数据格式与控制模式必须在任何运动指令之前生效）：
//!
//! ```text
//! AL? → MD → IF D → CC → CI → CD → EG → AC → DE → AM → JA → JL → JS → VM → CM10 → ME → AL?
//! ```
//!
//! - 开始前读取报警码，有报警则拒绝初始化；使能后再读一次，有报警则失败
//! - `VM` 在多数固件上不受支持：分类为 `PermanentUnsupported` 时记录并继续
//! - 参数精度被拒绝时按固件可接受位数重新取整，重发一次
//! - 其他任何失败立即中止，错误中包含步骤序号、指令与原始应答

use crate::config::MotorConfig;
use crate::recovery::execute_rerounding;
use escl_driver::{AppliedConfig, ControllerSession, DriverError, ErrorClass, SessionGuard};
use escl_protocol::{
    AlarmFlags, Argument, Command, ControlMode, DataFormat, Mnemonic, ProtocolError,
};
use thiserror::Error;
use tracing::{error, info, warn};

/// 初始化错误
#[derive(Error, Debug)]
pub enum InitError {
    /// 配置值无法编码为指令
    #[error("Invalid motor configuration: {0}")]
    InvalidConfig(#[from] ProtocolError),

    /// 驱动器存在报警
    #[error("Cannot initialize, drive has active alarms: {0}")]
    AlarmsPresent(AlarmFlags),

    /// 使能后驱动器报警
    #[error("Drive raised alarms after enabling: {0}")]
    AlarmsAfterEnable(AlarmFlags),

    /// 某一步失败，序列中止
    #[error("Initialization step {step} ({description}) failed, reply {reply}: {source}")]
    StepFailed {
        /// 从 1 开始的步骤序号（0 为开始前的报警检查）
        step: usize,
        command: Command,
        description: &'static str,
        /// 原始应答（超时为 `<timeout>`）
        reply: String,
        #[source]
        source: DriverError,
    },

    /// 会话不可用
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// 生成初始化指令序列
///
/// 所有参数在发送前完成校验，序列中任何一条无法编码都不会发送任何指令。
pub fn init_sequence(config: &MotorConfig) -> Result<Vec<Command>, ProtocolError> {
    config.validate()?;
    Ok(vec![
        Command::new(Mnemonic::MotorDisable)?,
        Command::data_format(DataFormat::Decimal),
        Command::with_value(Mnemonic::RunCurrent, config.run_current)?,
        Command::with_value(Mnemonic::IdleCurrent, config.idle_current)?,
        Command::with_value(Mnemonic::IdleCurrentDelay, config.idle_delay)?,
        Command::with_value(Mnemonic::Resolution, config.resolution as f64)?,
        Command::with_value(Mnemonic::Acceleration, config.acceleration)?,
        Command::with_value(Mnemonic::Deceleration, config.deceleration)?,
        Command::with_value(Mnemonic::MaxAcceleration, config.max_acceleration)?,
        Command::with_value(Mnemonic::JogAcceleration, config.jog_acceleration)?,
        Command::with_value(Mnemonic::JogDeceleration, config.jog_deceleration)?,
        Command::with_value(Mnemonic::JogSpeed, config.jog_speed)?,
        Command::with_value(Mnemonic::MaxVelocity, config.max_velocity)?,
        Command::control_mode(ControlMode::CommandedVelocity),
        Command::new(Mnemonic::MotorEnable)?,
    ])
}

/// 执行初始化
///
/// 整个序列在同一个会话 guard 内完成。成功后将 [`AppliedConfig`] 写入会话并返回。
pub fn initialize(
    session: &ControllerSession,
    config: &MotorConfig,
) -> Result<AppliedConfig, InitError> {
    let sequence = init_sequence(config)?;
    let mut applied = planned(config);
    let mut guard = session.lock()?;

    info!("Initializing drive ({} configuration commands)", sequence.len());

    let alarms = read_alarms(&mut guard, 0)?;
    if !alarms.is_empty() {
        error!("Drive reports alarms before initialization: {}", alarms);
        return Err(InitError::AlarmsPresent(alarms));
    }

    for (index, command) in sequence.iter().enumerate() {
        let step = index + 1;
        let description = command.mnemonic().description();
        match execute_rerounding(&mut guard, command) {
            Ok((_, sent)) => {
                info!("  [{}/{}] {} ({})", step, sequence.len(), description, sent);
                record(&mut applied, &sent);
            },
            Err(e) if e.class() == Some(ErrorClass::PermanentUnsupported) => {
                warn!(
                    "  [{}/{}] {} skipped: {} is not supported by this firmware",
                    step,
                    sequence.len(),
                    description,
                    command
                );
                applied.skipped.push(command.mnemonic());
                if command.mnemonic() == Mnemonic::MaxVelocity {
                    applied.max_velocity = None;
                }
            },
            Err(e) => {
                error!("  [{}/{}] {} failed: {}", step, sequence.len(), description, e);
                return Err(step_failed(step, *command, e));
            },
        }
    }

    let alarms = read_alarms(&mut guard, sequence.len() + 1)?;
    if !alarms.is_empty() {
        error!("Drive reports alarms after enabling: {}", alarms);
        return Err(InitError::AlarmsAfterEnable(alarms));
    }

    drop(guard);
    session.record_applied(applied.clone());
    info!(
        "Drive initialized ({} skipped: {:?})",
        applied.skipped.len(),
        applied.skipped
    );
    Ok(applied)
}

fn read_alarms(guard: &mut SessionGuard<'_>, step: usize) -> Result<AlarmFlags, InitError> {
    let query = Command::new(Mnemonic::AlarmCode)?;
    guard
        .query(Mnemonic::AlarmCode)
        .and_then(|value| value.as_hex_u16().map_err(DriverError::from))
        .map(AlarmFlags::from_bits_retain)
        .map_err(|source| step_failed(step, query, source))
}

fn step_failed(step: usize, command: Command, source: DriverError) -> InitError {
    let reply = source
        .as_command_error()
        .map(|e| e.raw_reply().to_string())
        .unwrap_or_else(|| "<none>".to_string());
    InitError::StepFailed {
        step,
        command,
        description: command.mnemonic().description(),
        reply,
        source,
    }
}

fn planned(config: &MotorConfig) -> AppliedConfig {
    AppliedConfig {
        run_current: config.run_current,
        idle_current: config.idle_current,
        idle_delay: config.idle_delay,
        resolution: config.resolution,
        acceleration: config.acceleration,
        deceleration: config.deceleration,
        max_acceleration: config.max_acceleration,
        max_velocity: Some(config.max_velocity),
        jog_acceleration: config.jog_acceleration,
        jog_deceleration: config.jog_deceleration,
        jog_speed: config.jog_speed,
        control_mode: ControlMode::CommandedVelocity,
        skipped: Vec::new(),
    }
}

/// 用实际发送的值（可能已重新取整）更新记录
fn record(applied: &mut AppliedConfig, sent: &Command) {
    let Some(Argument::Decimal(value)) = sent.argument() else {
        return;
    };
    match sent.mnemonic() {
        Mnemonic::RunCurrent => applied.run_current = value,
        Mnemonic::IdleCurrent => applied.idle_current = value,
        Mnemonic::IdleCurrentDelay => applied.idle_delay = value,
        Mnemonic::Acceleration => applied.acceleration = value,
        Mnemonic::Deceleration => applied.deceleration = value,
        Mnemonic::MaxAcceleration => applied.max_acceleration = value,
        Mnemonic::MaxVelocity => applied.max_velocity = Some(value),
        Mnemonic::JogAcceleration => applied.jog_acceleration = value,
        Mnemonic::JogDeceleration => applied.jog_deceleration = value,
        Mnemonic::JogSpeed => applied.jog_speed = value,
        _ => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escl_driver::{FirmwareProfile, SessionOptions};
    use escl_transport::mock::{ScriptedTransport, SimulatedDrive};

    const EXPECTED_WIRE: [&str; 15] = [
        "MD", "IF D", "CC3", "CI1.5", "CD1", "EG25600", "AC20", "DE20", "AM50", "JA10", "JL10",
        "JS1", "VM10", "CM10", "ME",
    ];

    #[test]
    fn test_sequence_order() {
        let wire: Vec<String> = init_sequence(&MotorConfig::default())
            .unwrap()
            .iter()
            .map(Command::encode)
            .collect();
        assert_eq!(wire, EXPECTED_WIRE);
    }

    #[test]
    fn test_invalid_config_sends_nothing() {
        let drive = SimulatedDrive::new();
        let session = ControllerSession::with_transport(drive.clone());
        let config = MotorConfig {
            run_current: 9.0,
            idle_current: 1.0,
            ..MotorConfig::default()
        };
        assert!(matches!(
            initialize(&session, &config),
            Err(InitError::InvalidConfig(_))
        ));
        assert!(drive.sent().is_empty());
    }

    #[test]
    fn test_initialize_skips_max_velocity() {
        let drive = SimulatedDrive::new();
        let session = ControllerSession::with_transport(drive.clone());

        let applied = initialize(&session, &MotorConfig::default()).unwrap();
        assert_eq!(applied.skipped, vec![Mnemonic::MaxVelocity]);
        assert_eq!(applied.max_velocity, None);
        assert!(applied.velocity_mode());
        assert_eq!(session.applied(), Some(applied));

        let mut expected = vec!["AL"];
        expected.extend(EXPECTED_WIRE);
        expected.push("AL");
        assert_eq!(drive.sent(), expected);
        assert!(drive.is_enabled());
        assert_eq!(drive.control_mode(), 10);
    }

    #[test]
    fn test_initialize_with_supported_max_velocity() {
        let drive = SimulatedDrive::new();
        drive.set_unsupported("VM", false);
        let profile = FirmwareProfile::default().with_supported(Mnemonic::MaxVelocity);
        let session = ControllerSession::new(drive, profile, SessionOptions::default());

        let applied = initialize(&session, &MotorConfig::default()).unwrap();
        assert!(applied.skipped.is_empty());
        assert_eq!(applied.max_velocity, Some(10.0));
    }

    #[test]
    fn test_refuses_with_alarms() {
        let drive = SimulatedDrive::new();
        drive.set_alarm(0x0008);
        let session = ControllerSession::with_transport(drive.clone());
        match initialize(&session, &MotorConfig::default()) {
            Err(InitError::AlarmsPresent(flags)) => {
                assert!(flags.contains(AlarmFlags::OVER_TEMPERATURE))
            },
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(drive.sent(), vec!["AL"]);
        assert!(session.applied().is_none());
    }

    #[test]
    fn test_alarm_after_enable_fails() {
        let drive = SimulatedDrive::new();
        drive.set_alarm(0x0008);
        drive.inject("AL", Some("AL=0000"), 1);
        let session = ControllerSession::with_transport(drive.clone());

        match initialize(&session, &MotorConfig::default()) {
            Err(InitError::AlarmsAfterEnable(flags)) => {
                assert!(flags.contains(AlarmFlags::OVER_TEMPERATURE))
            },
            other => panic!("unexpected: {:?}", other),
        }
        let sent = drive.sent();
        assert_eq!(sent.len(), EXPECTED_WIRE.len() + 2);
        assert_eq!(sent.last().map(String::as_str), Some("AL"));
        assert!(session.applied().is_none());
    }

    #[test]
    fn test_unknown_error_aborts_and_names_step() {
        let drive = SimulatedDrive::new();
        drive.inject("EG", Some("?5"), 1);
        let session = ControllerSession::with_transport(drive.clone());

        let err = initialize(&session, &MotorConfig::default()).unwrap_err();
        match &err {
            InitError::StepFailed {
                step,
                command,
                reply,
                ..
            } => {
                assert_eq!(*step, 6);
                assert_eq!(command.mnemonic(), Mnemonic::Resolution);
                assert_eq!(reply, "?5");
            },
            other => panic!("unexpected: {:?}", other),
        }
        assert!(err.to_string().contains("?5"));
        assert_eq!(drive.sent().last().map(String::as_str), Some("EG25600"));
        assert!(session.applied().is_none());
    }

    #[test]
    fn test_precision_rejection_rerounded_once() {
        let drive = SimulatedDrive::new();
        drive.set_precision_limit("CC", 1);
        let profile = FirmwareProfile::default().with_decimal_places(Mnemonic::RunCurrent, 1);
        let session = ControllerSession::new(drive.clone(), profile, SessionOptions::default());
        let config = MotorConfig {
            run_current: 2.25,
            idle_current: 1.0,
            ..MotorConfig::default()
        };

        let applied = initialize(&session, &config).unwrap();
        assert_eq!(applied.run_current, 2.3);
        let sent = drive.sent();
        let cc: Vec<_> = sent.iter().filter(|c| c.starts_with("CC")).collect();
        assert_eq!(cc, vec!["CC2.25", "CC2.3"]);
    }

    #[test]
    fn test_timeout_on_setter_is_retried() {
        let drive = SimulatedDrive::new();
        drive.inject("MD", None, 1);
        let session = ControllerSession::with_transport(drive.clone());
        initialize(&session, &MotorConfig::default()).unwrap();
        assert_eq!(drive.sent().iter().filter(|c| *c == "MD").count(), 2);
    }

    #[test]
    fn test_scripted_alarm_query_failure_is_step_zero() {
        let script = ScriptedTransport::new().reply("?9");
        let session = ControllerSession::with_transport(script);
        match initialize(&session, &MotorConfig::default()) {
            Err(InitError::StepFailed { step, reply, .. }) => {
                assert_eq!(step, 0);
                assert_eq!(reply, "?9");
            },
            other => panic!("unexpected: {:?}", other),
        }
    }
}
