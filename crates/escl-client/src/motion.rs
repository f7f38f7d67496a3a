//! 点动运动控制
//!
//! # 状态机
//!
//! ```text
//!            enable()                 spin(rpm)
//! Disabled ───────────> Idle ─────────────────────> Jogging(dir, rpm)
//!    ^                   ^  <───────────────────────   │   ^
//!    │                   │    stop() / stop_immediate() │   │ spin(rpm) / change_speed(rpm)
//!    └──── disable() ────┴──────────────────────────────┘───┘
//! ```
//!
//! 状态只表示逻辑状态：`stop()` 收到确认即回到 `Idle`，物理减速仍在继续，
//! 只能通过状态查询观察（见 [`ObservedPhase`](crate::monitor::ObservedPhase)）。
//!
//! # 单位
//!
//! 调用方使用带符号 RPM；线上使用 rev/s，`round(|rpm| / 60, 3)`。
//! 符号决定方向：非负为顺时针（`DI1`），负为逆时针（`DI-1`）。

use crate::recovery::execute_rerounding;
use escl_driver::{ControllerSession, DriverError, SessionGuard};
use escl_protocol::{Command, Direction, Mnemonic, ProtocolError, Rpm, StatusFlags};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// 运动状态
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MotionState {
    /// 电机失能
    Disabled,
    /// 使能、静止（逻辑上）
    Idle,
    /// 点动中
    Jogging { direction: Direction, rpm: Rpm },
}

impl MotionState {
    pub fn is_jogging(&self) -> bool {
        matches!(self, MotionState::Jogging { .. })
    }

    /// 目标转速（非点动为 0）
    pub fn target_rpm(&self) -> Rpm {
        match self {
            MotionState::Jogging { rpm, .. } => *rpm,
            _ => Rpm::ZERO,
        }
    }
}

impl std::fmt::Display for MotionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MotionState::Disabled => write!(f, "Disabled"),
            MotionState::Idle => write!(f, "Idle"),
            MotionState::Jogging { direction, rpm } => {
                write!(f, "Jogging({}, {} rpm)", direction, rpm.0)
            },
        }
    }
}

/// 运动控制错误
#[derive(Error, Debug)]
pub enum MotionError {
    /// 当前状态不允许该操作
    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: MotionState,
    },

    /// 尚未初始化（数据格式与控制模式未设置）
    #[error("Drive is not initialized, run initialize() before motion commands")]
    NotInitialized,

    /// 超过配置的转速上限
    #[error("Requested {requested} exceeds limit of {limit} rpm")]
    SpeedLimit { requested: Rpm, limit: f64 },

    /// 转速无法编码（范围、精度、非有限值）
    #[error("Invalid speed: {0}")]
    InvalidSpeed(#[from] ProtocolError),

    /// 序列中某一步失败
    #[error("{operation} failed at step {step} ({command}): {source}")]
    StepFailed {
        operation: &'static str,
        /// 从 1 开始
        step: usize,
        command: Command,
        #[source]
        source: DriverError,
    },

    /// 会话不可用
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// 运动控制器
///
/// 持有会话的共享引用；每个操作在一个会话 guard 内完成整个指令序列。
/// 状态只在序列成功（或停止指令被确认）后更新。
pub struct MotionController {
    session: Arc<ControllerSession>,
    state: Mutex<MotionState>,
    max_rpm: Option<f64>,
}

impl MotionController {
    /// 创建控制器
    ///
    /// 会话已完成初始化时（初始化以 `ME` 结束）初始状态为 `Idle`，否则为 `Disabled`。
    /// 这只反映本会话是否执行过初始化；接管外部配置过的驱动器时先调用 [`reconcile`](Self::reconcile)。
    pub fn new(session: Arc<ControllerSession>) -> Self {
        let state = if session.applied().is_some() {
            MotionState::Idle
        } else {
            MotionState::Disabled
        };
        Self {
            session,
            state: Mutex::new(state),
            max_rpm: None,
        }
    }

    /// 设置转速上限（RPM，按绝对值检查）
    pub fn with_max_rpm(mut self, limit: f64) -> Self {
        self.max_rpm = Some(limit.abs());
        self
    }

    pub fn state(&self) -> MotionState {
        *self.state.lock()
    }

    pub fn session(&self) -> &Arc<ControllerSession> {
        &self.session
    }

    /// 以指定转速点动
    ///
    /// 允许从 `Idle` 或 `Jogging` 调用。发送：
    /// `SJ → JA → JL → JS|rps| → DI±1 → CJ`
    ///
    /// 任一步失败则中止并返回失败步骤。`SJ` 已被确认后的失败使状态变为 `Idle`
    /// （停止已生效，不能再视为点动中）。
    pub fn spin(&self, rpm: Rpm) -> Result<MotionState, MotionError> {
        let mut state = self.state.lock();
        if *state == MotionState::Disabled {
            return Err(MotionError::InvalidState {
                operation: "spin",
                state: *state,
            });
        }
        self.check_limit(rpm)?;
        let applied = self.session.applied().ok_or(MotionError::NotInitialized)?;
        if !applied.velocity_mode() {
            return Err(MotionError::NotInitialized);
        }

        let direction = Direction::from_rpm(rpm);
        let sequence = [
            Command::new(Mnemonic::StopJog)?,
            Command::with_value(Mnemonic::JogAcceleration, applied.jog_acceleration)?,
            Command::with_value(Mnemonic::JogDeceleration, applied.jog_deceleration)?,
            Command::jog_speed(rpm.to_rps())?,
            Command::direction(direction),
            Command::new(Mnemonic::CommenceJog)?,
        ];

        let mut guard = self.session.lock()?;
        for (index, command) in sequence.iter().enumerate() {
            if let Err(source) = execute_rerounding(&mut guard, command) {
                if index > 0 {
                    *state = MotionState::Idle;
                }
                warn!("spin({}) aborted at {}: {}", rpm.0, command, source);
                return Err(MotionError::StepFailed {
                    operation: "spin",
                    step: index + 1,
                    command: *command,
                    source,
                });
            }
        }

        *state = MotionState::Jogging { direction, rpm };
        info!("Jogging {} at {} rpm ({})", direction, rpm.abs().0, sequence[3]);
        Ok(*state)
    }

    /// 点动中改变转速（`CS`，带符号，负值直接反向，不停止）
    ///
    /// 只在 `Jogging` 状态有效；不等待物理速度收敛。
    pub fn change_speed(&self, rpm: Rpm) -> Result<MotionState, MotionError> {
        let mut state = self.state.lock();
        if !state.is_jogging() {
            return Err(MotionError::InvalidState {
                operation: "change_speed",
                state: *state,
            });
        }
        self.check_limit(rpm)?;
        let command = Command::change_jog_speed(rpm.to_rps())?;

        let mut guard = self.session.lock()?;
        execute_rerounding(&mut guard, &command).map_err(|source| MotionError::StepFailed {
            operation: "change_speed",
            step: 1,
            command,
            source,
        })?;

        *state = MotionState::Jogging {
            direction: Direction::from_rpm(rpm),
            rpm,
        };
        info!("Jog speed changed to {} rpm ({})", rpm.0, command);
        Ok(*state)
    }

    /// 停止点动（`SJ`，按减速度减速）
    ///
    /// 任何状态都可调用；确认后 `Jogging` → `Idle`，`Disabled` 保持不变。
    pub fn stop(&self) -> Result<MotionState, MotionError> {
        self.stop_with(Mnemonic::StopJog, "stop")
    }

    /// 立即停止（`ST`）
    pub fn stop_immediate(&self) -> Result<MotionState, MotionError> {
        self.stop_with(Mnemonic::StopImmediate, "stop_immediate")
    }

    /// 使能电机（`ME`）
    pub fn enable(&self) -> Result<MotionState, MotionError> {
        let mut state = self.state.lock();
        self.single(&mut self.session.lock()?, Mnemonic::MotorEnable, "enable")?;
        if *state == MotionState::Disabled {
            *state = MotionState::Idle;
        }
        info!("Motor enabled");
        Ok(*state)
    }

    /// 失能电机（`MD`）
    pub fn disable(&self) -> Result<MotionState, MotionError> {
        let mut state = self.state.lock();
        self.single(&mut self.session.lock()?, Mnemonic::MotorDisable, "disable")?;
        *state = MotionState::Disabled;
        info!("Motor disabled");
        Ok(*state)
    }

    /// 按驱动器实际状态重建逻辑状态
    ///
    /// 新进程接管一台可能正在点动的驱动器，或超时后状态不确定时使用：
    /// 读取 `SC` 与 `IV1`，未使能为 `Disabled`，点动中为 `Jogging`（目标速度取 `IV1`），
    /// 否则为 `Idle`。
    pub fn reconcile(&self) -> Result<MotionState, MotionError> {
        let mut state = self.state.lock();
        let mut guard = self.session.lock()?;
        let status = guard
            .query(Mnemonic::StatusCode)
            .and_then(|value| value.as_hex_u16().map_err(DriverError::from))
            .map(StatusFlags::from_bits_retain)?;
        let target = guard
            .query(Mnemonic::TargetVelocity)
            .and_then(|value| value.as_i64().map_err(DriverError::from))?;

        *state = if !status.contains(StatusFlags::ENABLED) {
            MotionState::Disabled
        } else if status.contains(StatusFlags::JOGGING) {
            let rpm = Rpm(target as f64);
            MotionState::Jogging {
                direction: Direction::from_rpm(rpm),
                rpm,
            }
        } else {
            MotionState::Idle
        };
        debug!("Reconciled state {} from status {:04X}", *state, status.bits());
        Ok(*state)
    }

    fn stop_with(
        &self,
        mnemonic: Mnemonic,
        operation: &'static str,
    ) -> Result<MotionState, MotionError> {
        let mut state = self.state.lock();
        self.single(&mut self.session.lock()?, mnemonic, operation)?;
        if *state != MotionState::Disabled {
            *state = MotionState::Idle;
        }
        debug!("{} acknowledged, state {}", operation, *state);
        Ok(*state)
    }

    fn single(
        &self,
        guard: &mut SessionGuard<'_>,
        mnemonic: Mnemonic,
        operation: &'static str,
    ) -> Result<(), MotionError> {
        let command = Command::new(mnemonic)?;
        guard
            .execute(&command)
            .map(|_| ())
            .map_err(|source| MotionError::StepFailed {
                operation,
                step: 1,
                command,
                source,
            })
    }

    fn check_limit(&self, rpm: Rpm) -> Result<(), MotionError> {
        if !rpm.is_finite() {
            return Err(MotionError::InvalidSpeed(ProtocolError::InvalidValue {
                field: "rpm",
                value: rpm.0.to_string(),
            }));
        }
        match self.max_rpm {
            Some(limit) if rpm.0.abs() > limit => Err(MotionError::SpeedLimit {
                requested: rpm,
                limit,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MotorConfig, initialize};
    use escl_driver::{ErrorClass, FirmwareProfile, SessionOptions};
    use escl_transport::mock::SimulatedDrive;

    fn ready() -> (SimulatedDrive, MotionController) {
        let drive = SimulatedDrive::new();
        let session = Arc::new(ControllerSession::with_transport(drive.clone()));
        initialize(&session, &MotorConfig::default()).unwrap();
        drive.clear_sent();
        (drive, MotionController::new(session))
    }

    #[test]
    fn test_initial_state() {
        let (_, motion) = ready();
        assert_eq!(motion.state(), MotionState::Idle);

        let session = Arc::new(ControllerSession::with_transport(SimulatedDrive::new()));
        assert_eq!(MotionController::new(session).state(), MotionState::Disabled);
    }

    #[test]
    fn test_spin_sequence() {
        let (drive, motion) = ready();
        let state = motion.spin(Rpm(-100.0)).unwrap();
        assert_eq!(
            state,
            MotionState::Jogging {
                direction: Direction::CounterClockwise,
                rpm: Rpm(-100.0)
            }
        );
        assert_eq!(drive.sent(), vec!["SJ", "JA10", "JL10", "JS1.667", "DI-1", "CJ"]);
        assert!(drive.is_jogging());
    }

    #[test]
    fn test_change_speed_only_sends_cs() {
        let (drive, motion) = ready();
        motion.spin(Rpm(-100.0)).unwrap();
        drive.clear_sent();

        let state = motion.change_speed(Rpm(150.0)).unwrap();
        assert_eq!(drive.sent(), vec!["CS2.5"]);
        assert_eq!(state.target_rpm(), Rpm(150.0));
        assert_eq!(drive.target_rpm(), 150.0);
    }

    #[test]
    fn test_change_speed_requires_jogging() {
        let (drive, motion) = ready();
        assert!(matches!(
            motion.change_speed(Rpm(150.0)),
            Err(MotionError::InvalidState { .. })
        ));
        assert!(drive.sent().is_empty());
    }

    #[test]
    fn test_stop_returns_to_idle() {
        let (drive, motion) = ready();
        motion.spin(Rpm(-100.0)).unwrap();
        drive.clear_sent();
        assert_eq!(motion.stop().unwrap(), MotionState::Idle);
        assert_eq!(drive.sent(), vec!["SJ"]);
    }

    #[test]
    fn test_stop_twice_from_idle() {
        let (drive, motion) = ready();
        assert_eq!(motion.stop().unwrap(), MotionState::Idle);
        assert_eq!(motion.stop().unwrap(), MotionState::Idle);
        assert_eq!(drive.sent(), vec!["SJ", "SJ"]);
    }

    #[test]
    fn test_stop_keeps_disabled() {
        let (_, motion) = ready();
        motion.disable().unwrap();
        assert_eq!(motion.stop().unwrap(), MotionState::Disabled);
        assert!(matches!(
            motion.spin(Rpm(60.0)),
            Err(MotionError::InvalidState { .. })
        ));
        assert_eq!(motion.enable().unwrap(), MotionState::Idle);
    }

    #[test]
    fn test_spin_failure_before_stop_keeps_state() {
        let (drive, motion) = ready();
        motion.spin(Rpm(60.0)).unwrap();
        drive.inject("SJ", Some("?3"), 1);

        let err = motion.spin(Rpm(120.0)).unwrap_err();
        assert!(matches!(err, MotionError::StepFailed { step: 1, .. }));
        assert!(motion.state().is_jogging());
        assert_eq!(motion.state().target_rpm(), Rpm(60.0));
    }

    #[test]
    fn test_spin_failure_after_stop_is_idle() {
        let (drive, motion) = ready();
        motion.spin(Rpm(60.0)).unwrap();
        drive.inject("JS", Some("?3"), 1);

        match motion.spin(Rpm(120.0)).unwrap_err() {
            MotionError::StepFailed {
                step,
                command,
                source,
                ..
            } => {
                assert_eq!(step, 4);
                assert_eq!(command.encode(), "JS2");
                assert_eq!(source.class(), Some(ErrorClass::Unknown));
            },
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(motion.state(), MotionState::Idle);
    }

    #[test]
    fn test_spin_rerounds_rejected_speed_once() {
        let drive = SimulatedDrive::new();
        drive.set_precision_limit("JS", 2);
        let profile = FirmwareProfile::default().with_decimal_places(Mnemonic::JogSpeed, 2);
        let session = Arc::new(ControllerSession::new(
            drive.clone(),
            profile,
            SessionOptions::default(),
        ));
        initialize(&session, &MotorConfig::default()).unwrap();
        drive.clear_sent();

        let motion = MotionController::new(session);
        motion.spin(Rpm(100.0)).unwrap();
        assert_eq!(
            drive.sent(),
            vec!["SJ", "JA10", "JL10", "JS1.667", "JS1.67", "DI1", "CJ"]
        );
    }

    #[test]
    fn test_speed_limit_checked_before_sending() {
        let (drive, motion) = ready();
        let motion = motion.with_max_rpm(600.0);
        assert!(matches!(
            motion.spin(Rpm(601.0)),
            Err(MotionError::SpeedLimit { .. })
        ));
        assert!(matches!(
            motion.spin(Rpm(f64::NAN)),
            Err(MotionError::InvalidSpeed(_))
        ));
        assert!(drive.sent().is_empty());
    }

    #[test]
    fn test_spin_too_slow_rejected_before_sending() {
        let (drive, motion) = ready();
        assert!(matches!(
            motion.spin(Rpm(0.0)),
            Err(MotionError::InvalidSpeed(_))
        ));
        assert!(drive.sent().is_empty());
    }

    #[test]
    fn test_reconcile_from_drive() {
        let (drive, motion) = ready();
        motion.spin(Rpm(-90.0)).unwrap();

        let other = MotionController::new(motion.session().clone());
        assert_eq!(
            other.reconcile().unwrap(),
            MotionState::Jogging {
                direction: Direction::CounterClockwise,
                rpm: Rpm(-90.0)
            }
        );
        other.change_speed(Rpm(-120.0)).unwrap();
        assert_eq!(drive.target_rpm(), -120.0);

        other.disable().unwrap();
        assert_eq!(motion.reconcile().unwrap(), MotionState::Disabled);
    }

    #[test]
    fn test_spin_requires_initialization() {
        let drive = SimulatedDrive::new();
        let session = Arc::new(ControllerSession::with_transport(drive.clone()));
        let motion = MotionController::new(session);
        motion.enable().unwrap();
        assert!(matches!(
            motion.spin(Rpm(60.0)),
            Err(MotionError::NotInitialized)
        ));
    }
}
