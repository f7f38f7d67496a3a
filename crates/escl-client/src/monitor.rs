//! 状态监控
//!
//! 一次 [`poll`] 在同一个会话 guard 内依次查询：
//!
//! | 字段 | 指令 | 换算 |
//! |------|------|------|
//! | 位置 | `IP` | 原值（步） |
//! | 实际速度 | `IV0` | 原值（RPM） |
//! | 目标速度 | `IV1` | 原值（RPM） |
//! | 状态码 | `SC` | 十六进制位域 |
//! | 报警码 | `AL` | 十六进制位域 |
//! | 温度 | `IT` | raw / 10（°C） |
//! | 母线电压 | `IU` | raw / 10（V） |
//! | 电流 | `IC` | raw / 100（A） |
//!
//! `IV0` 与 `IV1` 的应答键同为 `IV`，字段按发送的助记符归属，不看应答内容。
//! 任一字段失败则整次 poll 失败，不返回部分快照。

use escl_driver::{ControllerSession, DriverError, SessionGuard};
use escl_protocol::{AlarmFlags, KeyedValue, Mnemonic, StatusFlags};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

/// 到速判定的默认容差（RPM）
pub const DEFAULT_SPEED_TOLERANCE: i64 = 1;

/// 状态查询错误
#[derive(Error, Debug)]
pub enum PollError {
    /// 某个字段无法获取（重试耗尽或应答无法解析）
    #[error("Could not read {field} ({mnemonic}): {source}")]
    PartialStatus {
        field: &'static str,
        mnemonic: Mnemonic,
        #[source]
        source: DriverError,
    },

    /// 会话不可用
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// 等待超时
    #[error("Condition not reached within {0:?}")]
    WaitTimeout(Duration),
}

/// 状态快照
///
/// 每次 poll 重新构造，不复用上一次的结果。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusSnapshot {
    /// 编码器/指令位置（步）
    pub position: i64,
    /// 实际速度（RPM，带符号）
    pub actual_rpm: i64,
    /// 目标速度（RPM，带符号）
    pub target_rpm: i64,
    pub status: StatusFlags,
    pub alarms: AlarmFlags,
    /// 驱动器温度（°C）
    pub temperature_c: f64,
    /// 母线电压（V）
    pub bus_voltage: f64,
    /// 电机电流（A）
    pub current: f64,
}

/// 从快照推断的运动阶段（只用于观察，不进入 `MotionState`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObservedPhase {
    /// 实际与目标速度均为 0
    Stationary,
    /// 正在趋近目标速度
    Converging,
    /// 实际速度在容差内等于目标速度
    AtSpeed,
    /// 点动已停止，仍在减速
    Decelerating,
}

impl std::fmt::Display for ObservedPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ObservedPhase::Stationary => "stationary",
            ObservedPhase::Converging => "converging",
            ObservedPhase::AtSpeed => "at speed",
            ObservedPhase::Decelerating => "decelerating",
        };
        f.write_str(text)
    }
}

impl StatusSnapshot {
    pub fn is_enabled(&self) -> bool {
        self.status.contains(StatusFlags::ENABLED)
    }

    pub fn has_alarms(&self) -> bool {
        !self.alarms.is_empty() || self.status.contains(StatusFlags::ALARM)
    }

    /// 按默认容差推断运动阶段
    pub fn phase(&self) -> ObservedPhase {
        self.phase_within(DEFAULT_SPEED_TOLERANCE)
    }

    pub fn phase_within(&self, tolerance: i64) -> ObservedPhase {
        if self.actual_rpm == 0 && self.target_rpm == 0 {
            return ObservedPhase::Stationary;
        }
        let stopping = self.status.contains(StatusFlags::STOPPING)
            || (self.target_rpm == 0 && !self.status.contains(StatusFlags::JOGGING));
        if stopping {
            ObservedPhase::Decelerating
        } else if (self.actual_rpm - self.target_rpm).abs() <= tolerance {
            ObservedPhase::AtSpeed
        } else {
            ObservedPhase::Converging
        }
    }
}

impl std::fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Position:      {} steps", self.position)?;
        writeln!(
            f,
            "Velocity:      {} rpm (target {} rpm, {})",
            self.actual_rpm,
            self.target_rpm,
            self.phase()
        )?;
        writeln!(f, "Status:        {}", self.status)?;
        writeln!(f, "Alarms:        {}", self.alarms)?;
        writeln!(f, "Temperature:   {:.1} °C", self.temperature_c)?;
        writeln!(f, "Bus voltage:   {:.1} V", self.bus_voltage)?;
        write!(f, "Current:       {:.2} A", self.current)
    }
}

/// 查询一次完整状态
pub fn poll(session: &ControllerSession) -> Result<StatusSnapshot, PollError> {
    let mut guard = session.lock()?;
    poll_with(&mut guard)
}

/// 在已持有的 guard 内查询（供需要与其他指令组成原子序列的调用方使用）
pub fn poll_with(guard: &mut SessionGuard<'_>) -> Result<StatusSnapshot, PollError> {
    let snapshot = StatusSnapshot {
        position: read(guard, "position", Mnemonic::Position, KeyedValue::as_i64)?,
        actual_rpm: read(guard, "actual velocity", Mnemonic::ActualVelocity, KeyedValue::as_i64)?,
        target_rpm: read(guard, "target velocity", Mnemonic::TargetVelocity, KeyedValue::as_i64)?,
        status: StatusFlags::from_bits_retain(read(
            guard,
            "status code",
            Mnemonic::StatusCode,
            KeyedValue::as_hex_u16,
        )?),
        alarms: AlarmFlags::from_bits_retain(read(
            guard,
            "alarm code",
            Mnemonic::AlarmCode,
            KeyedValue::as_hex_u16,
        )?),
        temperature_c: read(guard, "temperature", Mnemonic::Temperature, KeyedValue::as_i64)?
            as f64
            / 10.0,
        bus_voltage: read(guard, "bus voltage", Mnemonic::BusVoltage, KeyedValue::as_i64)? as f64
            / 10.0,
        current: read(guard, "current", Mnemonic::Current, KeyedValue::as_i64)? as f64 / 100.0,
    };
    debug!(
        "poll: {} rpm (target {}), status {:04X}, alarms {:04X}",
        snapshot.actual_rpm,
        snapshot.target_rpm,
        snapshot.status.bits(),
        snapshot.alarms.bits()
    );
    Ok(snapshot)
}

/// 反复 poll 直到条件满足或超时
///
/// 两次 poll 之间睡眠 `interval`；返回满足条件的快照。
pub fn wait_until<F>(
    session: &ControllerSession,
    timeout: Duration,
    interval: Duration,
    mut condition: F,
) -> Result<StatusSnapshot, PollError>
where
    F: FnMut(&StatusSnapshot) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let snapshot = poll(session)?;
        if condition(&snapshot) {
            return Ok(snapshot);
        }
        if Instant::now() >= deadline {
            return Err(PollError::WaitTimeout(timeout));
        }
        trace!("waiting, phase {}", snapshot.phase());
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }
}

fn read<T>(
    guard: &mut SessionGuard<'_>,
    field: &'static str,
    mnemonic: Mnemonic,
    parse: impl FnOnce(&KeyedValue) -> Result<T, escl_protocol::ProtocolError>,
) -> Result<T, PollError> {
    guard
        .query(mnemonic)
        .and_then(|value| parse(&value).map_err(DriverError::from))
        .map_err(|source| PollError::PartialStatus {
            field,
            mnemonic,
            source,
        })
}
