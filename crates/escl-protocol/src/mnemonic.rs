//! 指令助记符表
//!
//! 每个助记符描述：线上编码、参数类型与范围、期望的应答形态。
//! 应答形态是数据驱动的（见 [`Mnemonic::reply_shape`]），
//! 固件差异通过上层的固件配置覆盖，而不是在调用点硬编码。

use crate::ProtocolError;

/// 参数规格
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgSpec {
    /// 无参数
    None,
    /// 固定文本参数（如 `IF D`）
    Text(&'static [&'static str]),
    /// 整数参数（闭区间）
    Integer { min: i64, max: i64 },
    /// 小数参数（闭区间，最多 3 位小数）
    Decimal { min: f64, max: f64 },
}

/// 期望的应答形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ReplyShape {
    /// 仅确认符（`%` 或 `*`）
    Ack,
    /// `KEY=value` 键值应答
    Keyed,
    /// 两者皆可（固件行为不一致的指令）
    AckOrKeyed,
}

/// 加速度类参数范围（rev/s²）
const ACCEL_RANGE: ArgSpec = ArgSpec::Decimal {
    min: 0.167,
    max: 5461.167,
};

/// 指令助记符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum Mnemonic {
    /// MD - 电机失能
    MotorDisable,
    /// ME - 电机使能
    MotorEnable,
    /// IF - 数据格式（D=十进制，H=十六进制）
    DataFormat,
    /// CC - 运行电流（A）
    RunCurrent,
    /// CI - 空闲电流（A）
    IdleCurrent,
    /// CD - 空闲电流延时（s）
    IdleCurrentDelay,
    /// EG - 电子齿轮（steps/rev）
    Resolution,
    /// AC - 加速度（rev/s²）
    Acceleration,
    /// DE - 减速度（rev/s²）
    Deceleration,
    /// AM - 最大加速度（rev/s²）
    MaxAcceleration,
    /// VM - 最大速度（rev/s）
    MaxVelocity,
    /// JA - 点动加速度（rev/s²）
    JogAcceleration,
    /// JL - 点动减速度（rev/s²）
    JogDeceleration,
    /// JS - 点动速度（rev/s）
    JogSpeed,
    /// CS - 运行中修改点动速度（rev/s，带符号）
    ChangeJogSpeed,
    /// DI - 方向（1=CW，-1=CCW）
    Direction,
    /// CM - 控制模式
    ControlMode,
    /// CJ - 开始点动
    CommenceJog,
    /// SJ - 停止点动（按减速度减速）
    StopJog,
    /// ST - 立即停止
    StopImmediate,
    /// AR - 报警复位
    AlarmReset,
    /// IP - 当前位置（steps）
    Position,
    /// IV0 - 实际速度（RPM）
    ActualVelocity,
    /// IV1 - 目标速度（RPM）
    TargetVelocity,
    /// SC - 状态码（4 位十六进制）
    StatusCode,
    /// AL - 报警码（4 位十六进制）
    AlarmCode,
    /// IT - 驱动器温度（0.1 °C）
    Temperature,
    /// IU - 母线电压（0.1 V）
    BusVoltage,
    /// IC - 指令电流（0.01 A）
    Current,
    /// RV - 固件版本
    FirmwareRevision,
    /// MV - 型号与版本
    ModelRevision,
    /// RS - 状态字母
    StatusLetters,
    /// ZE - 网络看门狗使能
    WatchdogEnabled,
    /// ZS - 网络看门狗超时（ms）
    WatchdogDelay,
}

impl Mnemonic {
    /// 全部助记符（按表顺序）
    pub const ALL: [Mnemonic; 34] = [
        Mnemonic::MotorDisable,
        Mnemonic::MotorEnable,
        Mnemonic::DataFormat,
        Mnemonic::RunCurrent,
        Mnemonic::IdleCurrent,
        Mnemonic::IdleCurrentDelay,
        Mnemonic::Resolution,
        Mnemonic::Acceleration,
        Mnemonic::Deceleration,
        Mnemonic::MaxAcceleration,
        Mnemonic::MaxVelocity,
        Mnemonic::JogAcceleration,
        Mnemonic::JogDeceleration,
        Mnemonic::JogSpeed,
        Mnemonic::ChangeJogSpeed,
        Mnemonic::Direction,
        Mnemonic::ControlMode,
        Mnemonic::CommenceJog,
        Mnemonic::StopJog,
        Mnemonic::StopImmediate,
        Mnemonic::AlarmReset,
        Mnemonic::Position,
        Mnemonic::ActualVelocity,
        Mnemonic::TargetVelocity,
        Mnemonic::StatusCode,
        Mnemonic::AlarmCode,
        Mnemonic::Temperature,
        Mnemonic::BusVoltage,
        Mnemonic::Current,
        Mnemonic::FirmwareRevision,
        Mnemonic::ModelRevision,
        Mnemonic::StatusLetters,
        Mnemonic::WatchdogEnabled,
        Mnemonic::WatchdogDelay,
    ];

    /// 线上编码
    pub fn code(self) -> &'static str {
        match self {
            Mnemonic::MotorDisable => "MD",
            Mnemonic::MotorEnable => "ME",
            Mnemonic::DataFormat => "IF",
            Mnemonic::RunCurrent => "CC",
            Mnemonic::IdleCurrent => "CI",
            Mnemonic::IdleCurrentDelay => "CD",
            Mnemonic::Resolution => "EG",
            Mnemonic::Acceleration => "AC",
            Mnemonic::Deceleration => "DE",
            Mnemonic::MaxAcceleration => "AM",
            Mnemonic::MaxVelocity => "VM",
            Mnemonic::JogAcceleration => "JA",
            Mnemonic::JogDeceleration => "JL",
            Mnemonic::JogSpeed => "JS",
            Mnemonic::ChangeJogSpeed => "CS",
            Mnemonic::Direction => "DI",
            Mnemonic::ControlMode => "CM",
            Mnemonic::CommenceJog => "CJ",
            Mnemonic::StopJog => "SJ",
            Mnemonic::StopImmediate => "ST",
            Mnemonic::AlarmReset => "AR",
            Mnemonic::Position => "IP",
            Mnemonic::ActualVelocity => "IV0",
            Mnemonic::TargetVelocity => "IV1",
            Mnemonic::StatusCode => "SC",
            Mnemonic::AlarmCode => "AL",
            Mnemonic::Temperature => "IT",
            Mnemonic::BusVoltage => "IU",
            Mnemonic::Current => "IC",
            Mnemonic::FirmwareRevision => "RV",
            Mnemonic::ModelRevision => "MV",
            Mnemonic::StatusLetters => "RS",
            Mnemonic::WatchdogEnabled => "ZE",
            Mnemonic::WatchdogDelay => "ZS",
        }
    }

    /// 人类可读描述（用于日志和错误信息）
    pub fn description(self) -> &'static str {
        match self {
            Mnemonic::MotorDisable => "disable motor",
            Mnemonic::MotorEnable => "enable motor",
            Mnemonic::DataFormat => "set data format",
            Mnemonic::RunCurrent => "set running current",
            Mnemonic::IdleCurrent => "set idle current",
            Mnemonic::IdleCurrentDelay => "set idle current delay",
            Mnemonic::Resolution => "set resolution",
            Mnemonic::Acceleration => "set acceleration",
            Mnemonic::Deceleration => "set deceleration",
            Mnemonic::MaxAcceleration => "set max acceleration",
            Mnemonic::MaxVelocity => "set max velocity",
            Mnemonic::JogAcceleration => "set jog acceleration",
            Mnemonic::JogDeceleration => "set jog deceleration",
            Mnemonic::JogSpeed => "set jog speed",
            Mnemonic::ChangeJogSpeed => "change jog speed",
            Mnemonic::Direction => "set direction",
            Mnemonic::ControlMode => "set control mode",
            Mnemonic::CommenceJog => "start jogging",
            Mnemonic::StopJog => "stop jogging",
            Mnemonic::StopImmediate => "stop immediately",
            Mnemonic::AlarmReset => "reset alarms",
            Mnemonic::Position => "query position",
            Mnemonic::ActualVelocity => "query actual velocity",
            Mnemonic::TargetVelocity => "query target velocity",
            Mnemonic::StatusCode => "query status code",
            Mnemonic::AlarmCode => "query alarm code",
            Mnemonic::Temperature => "query temperature",
            Mnemonic::BusVoltage => "query bus voltage",
            Mnemonic::Current => "query current",
            Mnemonic::FirmwareRevision => "query firmware revision",
            Mnemonic::ModelRevision => "query model and revision",
            Mnemonic::StatusLetters => "query status letters",
            Mnemonic::WatchdogEnabled => "query network watchdog",
            Mnemonic::WatchdogDelay => "query network watchdog delay",
        }
    }

    /// 参数规格
    pub fn arg_spec(self) -> ArgSpec {
        match self {
            Mnemonic::DataFormat => ArgSpec::Text(&["D", "H"]),
            Mnemonic::RunCurrent | Mnemonic::IdleCurrent => ArgSpec::Decimal { min: 0.0, max: 5.0 },
            Mnemonic::IdleCurrentDelay => ArgSpec::Decimal {
                min: 0.0,
                max: 10.0,
            },
            Mnemonic::Resolution => ArgSpec::Integer {
                min: 200,
                max: 51200,
            },
            Mnemonic::Acceleration
            | Mnemonic::Deceleration
            | Mnemonic::MaxAcceleration
            | Mnemonic::JogAcceleration
            | Mnemonic::JogDeceleration => ACCEL_RANGE,
            Mnemonic::MaxVelocity => ArgSpec::Decimal {
                min: 0.025,
                max: 80.0,
            },
            Mnemonic::JogSpeed => ArgSpec::Decimal {
                min: 0.001,
                max: 80.0,
            },
            Mnemonic::ChangeJogSpeed => ArgSpec::Decimal {
                min: -80.0,
                max: 80.0,
            },
            Mnemonic::Direction => ArgSpec::Integer { min: -1, max: 1 },
            Mnemonic::ControlMode => ArgSpec::Integer { min: 1, max: 22 },
            _ => ArgSpec::None,
        }
    }

    /// 默认应答形态
    ///
    /// `CS` 在不同固件上可能返回 `CS=value` 或单纯的确认符，因此默认为 `AckOrKeyed`。
    pub fn reply_shape(self) -> ReplyShape {
        match self {
            Mnemonic::ChangeJogSpeed => ReplyShape::AckOrKeyed,
            Mnemonic::Position
            | Mnemonic::ActualVelocity
            | Mnemonic::TargetVelocity
            | Mnemonic::StatusCode
            | Mnemonic::AlarmCode
            | Mnemonic::Temperature
            | Mnemonic::BusVoltage
            | Mnemonic::Current
            | Mnemonic::FirmwareRevision
            | Mnemonic::ModelRevision
            | Mnemonic::StatusLetters
            | Mnemonic::WatchdogEnabled
            | Mnemonic::WatchdogDelay => ReplyShape::Keyed,
            _ => ReplyShape::Ack,
        }
    }

    /// 键值应答中使用的键
    ///
    /// 注意 `IV0` 与 `IV1` 共用 `IV` 键，应答本身无法区分二者。
    pub fn reply_key(self) -> &'static str {
        match self {
            Mnemonic::ActualVelocity | Mnemonic::TargetVelocity => "IV",
            other => other.code(),
        }
    }

    /// 是否为查询指令（应答为键值）
    pub fn is_query(self) -> bool {
        self.reply_shape() == ReplyShape::Keyed
    }

    /// 按线上编码查找助记符（精确匹配）
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.code() == code)
    }

    /// 将线上指令拆分为助记符与参数文本
    ///
    /// 优先匹配三字符编码（`IV0`/`IV1`），再匹配两字符编码。
    /// 参数文本前的空格会被去除（`IF D` → `D`）。
    pub fn split_wire(wire: &str) -> Option<(Self, &str)> {
        let wire = wire.trim();
        for len in [3usize, 2] {
            if let (Some(code), Some(rest)) = (wire.get(..len), wire.get(len..))
                && let Some(m) = Self::from_code(code)
            {
                return Some((m, rest.trim_start()));
            }
        }
        None
    }
}

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Mnemonic {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Self::from_code(&code).ok_or(ProtocolError::UnknownMnemonic(code))
    }
}

impl TryFrom<String> for Mnemonic {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Mnemonic> for String {
    fn from(m: Mnemonic) -> Self {
        m.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let mut codes: Vec<_> = Mnemonic::ALL.iter().map(|m| m.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), Mnemonic::ALL.len());
    }

    #[test]
    fn test_velocity_queries_share_reply_key() {
        assert_eq!(Mnemonic::ActualVelocity.code(), "IV0");
        assert_eq!(Mnemonic::TargetVelocity.code(), "IV1");
        assert_eq!(Mnemonic::ActualVelocity.reply_key(), "IV");
        assert_eq!(Mnemonic::TargetVelocity.reply_key(), "IV");
    }

    #[test]
    fn test_split_wire() {
        assert_eq!(
            Mnemonic::split_wire("JS1.667"),
            Some((Mnemonic::JogSpeed, "1.667"))
        );
        assert_eq!(
            Mnemonic::split_wire("IV0"),
            Some((Mnemonic::ActualVelocity, ""))
        );
        assert_eq!(
            Mnemonic::split_wire("IF D"),
            Some((Mnemonic::DataFormat, "D"))
        );
        assert_eq!(Mnemonic::split_wire("DI-1"), Some((Mnemonic::Direction, "-1")));
        assert_eq!(Mnemonic::split_wire("XX"), None);
        assert_eq!(Mnemonic::split_wire(""), None);
    }

    #[test]
    fn test_queries() {
        assert!(Mnemonic::StatusCode.is_query());
        assert!(Mnemonic::AlarmCode.is_query());
        assert!(!Mnemonic::JogSpeed.is_query());
        assert!(!Mnemonic::ChangeJogSpeed.is_query());
        assert_eq!(Mnemonic::ChangeJogSpeed.reply_shape(), ReplyShape::AckOrKeyed);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_as_wire_code() {
        let json = serde_json::to_string(&Mnemonic::ChangeJogSpeed).unwrap();
        assert_eq!(json, "\"CS\"");
        let m: Mnemonic = serde_json::from_str("\"iv1\"").unwrap();
        assert_eq!(m, Mnemonic::TargetVelocity);
        assert!(serde_json::from_str::<Mnemonic>("\"XX\"").is_err());
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("vm".parse::<Mnemonic>().unwrap(), Mnemonic::MaxVelocity);
        assert!(matches!(
            "QQ".parse::<Mnemonic>(),
            Err(ProtocolError::UnknownMnemonic(_))
        ));
    }
}
