//! 驱动器状态解析
//!
//! - `SC`: 状态码，4 位十六进制位域 → [`StatusFlags`]
//! - `AL`: 报警码，4 位十六进制位域 → [`AlarmFlags`]
//! - `RS`: 状态字母串 → [`StatusLetter`]
//! - `MV`: 型号与版本 `AAAABBBC` → [`ModelInfo`]

use crate::ProtocolError;
use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

bitflags! {
    /// 状态码位域（`SC` 应答）
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct StatusFlags: u16 {
        const ENABLED = 0x0001;
        const SAMPLING = 0x0002;
        const DRIVE_FAULT = 0x0004;
        const IN_POSITION = 0x0008;
        const MOVING = 0x0010;
        const JOGGING = 0x0020;
        const STOPPING = 0x0040;
        const WAITING_INPUT = 0x0080;
        const SAVING = 0x0100;
        const ALARM = 0x0200;
        const HOMING = 0x0400;
        const WAITING_TIME = 0x0800;
        const WIZARD_RUNNING = 0x1000;
        const CHECKING_ENCODER = 0x2000;
        const Q_PROGRAM_RUNNING = 0x4000;
        const INITIALIZING = 0x8000;
    }
}

bitflags! {
    /// 报警码位域（`AL` 应答）
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct AlarmFlags: u16 {
        const POSITION_LIMIT = 0x0001;
        const CCW_LIMIT = 0x0002;
        const CW_LIMIT = 0x0004;
        const OVER_TEMPERATURE = 0x0008;
        const INTERNAL_VOLTAGE = 0x0010;
        const OVER_VOLTAGE = 0x0020;
        const UNDER_VOLTAGE = 0x0040;
        const OVER_CURRENT = 0x0080;
        const OPEN_WINDING = 0x0100;
        const COMM_ERROR = 0x0400;
        const BAD_FLASH = 0x0800;
        const NO_MOVE = 0x1000;
        const CURRENT_FOLDBACK = 0x2000;
    }
}

const STATUS_NAMES: &[(StatusFlags, &str)] = &[
    (StatusFlags::ENABLED, "Motor Enabled"),
    (StatusFlags::SAMPLING, "Sampling"),
    (StatusFlags::DRIVE_FAULT, "Drive Fault"),
    (StatusFlags::IN_POSITION, "In Position"),
    (StatusFlags::MOVING, "Moving"),
    (StatusFlags::JOGGING, "Jogging"),
    (StatusFlags::STOPPING, "Stopping"),
    (StatusFlags::WAITING_INPUT, "Waiting for Input"),
    (StatusFlags::SAVING, "Saving Parameters"),
    (StatusFlags::ALARM, "Alarm Present"),
    (StatusFlags::HOMING, "Homing"),
    (StatusFlags::WAITING_TIME, "Waiting on Timer"),
    (StatusFlags::WIZARD_RUNNING, "Wizard Running"),
    (StatusFlags::CHECKING_ENCODER, "Checking Encoder"),
    (StatusFlags::Q_PROGRAM_RUNNING, "Q Program Running"),
    (StatusFlags::INITIALIZING, "Initializing"),
];

const ALARM_NAMES: &[(AlarmFlags, &str)] = &[
    (AlarmFlags::POSITION_LIMIT, "Position Limit"),
    (AlarmFlags::CCW_LIMIT, "CCW Limit"),
    (AlarmFlags::CW_LIMIT, "CW Limit"),
    (AlarmFlags::OVER_TEMPERATURE, "Over Temperature"),
    (AlarmFlags::INTERNAL_VOLTAGE, "Internal Voltage"),
    (AlarmFlags::OVER_VOLTAGE, "Over Voltage"),
    (AlarmFlags::UNDER_VOLTAGE, "Under Voltage"),
    (AlarmFlags::OVER_CURRENT, "Over Current"),
    (AlarmFlags::OPEN_WINDING, "Open Motor Winding"),
    (AlarmFlags::COMM_ERROR, "Communication Error"),
    (AlarmFlags::BAD_FLASH, "Bad Flash"),
    (AlarmFlags::NO_MOVE, "No Move"),
    (AlarmFlags::CURRENT_FOLDBACK, "Current Foldback"),
];

impl StatusFlags {
    /// 逐位描述（按位序）
    pub fn describe(self) -> Vec<&'static str> {
        STATUS_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl AlarmFlags {
    /// 逐位描述；未定义的位以 `Unknown bit 0x....` 形式列出
    pub fn describe(self) -> Vec<String> {
        let mut names: Vec<String> = ALARM_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| name.to_string())
            .collect();
        let unknown = self.bits() & !Self::all().bits();
        for bit in 0..16 {
            let mask = 1u16 << bit;
            if unknown & mask != 0 {
                names.push(format!("Unknown bit 0x{:04X}", mask));
            }
        }
        names
    }
}

impl std::fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("Ready/Idle");
        }
        f.write_str(&self.describe().join(", "))
    }
}

impl std::fmt::Display for AlarmFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("No alarms");
        }
        f.write_str(&self.describe().join(", "))
    }
}

/// 控制模式（`CM` 参数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlMode {
    /// 指令转矩
    CommandedTorque = 1,
    /// 模拟量转矩
    AnalogTorque = 2,
    /// 脉冲 + 方向
    StepDirection = 7,
    /// CW/CCW 脉冲
    StepCwCcw = 8,
    /// 指令速度（点动 / SCL 速度控制）
    CommandedVelocity = 10,
    /// 模拟量速度
    AnalogVelocity = 11,
    /// 模拟量速度（带启停输入）
    AnalogVelocityRunStop = 12,
    /// 模拟量位置
    AnalogPosition = 17,
    /// 编码器跟随
    EncoderFollow = 18,
    /// 点到点位置
    PointToPoint = 21,
    /// 模拟量速度（带启停与方向输入）
    AnalogVelocityGated = 22,
}

/// 数据格式（`IF` 参数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataFormat {
    /// 十进制（本库的工作格式）
    #[default]
    Decimal,
    /// 十六进制
    Hex,
}

impl DataFormat {
    pub fn code(self) -> &'static str {
        match self {
            DataFormat::Decimal => "D",
            DataFormat::Hex => "H",
        }
    }
}

/// `RS` 应答中的状态字母
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatusLetter {
    Alarm,
    Disabled,
    DriveFault,
    Moving,
    Homing,
    Jogging,
    MotionInProgress,
    InPosition,
    Ready,
    Stopping,
    WaitingTime,
    WaitingInput,
}

impl StatusLetter {
    pub fn from_char(c: char) -> Option<Self> {
        Some(match c.to_ascii_uppercase() {
            'A' => StatusLetter::Alarm,
            'D' => StatusLetter::Disabled,
            'E' => StatusLetter::DriveFault,
            'F' => StatusLetter::Moving,
            'H' => StatusLetter::Homing,
            'J' => StatusLetter::Jogging,
            'M' => StatusLetter::MotionInProgress,
            'P' => StatusLetter::InPosition,
            'R' => StatusLetter::Ready,
            'S' => StatusLetter::Stopping,
            'T' => StatusLetter::WaitingTime,
            'W' => StatusLetter::WaitingInput,
            _ => return None,
        })
    }

    /// 解析 `RS` 应答值，如 `"RJ"` → `[Ready, Jogging]`
    pub fn parse_all(text: &str) -> Result<Vec<Self>, ProtocolError> {
        text.trim()
            .chars()
            .map(|c| {
                Self::from_char(c).ok_or_else(|| ProtocolError::InvalidValue {
                    field: "status letters",
                    value: text.to_string(),
                })
            })
            .collect()
    }

    pub fn description(self) -> &'static str {
        match self {
            StatusLetter::Alarm => "alarm present",
            StatusLetter::Disabled => "disabled",
            StatusLetter::DriveFault => "drive fault",
            StatusLetter::Moving => "motor moving",
            StatusLetter::Homing => "homing",
            StatusLetter::Jogging => "jogging",
            StatusLetter::MotionInProgress => "motion in progress",
            StatusLetter::InPosition => "in position",
            StatusLetter::Ready => "ready",
            StatusLetter::Stopping => "stopping",
            StatusLetter::WaitingTime => "waiting on timer",
            StatusLetter::WaitingInput => "waiting for input",
        }
    }
}

/// `MV` 应答解析结果
///
/// 格式：`AAAABBBC`，`AAAA` 固件版本，`BBB` 型号代码，`C` 子型号（可选）。
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelInfo {
    pub firmware: String,
    pub model_code: String,
    pub sub_model: Option<char>,
}

impl ModelInfo {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        if text.len() < 7 || !text.is_ascii() {
            return Err(ProtocolError::InvalidValue {
                field: "model revision",
                value: text.to_string(),
            });
        }
        Ok(Self {
            firmware: text[..4].to_string(),
            model_code: text[4..7].to_string(),
            sub_model: text[7..].chars().next(),
        })
    }

    /// 型号系列名称
    pub fn family(&self) -> Option<&'static str> {
        match self.model_code.as_str() {
            "049" => Some("STM23-S"),
            "050" => Some("STM23-Q"),
            "053" => Some("STM24-C"),
            "054" => Some("STM23-C"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.family() {
            Some(family) => write!(f, "{} family", family)?,
            None => write!(f, "Unknown model ({})", self.model_code)?,
        }
        write!(f, ", firmware {}", self.firmware)?;
        if let Some(sub) = self.sub_model {
            write!(f, ", sub-model {}", sub)?;
        }
        Ok(())
    }
}
