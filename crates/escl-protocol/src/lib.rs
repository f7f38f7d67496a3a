//! # eSCL Protocol
//!
//! 步进电机驱动器 eSCL（SCL over Ethernet）指令协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `mnemonic`: 指令助记符表（参数范围、应答形态）
//! - `command`: 指令构建与编码
//! - `reply`: 应答解码（Ack / 键值 / 错误）
//! - `frame`: UDP 数据报封装（`0x00 0x07` 头 + CR 结束符）
//! - `units`: 强类型单位（RPM、rev/s、方向）
//! - `status`: 状态码 / 报警码位域解析
//!
//! ## 编解码流程
//!
//! ```text
//! Command ──encode()──> "JS1.667" ──frame()──> [00 07 'J' 'S' ... 0D]
//!                                                   │ UDP
//! Reply   <──decode()── "IV=-100" <──unframe()── [00 07 'I' 'V' ... 0D]
//! ```
//!
//! 编解码只负责字符串与类型之间的转换，不关心应答属于哪条请求：
//! `IV0`（实际速度）与 `IV1`（目标速度）的应答键都是 `IV`，
//! 由调用方按发送的助记符关联结果。

pub mod command;
pub mod frame;
pub mod mnemonic;
pub mod reply;
pub mod status;
pub mod units;

// 重新导出常用类型
pub use command::{Argument, Command, MAX_DECIMAL_PLACES};
pub use frame::{frame, unframe};
pub use mnemonic::{ArgSpec, Mnemonic, ReplyShape};
pub use reply::{KeyedValue, Reply, decode};
pub use status::{AlarmFlags, ControlMode, DataFormat, ModelInfo, StatusFlags, StatusLetter};
pub use units::{Direction, Rpm, Rps, round_places};

use thiserror::Error;

/// 参数校验失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeViolation {
    /// 低于最小值
    BelowMinimum,
    /// 高于最大值
    AboveMaximum,
    /// 小数位数超过协议上限（3 位）
    ExcessPrecision,
    /// 要求整数参数
    NotInteger,
    /// NaN 或无穷大
    NotFinite,
    /// 该助记符需要参数但未提供
    Missing,
    /// 该助记符不接受参数
    Unexpected,
    /// 文本参数不在允许列表中
    InvalidText,
}

impl std::fmt::Display for RangeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RangeViolation::BelowMinimum => "below minimum",
            RangeViolation::AboveMaximum => "above maximum",
            RangeViolation::ExcessPrecision => "more than 3 decimal places",
            RangeViolation::NotInteger => "integer required",
            RangeViolation::NotFinite => "not a finite number",
            RangeViolation::Missing => "argument required",
            RangeViolation::Unexpected => "takes no argument",
            RangeViolation::InvalidText => "invalid text argument",
        };
        f.write_str(text)
    }
}

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Argument out of range for {mnemonic}: {value} ({reason})")]
    ArgumentOutOfRange {
        mnemonic: Mnemonic,
        value: String,
        reason: RangeViolation,
    },

    #[error("Malformed reply: {0:?}")]
    MalformedReply(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Unknown mnemonic: {0:?}")]
    UnknownMnemonic(String),

    #[error("Invalid value for field {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}
