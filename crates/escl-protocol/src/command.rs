//! 指令构建与编码
//!
//! `Command` 构造时即完成参数校验，构造成功的指令保证可以编码且不会因
//! 范围或精度被驱动器拒绝（固件特定的精度限制除外，由上层分类处理）。

use crate::mnemonic::{ArgSpec, Mnemonic};
use crate::status::{ControlMode, DataFormat};
use crate::units::{Direction, Rps, round_places};
use crate::{ProtocolError, RangeViolation};

/// 协议允许的最大小数位数
pub const MAX_DECIMAL_PLACES: u8 = 3;

/// 指令参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Argument {
    /// 固定文本
    Text(&'static str),
    /// 整数
    Integer(i64),
    /// 小数（已归一化到最多 3 位小数）
    Decimal(f64),
}

impl Argument {
    /// 渲染为线上文本
    ///
    /// 小数去掉末尾多余的 0：`2.500` → `2.5`，`1.000` → `1`。
    pub fn render(&self) -> String {
        match self {
            Argument::Text(text) => text.to_string(),
            Argument::Integer(value) => value.to_string(),
            Argument::Decimal(value) => render_decimal(*value, MAX_DECIMAL_PLACES),
        }
    }

    /// 线上文本中的小数位数
    pub fn decimal_places(&self) -> u8 {
        match self {
            Argument::Decimal(_) => {
                let text = self.render();
                text.split_once('.').map(|(_, frac)| frac.len() as u8).unwrap_or(0)
            },
            _ => 0,
        }
    }
}

fn render_decimal(value: f64, places: u8) -> String {
    let text = format!("{:.*}", places as usize, value);
    let text = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text.as_str()
    };
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// 不可变指令：助记符 + 可选参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    mnemonic: Mnemonic,
    arg: Option<Argument>,
}

impl Command {
    /// 创建无参数指令
    pub fn new(mnemonic: Mnemonic) -> Result<Self, ProtocolError> {
        match mnemonic.arg_spec() {
            ArgSpec::None => Ok(Self {
                mnemonic,
                arg: None,
            }),
            _ => Err(out_of_range(mnemonic, "", RangeViolation::Missing)),
        }
    }

    /// 创建带数值参数的指令
    ///
    /// # 错误
    /// - 非有限值、超出范围、整数参数带小数、小数位数超过 3 位
    ///   都返回 `ProtocolError::ArgumentOutOfRange`，指令不会被编码发送。
    pub fn with_value(mnemonic: Mnemonic, value: f64) -> Result<Self, ProtocolError> {
        let raw = value.to_string();
        if !value.is_finite() {
            return Err(out_of_range(mnemonic, &raw, RangeViolation::NotFinite));
        }

        let arg = match mnemonic.arg_spec() {
            ArgSpec::Decimal { min, max } => {
                if has_excess_precision(value) {
                    return Err(out_of_range(mnemonic, &raw, RangeViolation::ExcessPrecision));
                }
                let value = round_places(value, MAX_DECIMAL_PLACES);
                check_bounds(mnemonic, &raw, value, min, max)?;
                Argument::Decimal(value)
            },
            ArgSpec::Integer { min, max } => {
                if value.fract() != 0.0 {
                    return Err(out_of_range(mnemonic, &raw, RangeViolation::NotInteger));
                }
                check_bounds(mnemonic, &raw, value, min as f64, max as f64)?;
                Argument::Integer(value as i64)
            },
            ArgSpec::Text(_) => {
                return Err(out_of_range(mnemonic, &raw, RangeViolation::InvalidText));
            },
            ArgSpec::None => {
                return Err(out_of_range(mnemonic, &raw, RangeViolation::Unexpected));
            },
        };

        Ok(Self {
            mnemonic,
            arg: Some(arg),
        })
    }

    /// 创建带文本参数的指令（如 `IF D`）
    pub fn with_text(mnemonic: Mnemonic, text: &str) -> Result<Self, ProtocolError> {
        match mnemonic.arg_spec() {
            ArgSpec::Text(allowed) => allowed
                .iter()
                .copied()
                .find(|candidate| candidate.eq_ignore_ascii_case(text))
                .map(|candidate| Self {
                    mnemonic,
                    arg: Some(Argument::Text(candidate)),
                })
                .ok_or_else(|| out_of_range(mnemonic, text, RangeViolation::InvalidText)),
            _ => Err(out_of_range(mnemonic, text, RangeViolation::InvalidText)),
        }
    }

    /// 点动速度（JS），取绝对值
    pub fn jog_speed(speed: Rps) -> Result<Self, ProtocolError> {
        Self::with_value(Mnemonic::JogSpeed, speed.0.abs())
    }

    /// 运行中改变点动速度（CS），保留符号
    pub fn change_jog_speed(speed: Rps) -> Result<Self, ProtocolError> {
        Self::with_value(Mnemonic::ChangeJogSpeed, speed.0)
    }

    /// 方向（DI）
    pub fn direction(direction: Direction) -> Self {
        Self {
            mnemonic: Mnemonic::Direction,
            arg: Some(Argument::Integer(direction.code() as i64)),
        }
    }

    /// 控制模式（CM）
    pub fn control_mode(mode: ControlMode) -> Self {
        Self {
            mnemonic: Mnemonic::ControlMode,
            arg: Some(Argument::Integer(u8::from(mode) as i64)),
        }
    }

    /// 数据格式（IF）
    pub fn data_format(format: DataFormat) -> Self {
        Self {
            mnemonic: Mnemonic::DataFormat,
            arg: Some(Argument::Text(format.code())),
        }
    }

    /// 助记符
    pub fn mnemonic(&self) -> Mnemonic {
        self.mnemonic
    }

    /// 参数
    pub fn argument(&self) -> Option<Argument> {
        self.arg
    }

    /// 编码为线上字符串（不含帧头和结束符）
    pub fn encode(&self) -> String {
        match self.arg {
            None => self.mnemonic.code().to_string(),
            Some(Argument::Text(text)) => format!("{} {}", self.mnemonic.code(), text),
            Some(arg) => format!("{}{}", self.mnemonic.code(), arg.render()),
        }
    }

    /// 参数的小数位数（仅小数/整数参数）
    pub fn decimal_places(&self) -> Option<u8> {
        match self.arg {
            Some(arg @ (Argument::Decimal(_) | Argument::Integer(_))) => {
                Some(arg.decimal_places())
            },
            _ => None,
        }
    }

    /// 按更少的小数位重新取整，生成新的指令
    ///
    /// 仅对小数参数有意义；重新取整后仍需满足范围约束。
    pub fn rerounded(&self, places: u8) -> Result<Self, ProtocolError> {
        match self.arg {
            Some(Argument::Decimal(value)) => {
                Self::with_value(self.mnemonic, round_places(value, places.min(MAX_DECIMAL_PLACES)))
            },
            _ => Ok(*self),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// 指令解析：`"JS1.667"` → `Command`
impl std::str::FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mnemonic, rest) = Mnemonic::split_wire(s)
            .ok_or_else(|| ProtocolError::UnknownMnemonic(s.trim().to_string()))?;
        match (mnemonic.arg_spec(), rest) {
            (ArgSpec::None, "") => Self::new(mnemonic),
            (ArgSpec::None, extra) => {
                Err(out_of_range(mnemonic, extra, RangeViolation::Unexpected))
            },
            (ArgSpec::Text(_), text) => Self::with_text(mnemonic, text),
            (_, "") => Self::new(mnemonic),
            (_, number) => {
                let value = number.parse::<f64>().map_err(|_| ProtocolError::InvalidValue {
                    field: "argument",
                    value: number.to_string(),
                })?;
                if has_excess_precision_text(number) {
                    return Err(out_of_range(mnemonic, number, RangeViolation::ExcessPrecision));
                }
                Self::with_value(mnemonic, value)
            },
        }
    }
}

fn out_of_range(mnemonic: Mnemonic, value: &str, reason: RangeViolation) -> ProtocolError {
    ProtocolError::ArgumentOutOfRange {
        mnemonic,
        value: value.to_string(),
        reason,
    }
}

fn check_bounds(
    mnemonic: Mnemonic,
    raw: &str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ProtocolError> {
    if value < min {
        Err(out_of_range(mnemonic, raw, RangeViolation::BelowMinimum))
    } else if value > max {
        Err(out_of_range(mnemonic, raw, RangeViolation::AboveMaximum))
    } else {
        Ok(())
    }
}

/// 数值是否有超过 3 位的有效小数
///
/// 允许浮点表示误差：`100.0 / 60.0` 取整后的 `1.667` 视为 3 位小数。
fn has_excess_precision(value: f64) -> bool {
    let scaled = value * 10f64.powi(MAX_DECIMAL_PLACES as i32);
    (scaled - scaled.round()).abs() > 1e-6 * scaled.abs().max(1.0)
}

fn has_excess_precision_text(text: &str) -> bool {
    text.split_once('.')
        .map(|(_, frac)| frac.trim_end_matches('0').len() > MAX_DECIMAL_PLACES as usize)
        .unwrap_or(false)
}
