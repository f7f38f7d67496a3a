//! 应答解码
//!
//! 应答只有三种形态：
//! - 仅一个确认符（`%` 立即执行，`*` 已缓冲）→ [`Reply::Ack`]
//! - `KEY=value` → [`Reply::Keyed`]
//! - 以 `?` 开头 → [`Reply::Error`]，`code` 为其余部分（可能为空）

use crate::ProtocolError;

/// 确认符：指令已立即执行
pub const ACK_IMMEDIATE: char = '%';
/// 确认符：指令已进入缓冲区
pub const ACK_BUFFERED: char = '*';
/// 错误符
pub const ERROR_GLYPH: char = '?';

/// 键值应答
///
/// 只保存原始文本；数值解析由调用方按字段选择（十进制 / 十六进制）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedValue {
    key: String,
    raw: String,
}

impl KeyedValue {
    pub fn new(key: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            raw: raw.into(),
        }
    }

    /// 应答键（`IV0` 与 `IV1` 均为 `IV`）
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 原始值文本
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// 按有符号十进制整数解析
    pub fn as_i64(&self) -> Result<i64, ProtocolError> {
        self.raw.trim().parse::<i64>().map_err(|_| self.invalid())
    }

    /// 按十进制小数解析
    pub fn as_f64(&self) -> Result<f64, ProtocolError> {
        self.raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.invalid())
    }

    /// 按 4 位十六进制位域解析（状态码 / 报警码）
    pub fn as_hex_u16(&self) -> Result<u16, ProtocolError> {
        let raw = self.raw.trim();
        if raw.is_empty() || raw.len() > 4 {
            return Err(self.invalid());
        }
        u16::from_str_radix(raw, 16).map_err(|_| self.invalid())
    }

    fn invalid(&self) -> ProtocolError {
        ProtocolError::InvalidValue {
            field: "keyed value",
            value: format!("{}={}", self.key, self.raw),
        }
    }
}

impl std::fmt::Display for KeyedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.raw)
    }
}

/// 解码后的应答（每次请求新建，不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// 指令已接受
    Ack,
    /// 键值应答
    Keyed(KeyedValue),
    /// 错误应答，`code` 为 `?` 之后的内容
    Error { code: String },
}

impl Reply {
    pub fn is_ack(&self) -> bool {
        matches!(self, Reply::Ack)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }

    /// 获取键值（非键值应答返回 None）
    pub fn keyed(&self) -> Option<&KeyedValue> {
        match self {
            Reply::Keyed(value) => Some(value),
            _ => None,
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Ack => write!(f, "{}", ACK_IMMEDIATE),
            Reply::Keyed(value) => write!(f, "{}", value),
            Reply::Error { code } => write!(f, "{}{}", ERROR_GLYPH, code),
        }
    }
}

/// 解码应答字符串（不含帧头，结尾的 CR/LF 会被忽略）
pub fn decode(wire: &str) -> Result<Reply, ProtocolError> {
    let text = wire.trim_end_matches(['\r', '\n']);

    if text.len() == 1 && (text.starts_with(ACK_IMMEDIATE) || text.starts_with(ACK_BUFFERED)) {
        return Ok(Reply::Ack);
    }

    if let Some(code) = text.strip_prefix(ERROR_GLYPH) {
        return Ok(Reply::Error {
            code: code.trim().to_string(),
        });
    }

    if let Some((key, raw)) = text.split_once('=')
        && !key.is_empty()
        && key.chars().all(|c| c.is_ascii_alphanumeric())
        && !raw.is_empty()
    {
        return Ok(Reply::Keyed(KeyedValue::new(key, raw)));
    }

    Err(ProtocolError::MalformedReply(wire.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ack() {
        assert_eq!(decode("%").unwrap(), Reply::Ack);
        assert_eq!(decode("*").unwrap(), Reply::Ack);
        assert_eq!(decode("%\r").unwrap(), Reply::Ack);
    }

    #[test]
    fn test_decode_keyed() {
        let reply = decode("IV=-100").unwrap();
        let value = reply.keyed().unwrap();
        assert_eq!(value.key(), "IV");
        assert_eq!(value.as_i64().unwrap(), -100);

        let reply = decode("SC=0001").unwrap();
        assert_eq!(reply.keyed().unwrap().as_hex_u16().unwrap(), 0x0001);

        let reply = decode("AL=2000").unwrap();
        assert_eq!(reply.keyed().unwrap().as_hex_u16().unwrap(), 0x2000);
    }

    #[test]
    fn test_decode_error() {
        assert_eq!(
            decode("?").unwrap(),
            Reply::Error {
                code: String::new()
            }
        );
        assert_eq!(
            decode("?4").unwrap(),
            Reply::Error {
                code: "4".to_string()
            }
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode(""), Err(ProtocolError::MalformedReply(_))));
        assert!(matches!(decode("%%"), Err(ProtocolError::MalformedReply(_))));
        assert!(matches!(decode("IV="), Err(ProtocolError::MalformedReply(_))));
        assert!(matches!(decode("=5"), Err(ProtocolError::MalformedReply(_))));
        assert!(matches!(decode("hello"), Err(ProtocolError::MalformedReply(_))));
    }

    #[test]
    fn test_invalid_numeric_value() {
        let value = KeyedValue::new("IP", "abc");
        assert!(value.as_i64().is_err());
        assert!(value.as_f64().is_err());

        let value = KeyedValue::new("SC", "10000");
        assert!(value.as_hex_u16().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for text in ["%", "IT=512", "?4"] {
            assert_eq!(decode(text).unwrap().to_string(), text);
        }
    }
}
