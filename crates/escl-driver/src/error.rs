//! 驱动层错误类型定义

use escl_protocol::{Command, ProtocolError, ReplyShape};
use escl_transport::TransportError;
use thiserror::Error;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorClass {
    /// 通讯时序引起（超时、查询后的空错误码），可立即重试
    Transient,
    /// 固件已知不支持，预期内，只记录
    PermanentUnsupported,
    /// 参数精度超出固件限制，调用方需重新取整后重发一次
    PermanentInvalidArgument,
    /// 其他错误码，直接上报
    Unknown,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ErrorClass::Transient => "transient",
            ErrorClass::PermanentUnsupported => "unsupported",
            ErrorClass::PermanentInvalidArgument => "invalid argument",
            ErrorClass::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// 单条指令失败
///
/// 包含运维排查所需的全部信息：发送的指令、原始应答、分类、尝试次数。
/// `reply` 为 `None` 表示等待超时。
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{command} failed: {} [{class}, {attempts} attempt(s)]", describe_reply(.reply))]
pub struct CommandError {
    pub command: Command,
    pub reply: Option<String>,
    pub class: ErrorClass,
    pub attempts: u32,
}

fn describe_reply(reply: &Option<String>) -> String {
    match reply {
        Some(raw) => format!("reply {:?}", raw),
        None => "no reply (timeout)".to_string(),
    }
}

impl CommandError {
    /// 是否因超时失败
    pub fn timed_out(&self) -> bool {
        self.reply.is_none()
    }

    /// 原始应答文本（超时返回 `<timeout>`）
    pub fn raw_reply(&self) -> &str {
        self.reply.as_deref().unwrap_or("<timeout>")
    }
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输错误（超时除外，超时会被分类为 `Transient`）
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 驱动器拒绝或未应答
    #[error(transparent)]
    Command(#[from] CommandError),

    /// 应答形态与该助记符的期望不符
    #[error("Unexpected reply to {command}: {reply:?} (expected {expected:?})")]
    UnexpectedReply {
        command: Command,
        reply: String,
        expected: ReplyShape,
    },

    /// 会话已关闭
    #[error("Session closed")]
    SessionClosed,

    /// 无效配置
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DriverError {
    /// 指令失败的分类（非指令失败返回 None）
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            DriverError::Command(e) => Some(e.class),
            _ => None,
        }
    }

    pub fn as_command_error(&self) -> Option<&CommandError> {
        match self {
            DriverError::Command(e) => Some(e),
            _ => None,
        }
    }
}
