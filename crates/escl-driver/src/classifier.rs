//! 错误分类与重试策略
//!
//! 分类顺序（先匹配先生效）：
//!
//! | 条件 | 分类 |
//! |------|------|
//! | 等待超时 | `Transient` |
//! | 助记符在固件配置的不支持列表中 | `PermanentUnsupported` |
//! | 参数小数位数超过固件可接受位数 | `PermanentInvalidArgument` |
//! | 查询指令 + 空/通用错误码 | `Transient` |
//! | 其他 | `Unknown` |
//!
//! 只有 `Transient` 会被会话自动重试；参数精度错误的恢复（重新取整后重发）
//! 由调用方负责，因为修正的是请求本身。

use crate::error::ErrorClass;
use crate::profile::FirmwareProfile;
use escl_protocol::Command;
use std::time::Duration;

/// 一次失败的交换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure<'a> {
    /// 收到 `?code` 错误应答
    ErrorReply(&'a str),
    /// 在超时时间内未收到应答
    Timeout,
}

/// 错误分类器
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    profile: FirmwareProfile,
}

impl ErrorClassifier {
    pub fn new(profile: FirmwareProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &FirmwareProfile {
        &self.profile
    }

    pub fn classify(&self, command: &Command, failure: Failure<'_>) -> ErrorClass {
        let mnemonic = command.mnemonic();
        let code = match failure {
            Failure::Timeout => return ErrorClass::Transient,
            Failure::ErrorReply(code) => code,
        };

        if self.profile.is_unsupported(mnemonic) {
            return ErrorClass::PermanentUnsupported;
        }

        if let Some(places) = command.decimal_places()
            && places > self.profile.accepted_places(mnemonic)
        {
            return ErrorClass::PermanentInvalidArgument;
        }

        if mnemonic.is_query() && self.profile.is_generic_code(code) {
            return ErrorClass::Transient;
        }

        ErrorClass::Unknown
    }
}

/// 重试策略（仅针对 `Transient`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryPolicy {
    /// 首次尝试之后的最大重试次数
    pub max_retries: u32,
    /// 两次尝试之间的等待（驱动器应答在 100ms 内，默认不等待）
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// 不重试
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// 第 `attempt` 次尝试（从 1 开始）失败后是否重试
    pub fn should_retry(&self, class: ErrorClass, attempt: u32) -> bool {
        class == ErrorClass::Transient && attempt <= self.max_retries
    }
}

#[cfg(feature = "serde")]
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escl_protocol::Mnemonic;

    fn classifier() -> ErrorClassifier {
        ErrorClassifier::default()
    }

    #[test]
    fn test_max_velocity_is_unsupported() {
        let cmd = Command::with_value(Mnemonic::MaxVelocity, 10.0).unwrap();
        assert_eq!(
            classifier().classify(&cmd, Failure::ErrorReply("")),
            ErrorClass::PermanentUnsupported
        );
        assert_eq!(
            classifier().classify(&cmd, Failure::ErrorReply("7")),
            ErrorClass::PermanentUnsupported
        );
    }

    #[test]
    fn test_timeout_is_transient() {
        let cmd = Command::with_value(Mnemonic::JogSpeed, 1.0).unwrap();
        assert_eq!(
            classifier().classify(&cmd, Failure::Timeout),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_generic_error_after_query_is_transient() {
        for m in [Mnemonic::StatusCode, Mnemonic::AlarmCode, Mnemonic::ActualVelocity] {
            let cmd = Command::new(m).unwrap();
            assert_eq!(
                classifier().classify(&cmd, Failure::ErrorReply("")),
                ErrorClass::Transient
            );
            assert_eq!(
                classifier().classify(&cmd, Failure::ErrorReply("4")),
                ErrorClass::Unknown
            );
        }
    }

    #[test]
    fn test_generic_error_after_setter_is_unknown() {
        let cmd = Command::with_value(Mnemonic::JogSpeed, 2.5).unwrap();
        assert_eq!(
            classifier().classify(&cmd, Failure::ErrorReply("")),
            ErrorClass::Unknown
        );
    }

    #[test]
    fn test_excess_precision_is_invalid_argument() {
        let profile = FirmwareProfile::default().with_decimal_places(Mnemonic::RunCurrent, 1);
        let classifier = ErrorClassifier::new(profile);

        let cmd = Command::with_value(Mnemonic::RunCurrent, 1.25).unwrap();
        assert_eq!(
            classifier.classify(&cmd, Failure::ErrorReply("")),
            ErrorClass::PermanentInvalidArgument
        );

        let cmd = Command::with_value(Mnemonic::RunCurrent, 1.5).unwrap();
        assert_eq!(
            classifier.classify(&cmd, Failure::ErrorReply("")),
            ErrorClass::Unknown
        );
    }

    #[test]
    fn test_retry_policy() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(ErrorClass::Transient, 1));
        assert!(policy.should_retry(ErrorClass::Transient, 2));
        assert!(!policy.should_retry(ErrorClass::Transient, 3));
        assert!(!policy.should_retry(ErrorClass::Unknown, 1));
        assert!(!RetryPolicy::none().should_retry(ErrorClass::Transient, 1));
    }
}
