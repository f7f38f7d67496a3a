//! 固件差异配置
//!
//! 不同批次固件的行为差异（不支持的指令、可接受的小数位数、应答形态）
//! 全部集中在 [`FirmwareProfile`] 中，分类器与会话只查询这里，调用点不做特判。

use escl_protocol::{MAX_DECIMAL_PLACES, Mnemonic, ReplyShape};
use std::collections::{BTreeMap, BTreeSet};

/// 固件配置
///
/// # TOML 示例
///
/// ```toml
/// unsupported = ["VM"]
/// generic_codes = [""]
///
/// [decimal_places]
/// CC = 2
///
/// [reply_shapes]
/// CS = "keyed"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FirmwareProfile {
    /// 已知不支持的助记符（失败只记录，不中断）
    pub unsupported: BTreeSet<Mnemonic>,
    /// 每个助记符可接受的小数位数（未列出的按协议上限 3 位）
    pub decimal_places: BTreeMap<Mnemonic, u8>,
    /// 应答形态覆盖
    pub reply_shapes: BTreeMap<Mnemonic, ReplyShape>,
    /// 视为“无具体原因”的错误码
    pub generic_codes: BTreeSet<String>,
}

impl Default for FirmwareProfile {
    fn default() -> Self {
        Self {
            unsupported: BTreeSet::from([Mnemonic::MaxVelocity]),
            decimal_places: BTreeMap::new(),
            reply_shapes: BTreeMap::new(),
            generic_codes: BTreeSet::from([String::new()]),
        }
    }
}

impl FirmwareProfile {
    pub fn is_unsupported(&self, mnemonic: Mnemonic) -> bool {
        self.unsupported.contains(&mnemonic)
    }

    /// 该助记符可接受的小数位数
    pub fn accepted_places(&self, mnemonic: Mnemonic) -> u8 {
        self.decimal_places
            .get(&mnemonic)
            .copied()
            .unwrap_or(MAX_DECIMAL_PLACES)
            .min(MAX_DECIMAL_PLACES)
    }

    /// 期望的应答形态（覆盖优先）
    pub fn reply_shape(&self, mnemonic: Mnemonic) -> ReplyShape {
        self.reply_shapes
            .get(&mnemonic)
            .copied()
            .unwrap_or_else(|| mnemonic.reply_shape())
    }

    pub fn is_generic_code(&self, code: &str) -> bool {
        self.generic_codes.contains(code.trim())
    }

    pub fn with_unsupported(mut self, mnemonic: Mnemonic) -> Self {
        self.unsupported.insert(mnemonic);
        self
    }

    /// 取消 “不支持” 标记（用于支持该指令的固件）
    pub fn with_supported(mut self, mnemonic: Mnemonic) -> Self {
        self.unsupported.remove(&mnemonic);
        self
    }

    pub fn with_decimal_places(mut self, mnemonic: Mnemonic, places: u8) -> Self {
        self.decimal_places.insert(mnemonic, places);
        self
    }

    pub fn with_reply_shape(mut self, mnemonic: Mnemonic, shape: ReplyShape) -> Self {
        self.reply_shapes.insert(mnemonic, shape);
        self
    }

    pub fn with_generic_code(mut self, code: impl Into<String>) -> Self {
        self.generic_codes.insert(code.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = FirmwareProfile::default();
        assert!(profile.is_unsupported(Mnemonic::MaxVelocity));
        assert!(!profile.is_unsupported(Mnemonic::JogSpeed));
        assert_eq!(profile.accepted_places(Mnemonic::JogSpeed), 3);
        assert!(profile.is_generic_code(""));
        assert!(!profile.is_generic_code("4"));
        assert_eq!(
            profile.reply_shape(Mnemonic::ChangeJogSpeed),
            ReplyShape::AckOrKeyed
        );
    }

    #[test]
    fn test_overrides() {
        let profile = FirmwareProfile::default()
            .with_supported(Mnemonic::MaxVelocity)
            .with_decimal_places(Mnemonic::RunCurrent, 1)
            .with_reply_shape(Mnemonic::ChangeJogSpeed, ReplyShape::Ack)
            .with_decimal_places(Mnemonic::JogSpeed, 9);
        assert!(!profile.is_unsupported(Mnemonic::MaxVelocity));
        assert_eq!(profile.accepted_places(Mnemonic::RunCurrent), 1);
        assert_eq!(profile.accepted_places(Mnemonic::JogSpeed), 3);
        assert_eq!(profile.reply_shape(Mnemonic::ChangeJogSpeed), ReplyShape::Ack);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_profile_from_toml() {
        let text = r#"
            unsupported = ["VM", "ZS"]

            [decimal_places]
            CC = 2

            [reply_shapes]
            CS = "keyed"
        "#;
        let profile: FirmwareProfile = toml::from_str(text).unwrap();
        assert!(profile.is_unsupported(Mnemonic::WatchdogDelay));
        assert_eq!(profile.accepted_places(Mnemonic::RunCurrent), 2);
        assert_eq!(profile.reply_shape(Mnemonic::ChangeJogSpeed), ReplyShape::Keyed);
        // 未写的字段取默认值
        assert!(profile.is_generic_code(""));
    }
}
