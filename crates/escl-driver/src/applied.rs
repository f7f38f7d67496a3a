//! 已应用到驱动器的配置

use escl_protocol::{ControlMode, Mnemonic};

/// 初始化成功后实际生效的配置
///
/// 由初始化流程构造并写入会话；运动控制读取其中的点动加减速度。
/// 被跳过的指令（固件不支持）列在 `skipped` 中，对应字段保持未应用。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppliedConfig {
    /// 运行电流（A）
    pub run_current: f64,
    /// 空闲电流（A）
    pub idle_current: f64,
    /// 空闲电流延时（s）
    pub idle_delay: f64,
    /// 每转步数
    pub resolution: u32,
    /// 加速度（rev/s²）
    pub acceleration: f64,
    /// 减速度（rev/s²）
    pub deceleration: f64,
    /// 最大加速度（rev/s²）
    pub max_acceleration: f64,
    /// 最大速度（rev/s），被跳过时为 None
    pub max_velocity: Option<f64>,
    /// 点动加速度（rev/s²）
    pub jog_acceleration: f64,
    /// 点动减速度（rev/s²）
    pub jog_deceleration: f64,
    /// 默认点动速度（rev/s）
    pub jog_speed: f64,
    pub control_mode: ControlMode,
    /// 因固件不支持而跳过的指令
    pub skipped: Vec<Mnemonic>,
}

impl AppliedConfig {
    pub fn was_skipped(&self, mnemonic: Mnemonic) -> bool {
        self.skipped.contains(&mnemonic)
    }

    /// 是否处于点动所需的指令速度模式
    pub fn velocity_mode(&self) -> bool {
        self.control_mode == ControlMode::CommandedVelocity
    }
}
