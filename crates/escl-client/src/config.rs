//! 电机配置
//!
//! 数值默认值来自 STM23Q 实测调试（3 A 电机、25600 步/转），属于配置数据，
//! 换电机时按铭牌修改即可。

use escl_protocol::ProtocolError;

/// 初始化所用的电机参数
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MotorConfig {
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
    /// 最大速度（rev/s）
    pub max_velocity: f64,
    /// 点动加速度（rev/s²）
    pub jog_acceleration: f64,
    /// 点动减速度（rev/s²）
    pub jog_deceleration: f64,
    /// 默认点动速度（rev/s）
    pub jog_speed: f64,
    /// 点动速度上限（RPM，运动控制层检查）
    pub max_rpm: f64,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self::with_current(3.0)
    }
}

impl MotorConfig {
    /// 按运行电流构造，空闲电流取一半
    pub fn with_current(run_current: f64) -> Self {
        Self {
            run_current,
            idle_current: run_current / 2.0,
            idle_delay: 1.0,
            resolution: 25600,
            acceleration: 20.0,
            deceleration: 20.0,
            max_acceleration: 50.0,
            max_velocity: 10.0,
            jog_acceleration: 10.0,
            jog_deceleration: 10.0,
            jog_speed: 1.0,
            max_rpm: 600.0,
        }
    }

    /// 检查指令层无法表达的约束（数值范围由指令构造时检查）
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.idle_current > self.run_current {
            return Err(ProtocolError::InvalidValue {
                field: "idle_current",
                value: format!("{} > run_current {}", self.idle_current, self.run_current),
            });
        }
        if !(self.max_rpm.is_finite() && self.max_rpm > 0.0) {
            return Err(ProtocolError::InvalidValue {
                field: "max_rpm",
                value: self.max_rpm.to_string(),
            });
        }
        Ok(())
    }
}
