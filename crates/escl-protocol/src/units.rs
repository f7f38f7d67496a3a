//! 强类型单位
//!
//! 用户接口使用 RPM（带符号），线上指令使用 rev/s（最多 3 位小数）。
//! 符号决定方向：正值为顺时针（`DI1`），负值为逆时针（`DI-1`）。

use crate::command::MAX_DECIMAL_PLACES;

/// 按指定小数位取整（四舍五入，远离零）
///
/// ```
/// use escl_protocol::round_places;
/// assert_eq!(round_places(100.0 / 60.0, 3), 1.667);
/// assert_eq!(round_places(-2.5, 0), -3.0);
/// ```
pub fn round_places(value: f64, places: u8) -> f64 {
    let factor = 10f64.powi(places as i32);
    let rounded = (value * factor).round() / factor;
    // 避免 -0.0 泄漏到线上文本
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// 转速（rev/min，带符号）
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Rpm(pub f64);

/// 转速（rev/s，带符号）
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Rps(pub f64);

impl Rpm {
    pub const ZERO: Self = Rpm(0.0);

    /// 转换为 rev/s，并按协议精度取整
    ///
    /// `Rpm(100.0).to_rps()` → `Rps(1.667)`
    pub fn to_rps(self) -> Rps {
        Rps(round_places(self.0 / 60.0, MAX_DECIMAL_PLACES))
    }

    pub fn abs(self) -> Self {
        Rpm(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    /// 旋转方向（零速度视为顺时针）
    pub fn direction(self) -> Direction {
        Direction::from_rpm(self)
    }
}

impl Rps {
    /// 转换为 RPM（不取整）
    pub fn to_rpm(self) -> Rpm {
        Rpm(self.0 * 60.0)
    }
}

impl From<Rps> for Rpm {
    fn from(value: Rps) -> Self {
        value.to_rpm()
    }
}

impl From<Rpm> for Rps {
    fn from(value: Rpm) -> Self {
        value.to_rps()
    }
}

impl std::fmt::Display for Rpm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} rpm", self.0)
    }
}

impl std::fmt::Display for Rps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} rps", self.0)
    }
}

/// 旋转方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// 顺时针（`DI1`）
    Clockwise,
    /// 逆时针（`DI-1`）
    CounterClockwise,
}

impl Direction {
    pub fn from_rpm(rpm: Rpm) -> Self {
        if rpm.0 < 0.0 {
            Direction::CounterClockwise
        } else {
            Direction::Clockwise
        }
    }

    /// `DI` 指令参数
    pub fn code(self) -> i8 {
        match self {
            Direction::Clockwise => 1,
            Direction::CounterClockwise => -1,
        }
    }

    /// 符号（+1.0 / -1.0）
    pub fn signum(self) -> f64 {
        self.code() as f64
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Clockwise => write!(f, "CW"),
            Direction::CounterClockwise => write!(f, "CCW"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_places(1.6666, 3), 1.667);
        assert_eq!(round_places(1.25, 1), 1.3);
        assert_eq!(round_places(0.0005, 3), 0.001);
        assert_eq!(round_places(-0.0005, 3), -0.001);
        assert_eq!(round_places(2.0, 3), 2.0);
        assert!(round_places(-0.0001, 3).is_sign_positive());
    }

    #[test]
    fn test_rpm_to_rps() {
        assert_eq!(Rpm(100.0).to_rps(), Rps(1.667));
        assert_eq!(Rpm(-150.0).to_rps(), Rps(-2.5));
        assert_eq!(Rpm(60.0).to_rps(), Rps(1.0));
        assert_eq!(Rpm(0.01).to_rps(), Rps(0.0));
    }

    #[test]
    fn test_direction_from_sign() {
        assert_eq!(Rpm(100.0).direction(), Direction::Clockwise);
        assert_eq!(Rpm(-100.0).direction(), Direction::CounterClockwise);
        assert_eq!(Rpm(0.0).direction(), Direction::Clockwise);
        assert_eq!(Direction::CounterClockwise.code(), -1);
    }
}
