//! # eSCL Client
//!
//! 面向应用的操作层：
//!
//! - [`initialize`]: 固定顺序的初始化序列，结果记录在会话中
//! - [`MotionController`]: 点动状态机（`spin` / `change_speed` / `stop`）
//! - [`poll`]: 一次完整的状态快照
//! - [`check_alarms`] / [`drive_info`]: 报警与身份信息
//! - [`discovery`]: 按旋钮地址表或网段探测驱动器
//!
//! 所有操作都在会话 guard 内完成，同一会话上的调用自动串行化。

mod config;
pub mod diagnostics;
pub mod discovery;
mod init;
pub mod monitor;
pub mod motion;
mod recovery;

pub use config::MotorConfig;
pub use diagnostics::{AlarmReport, DriveInfo, check_alarms, drive_info};
pub use discovery::{DiscoveredDrive, DiscoveryOptions, discover, scan_subnet, switch_address};
pub use init::{InitError, init_sequence, initialize};
pub use monitor::{ObservedPhase, PollError, StatusSnapshot, poll, wait_until};
pub use motion::{MotionController, MotionError, MotionState};
