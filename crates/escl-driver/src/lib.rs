//! # eSCL Driver
//!
//! 会话层：串行化的请求/应答交换、错误分类与重试、固件差异配置。
//!
//! - [`ControllerSession`]: 一台驱动器一个会话，持有传输与已应用的配置
//! - [`SessionGuard`]: 独占访问，多步操作在同一个 guard 内完成
//! - [`ErrorClassifier`]: 将超时/错误应答映射到 [`ErrorClass`]
//! - [`FirmwareProfile`]: 固件差异（不支持的指令、精度、应答形态）
//!
//! 大多数用户应该使用 `escl-client` 提供的初始化、运动控制与状态查询接口。

mod applied;
mod builder;
pub mod classifier;
mod error;
pub mod profile;
pub mod session;

pub use applied::AppliedConfig;
pub use builder::SessionBuilder;
pub use classifier::{ErrorClassifier, Failure, RetryPolicy};
pub use error::{CommandError, DriverError, ErrorClass};
pub use profile::FirmwareProfile;
pub use session::{ControllerSession, SessionGuard, SessionOptions};
