//! eSCL SDK - 以太网步进驱动器 Rust SDK
//!
//! 通过 UDP 上的 eSCL 文本协议控制 STM23Q 等一体化步进驱动器：初始化、点动、
//! 变速、停止、状态查询。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 助记符表、指令编码、应答解码、数据报帧
//! - **传输层** (`transport`): `Transport` trait 与 UDP 实现
//! - **驱动层** (`driver`): 串行化会话、错误分类、重试、固件差异
//! - **客户端层** (`client`): 初始化序列、运动控制、状态监控
//!
//! # 快速开始
//!
//! ```no_run
//! use escl_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Arc::new(
//!     SessionBuilder::new()
//!         .drive_ip("192.168.1.10".parse()?)
//!         .build()?,
//! );
//! initialize(&session, &MotorConfig::default())?;
//!
//! let motion = MotionController::new(session.clone());
//! motion.spin(Rpm(-100.0))?;
//! println!("{}", poll(&session)?);
//! motion.stop()?;
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod prelude;

pub use escl_client as client;
pub use escl_driver as driver;
pub use escl_protocol as protocol;
pub use escl_transport as transport;

pub use escl_client::{
    InitError, MotionController, MotionError, MotionState, MotorConfig, PollError, StatusSnapshot,
    initialize, poll,
};
pub use escl_driver::{
    ControllerSession, DriverError, ErrorClass, FirmwareProfile, SessionBuilder,
};
pub use escl_protocol::{ProtocolError, Rpm};
pub use escl_transport::TransportError;
