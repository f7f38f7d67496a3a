//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use escl_sdk::prelude::*;
//! ```

// 客户端层
pub use escl_client::{
    AlarmReport, DriveInfo, InitError, MotionController, MotionError, MotionState, MotorConfig,
    ObservedPhase, PollError, StatusSnapshot, check_alarms, drive_info, initialize, poll,
    wait_until,
};

// 驱动层
pub use escl_driver::{
    AppliedConfig, ControllerSession, DriverError, ErrorClass, FirmwareProfile, RetryPolicy,
    SessionBuilder, SessionOptions,
};

// 协议层
pub use escl_protocol::{AlarmFlags, Command, Direction, Mnemonic, ProtocolError, Rpm, StatusFlags};

// 传输层
pub use escl_transport::{Transport, TransportError};
