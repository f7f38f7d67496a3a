//! 命令定义和实现

pub mod config;
pub mod discover;
pub mod motion;
pub mod raw;
pub mod selftest;
pub mod status;

pub use config::ConfigCommand;
pub use discover::DiscoverCommand;
pub use motion::{SpeedCommand, SpinCommand, StopCommand};
pub use raw::RawCommand;
pub use selftest::SelftestCommand;
pub use status::{MonitorCommand, StatusCommand};
