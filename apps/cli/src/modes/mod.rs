//! 运行模式
//!
//! 支持两种模式：
//! - One-shot 模式：每次命令独立建立会话
//! - REPL 模式：交互式 Shell，会话在命令之间保持

pub mod oneshot;
pub mod repl;
