//! # eSCL Transport Layer
//!
//! 数据报传输抽象层：发送一条指令字符串，在有限时间内等待一条应答字符串。
//!
//! - [`UdpTransport`]: 真实驱动器（UDP，默认端口 7775）
//! - `mock` feature: [`mock::ScriptedTransport`]（按脚本应答）与
//!   [`mock::SimulatedDrive`]（带点动物理模型的模拟驱动器）
//!
//! 传输层只负责帧封装与收发，不解析应答语义。

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use escl_protocol::ProtocolError;

pub mod udp;

pub use udp::{UdpConfig, UdpTransport};

#[cfg(feature = "mock")]
pub mod mock;

/// 默认单次交换超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No reply within {0:?}")]
    Timeout(Duration),
    #[error("Frame error: {0}")]
    Frame(#[from] ProtocolError),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// 是否为超时（按瞬态错误处理）
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// 请求/应答传输
///
/// 协议没有请求标识，同一时刻只能有一个未完成的交换；
/// 调用方（会话层）负责串行化。
pub trait Transport {
    /// 发送一条指令（不含帧头）
    fn send(&mut self, command: &str) -> Result<(), TransportError>;

    /// 接收一条应答（阻塞直到收到或超时）
    fn receive(&mut self) -> Result<String, TransportError>;

    fn set_receive_timeout(&mut self, _timeout: Duration) {}

    /// 丢弃已到达但未读取的数据报，返回丢弃数量
    fn drain(&mut self) -> Result<usize, TransportError> {
        Ok(0)
    }

    /// 一次完整交换：清空残留 → 发送 → 等待应答
    fn request(&mut self, command: &str) -> Result<String, TransportError> {
        self.drain()?;
        self.send(command)?;
        self.receive()
    }

    /// 对端地址（模拟后端返回 None）
    fn peer(&self) -> Option<SocketAddr> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        (**self).send(command)
    }

    fn receive(&mut self) -> Result<String, TransportError> {
        (**self).receive()
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        (**self).set_receive_timeout(timeout)
    }

    fn drain(&mut self) -> Result<usize, TransportError> {
        (**self).drain()
    }

    fn request(&mut self, command: &str) -> Result<String, TransportError> {
        (**self).request(command)
    }

    fn peer(&self) -> Option<SocketAddr> {
        (**self).peer()
    }
}
