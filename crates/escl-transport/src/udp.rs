//! UDP 传输实现
//!
//! 驱动器监听 7775 端口；本地默认绑定 7777 端口（驱动器向源端口回复）。
//!
//! ## 残留数据报
//!
//! 超时之后才到达的应答会留在 socket 缓冲区中。每次请求前先非阻塞地读空缓冲区，
//! 避免把上一条指令的迟到应答误认为本次应答。来自其他地址的数据报一律忽略。

use crate::{DEFAULT_TIMEOUT, Transport, TransportError};
use escl_protocol::frame::{self, DRIVE_PORT, LOCAL_PORT};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 接收缓冲区大小（eSCL 应答远小于此）
const RECV_BUFFER_SIZE: usize = 512;

/// UDP 连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpConfig {
    /// 驱动器地址
    pub drive: SocketAddr,
    /// 本地绑定地址（端口 0 表示由系统分配）
    pub local: SocketAddr,
    /// 单次交换超时
    pub timeout: Duration,
}

impl UdpConfig {
    /// 使用默认端口（驱动器 7775，本地 7777）
    pub fn new(drive_ip: IpAddr) -> Self {
        Self {
            drive: SocketAddr::new(drive_ip, DRIVE_PORT),
            local: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), LOCAL_PORT),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn drive_port(mut self, port: u16) -> Self {
        self.drive.set_port(port);
        self
    }

    pub fn local_port(mut self, port: u16) -> Self {
        self.local.set_port(port);
        self
    }

    pub fn local(mut self, local: SocketAddr) -> Self {
        self.local = local;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// UDP 传输
pub struct UdpTransport {
    socket: UdpSocket,
    drive: SocketAddr,
    read_timeout: Duration,
}

impl UdpTransport {
    /// 绑定本地端口并设置读超时
    ///
    /// # 错误
    /// - `TransportError::Io`: 端口被占用或权限不足
    /// - `TransportError::InvalidAddress`: 超时为 0（标准库不接受 0 超时）
    pub fn connect(config: UdpConfig) -> Result<Self, TransportError> {
        if config.timeout.is_zero() {
            return Err(TransportError::InvalidAddress(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let socket = UdpSocket::bind(config.local)?;
        socket.set_read_timeout(Some(config.timeout))?;

        debug!(
            "UDP transport bound to {} (drive {}, timeout {:?})",
            socket.local_addr()?,
            config.drive,
            config.timeout
        );

        Ok(Self {
            socket,
            drive: config.drive,
            read_timeout: config.timeout,
        })
    }

    /// 按驱动器 IP 使用默认参数连接
    pub fn open(drive_ip: IpAddr) -> Result<Self, TransportError> {
        Self::connect(UdpConfig::new(drive_ip))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        let packet = frame::frame(command);
        trace!("UDP TX {} -> {}: {}", command, self.drive, hex::encode(&packet));
        self.socket.send_to(&packet, self.drive)?;
        Ok(())
    }

    fn receive(&mut self) -> Result<String, TransportError> {
        let deadline = Instant::now() + self.read_timeout;
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout(self.read_timeout));
            }
            self.socket.set_read_timeout(Some(remaining))?;

            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    let packet = &buf[..len];
                    if from != self.drive {
                        trace!("UDP RX from unexpected peer {}, ignored", from);
                        continue;
                    }
                    trace!("UDP RX {} <- {}", hex::encode(packet), from);
                    return Ok(frame::unframe(packet)?);
                },
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(TransportError::Timeout(self.read_timeout));
                },
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        if timeout.is_zero() {
            warn!("Ignoring zero receive timeout");
            return;
        }
        self.read_timeout = timeout;
    }

    fn drain(&mut self) -> Result<usize, TransportError> {
        self.socket.set_nonblocking(true)?;
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let mut drained = 0;
        let result = loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    drained += 1;
                    trace!("Drained stale datagram from {}: {}", from, hex::encode(&buf[..len]));
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(drained),
                Err(e) => break Err(TransportError::Io(e)),
            }
        };
        self.socket.set_nonblocking(false)?;
        if drained > 0 {
            debug!("Discarded {} stale datagram(s) before request", drained);
        }
        result
    }

    fn peer(&self) -> Option<SocketAddr> {
        Some(self.drive)
    }
}
