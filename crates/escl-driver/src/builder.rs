//! Builder 模式实现
//!
//! 提供链式构造 `ControllerSession` 的便捷方式。

use crate::classifier::RetryPolicy;
use crate::error::DriverError;
use crate::profile::FirmwareProfile;
use crate::session::{ControllerSession, SessionOptions};
use escl_protocol::frame::{DRIVE_PORT, LOCAL_PORT};
use escl_transport::{Transport, UdpConfig, UdpTransport};
use std::net::IpAddr;
use std::time::Duration;

/// Session Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use escl_driver::SessionBuilder;
/// use std::time::Duration;
///
/// let session = SessionBuilder::new()
///     .drive_ip("192.168.1.10".parse().unwrap())
///     .command_gap(Duration::from_millis(50))
///     .build()
///     .unwrap();
/// ```
pub struct SessionBuilder {
    drive_ip: Option<IpAddr>,
    drive_port: u16,
    local_port: u16,
    options: SessionOptions,
    profile: FirmwareProfile,
    transport: Option<Box<dyn Transport + Send>>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            drive_ip: None,
            drive_port: DRIVE_PORT,
            local_port: LOCAL_PORT,
            options: SessionOptions::default(),
            profile: FirmwareProfile::default(),
            transport: None,
        }
    }

    /// 驱动器 IP（使用 UDP 传输时必填）
    pub fn drive_ip(mut self, ip: IpAddr) -> Self {
        self.drive_ip = Some(ip);
        self
    }

    /// 驱动器端口（默认 7775）
    pub fn drive_port(mut self, port: u16) -> Self {
        self.drive_port = port;
        self
    }

    /// 本地端口（默认 7777，0 表示由系统分配）
    pub fn local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn command_gap(mut self, gap: Duration) -> Self {
        self.options.command_gap = gap;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.options.retry = retry;
        self
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn profile(mut self, profile: FirmwareProfile) -> Self {
        self.profile = profile;
        self
    }

    /// 使用自定义传输（如模拟驱动器），忽略 IP/端口设置
    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + Send + 'static,
    {
        self.transport = Some(Box::new(transport));
        self
    }

    /// 构建会话
    ///
    /// # Errors
    /// - `DriverError::InvalidConfig`: 未指定驱动器 IP 也未提供传输，或超时为 0
    /// - `DriverError::Transport`: 本地端口绑定失败
    pub fn build(self) -> Result<ControllerSession, DriverError> {
        if self.options.timeout.is_zero() {
            return Err(DriverError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }

        if let Some(transport) = self.transport {
            return Ok(ControllerSession::new(transport, self.profile, self.options));
        }

        let ip = self.drive_ip.ok_or_else(|| {
            DriverError::InvalidConfig("drive IP address is required".to_string())
        })?;
        let config = UdpConfig::new(ip)
            .drive_port(self.drive_port)
            .local_port(self.local_port)
            .timeout(self.options.timeout);
        let transport = UdpTransport::connect(config)?;
        tracing::info!("Connected to drive at {}:{}", ip, self.drive_port);
        Ok(ControllerSession::new(transport, self.profile, self.options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escl_protocol::Mnemonic;
    use escl_transport::mock::ScriptedTransport;

    #[test]
    fn test_build_requires_target() {
        assert!(matches!(
            SessionBuilder::new().build(),
            Err(DriverError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_build_rejects_zero_timeout() {
        let result = SessionBuilder::new()
            .transport(ScriptedTransport::new())
            .timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }

    #[test]
    fn test_build_with_custom_transport() {
        let script = ScriptedTransport::new().reply("RV=107");
        let session = SessionBuilder::new()
            .transport(script.clone())
            .retry(RetryPolicy::none())
            .build()
            .unwrap();
        assert_eq!(session.options().retry.max_retries, 0);
        let value = session.query(Mnemonic::FirmwareRevision).unwrap();
        assert_eq!(value.raw(), "107");
        assert!(session.peer().is_none());
    }

    #[test]
    fn test_build_udp_on_loopback() {
        let session = SessionBuilder::new()
            .drive_ip("127.0.0.1".parse().unwrap())
            .drive_port(17775)
            .local_port(0)
            .timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        assert_eq!(session.peer().map(|p| p.port()), Some(17775));
    }
}
