//! 驱动器发现
//!
//! 以太网型驱动器的 IP 由前面板旋钮选择，出厂地址表见 [`switch_address`]。
//! 位置 `0` 为通用恢复地址 `10.10.10.10`。

use escl_protocol::frame::DRIVE_PORT;
use escl_protocol::{Mnemonic, ModelInfo, Reply, decode};
use escl_transport::{Transport, TransportError, UdpConfig, UdpTransport};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::{debug, info};

/// 旋钮位置 → 默认地址
const SWITCH_TABLE: [(char, [u8; 4]); 15] = [
    ('0', [10, 10, 10, 10]),
    ('1', [192, 168, 1, 10]),
    ('2', [192, 168, 1, 20]),
    ('3', [192, 168, 1, 30]),
    ('4', [192, 168, 0, 40]),
    ('5', [192, 168, 0, 50]),
    ('6', [192, 168, 0, 60]),
    ('7', [192, 168, 0, 70]),
    ('8', [192, 168, 0, 80]),
    ('9', [192, 168, 0, 90]),
    ('A', [192, 168, 0, 100]),
    ('B', [192, 168, 0, 110]),
    ('C', [192, 168, 0, 120]),
    ('D', [192, 168, 0, 130]),
    ('E', [192, 168, 0, 140]),
];

/// 旋钮位置对应的默认地址（`0`-`9`、`A`-`E`，不区分大小写）
pub fn switch_address(position: char) -> Option<Ipv4Addr> {
    let position = position.to_ascii_uppercase();
    SWITCH_TABLE
        .iter()
        .find(|(p, _)| *p == position)
        .map(|(_, octets)| Ipv4Addr::from(*octets))
}

/// 最常用的几个地址，按可能性排序
pub fn common_addresses() -> Vec<IpAddr> {
    ['0', '1', '4', '5']
        .into_iter()
        .filter_map(switch_address)
        .map(IpAddr::V4)
        .collect()
}

/// 全部旋钮地址
pub fn switch_addresses() -> Vec<IpAddr> {
    SWITCH_TABLE
        .iter()
        .map(|(_, octets)| IpAddr::V4(Ipv4Addr::from(*octets)))
        .collect()
}

/// 探测参数
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOptions {
    pub drive_port: u16,
    /// 本地地址（端口 0 由系统分配，避免与已打开的会话冲突）
    pub local: SocketAddr,
    /// 每个地址的等待时间
    pub timeout: Duration,
    /// 两次探测之间的间隔
    pub pause: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            drive_port: DRIVE_PORT,
            local: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            timeout: Duration::from_secs(1),
            pause: Duration::from_millis(100),
        }
    }
}

/// 探测到的驱动器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDrive {
    pub ip: IpAddr,
    /// 探测指令的原始应答值
    pub reply: String,
    /// `MV` 探测时解析出的型号
    pub model: Option<ModelInfo>,
}

impl std::fmt::Display for DiscoveredDrive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{} ({})", self.ip, model),
            None => write!(f, "{} ({})", self.ip, self.reply),
        }
    }
}

/// 用 `RV` 依次探测候选地址，返回全部有应答的驱动器
///
/// # 错误
/// 只有本地 socket 无法绑定时返回错误；单个地址无应答不算错误。
pub fn discover(
    candidates: &[IpAddr],
    options: &DiscoveryOptions,
) -> Result<Vec<DiscoveredDrive>, TransportError> {
    probe_all(candidates.iter().copied(), Mnemonic::FirmwareRevision, options)
}

/// 用 `MV` 扫描 `base.start`-`base.end` 网段
pub fn scan_subnet(
    base: [u8; 3],
    range: RangeInclusive<u8>,
    options: &DiscoveryOptions,
) -> Result<Vec<DiscoveredDrive>, TransportError> {
    info!(
        "Scanning {}.{}.{}.{}-{}",
        base[0],
        base[1],
        base[2],
        range.start(),
        range.end()
    );
    let candidates = range.map(|host| IpAddr::V4(Ipv4Addr::new(base[0], base[1], base[2], host)));
    probe_all(candidates, Mnemonic::ModelRevision, options)
}

fn probe_all(
    candidates: impl Iterator<Item = IpAddr>,
    mnemonic: Mnemonic,
    options: &DiscoveryOptions,
) -> Result<Vec<DiscoveredDrive>, TransportError> {
    let mut found = Vec::new();
    for (index, ip) in candidates.enumerate() {
        if index > 0 && !options.pause.is_zero() {
            std::thread::sleep(options.pause);
        }
        if let Some(drive) = probe(ip, mnemonic, options)? {
            info!("Found drive at {}", drive);
            found.push(drive);
        }
    }
    Ok(found)
}

/// 探测单个地址（`Ok(None)` 表示无有效应答）
pub fn probe(
    ip: IpAddr,
    mnemonic: Mnemonic,
    options: &DiscoveryOptions,
) -> Result<Option<DiscoveredDrive>, TransportError> {
    let config = UdpConfig::new(ip)
        .drive_port(options.drive_port)
        .local(options.local)
        .timeout(options.timeout);
    let mut transport = UdpTransport::connect(config)?;

    let text = match transport.request(mnemonic.code()) {
        Ok(text) => text,
        Err(TransportError::Io(e)) if e.kind() != std::io::ErrorKind::AddrInUse => {
            debug!("{}: {}", ip, e);
            return Ok(None);
        },
        Err(TransportError::Timeout(_)) | Err(TransportError::Frame(_)) => {
            debug!("{}: no reply", ip);
            return Ok(None);
        },
        Err(e) => return Err(e),
    };

    let value = match decode(&text) {
        Ok(Reply::Keyed(value)) if value.key().eq_ignore_ascii_case(mnemonic.reply_key()) => value,
        other => {
            debug!("{}: unexpected reply {:?}", ip, other);
            return Ok(None);
        },
    };

    let model = match mnemonic {
        Mnemonic::ModelRevision => ModelInfo::parse(value.raw()).ok(),
        _ => None,
    };
    Ok(Some(DiscoveredDrive {
        ip,
        reply: value.raw().to_string(),
        model,
    }))
}
