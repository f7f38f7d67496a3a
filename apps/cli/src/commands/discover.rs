//! 驱动器发现命令

use crate::modes::oneshot::ConnectArgs;
use crate::utils;
use anyhow::{Context, Result};
use clap::Args;
use escl_sdk::client::discovery::{
    self, DiscoveredDrive, DiscoveryOptions, common_addresses, switch_addresses,
};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// 发现命令参数
#[derive(Args, Debug, Clone)]
pub struct DiscoverCommand {
    /// 扫描网段（前三段，如 192.168.1），使用 MV 探测
    #[arg(long, value_name = "BASE")]
    pub scan: Option<String>,

    /// 扫描起始主机号
    #[arg(long, default_value_t = 10)]
    pub from: u8,

    /// 扫描结束主机号
    #[arg(long, default_value_t = 50)]
    pub to: u8,

    /// 探测全部旋钮地址（默认只探测最常用的几个）
    #[arg(long)]
    pub all: bool,

    /// 额外的候选地址
    #[arg(long = "candidate", value_name = "IP")]
    pub candidates: Vec<IpAddr>,

    /// 每个地址的等待时间（ms）
    #[arg(long, default_value_t = 500)]
    pub wait_ms: u64,
}

impl DiscoverCommand {
    /// 端口取全局 `--port`（默认 7775）
    pub async fn execute(self, connect: &ConnectArgs) -> Result<()> {
        let options = DiscoveryOptions {
            drive_port: connect.port.unwrap_or(escl_sdk::protocol::frame::DRIVE_PORT),
            timeout: Duration::from_millis(self.wait_ms.max(1)),
            ..DiscoveryOptions::default()
        };

        let found = match &self.scan {
            Some(base) => {
                let base = parse_base(base)?;
                if self.from > self.to {
                    anyhow::bail!("--from must not be greater than --to");
                }
                println!(
                    "🔍 Scanning {}.{}.{}.{}-{} ...",
                    base[0], base[1], base[2], self.from, self.to
                );
                let range = self.from..=self.to;
                utils::blocking(move || Ok(discovery::scan_subnet(base, range, &options)?)).await?
            },
            None => {
                let mut candidates = self.candidates.clone();
                if candidates.is_empty() {
                    candidates = if self.all {
                        switch_addresses()
                    } else {
                        common_addresses()
                    };
                }
                println!("🔍 Probing {} address(es) ...", candidates.len());
                utils::blocking(move || Ok(discovery::discover(&candidates, &options)?)).await?
            },
        };

        report(&found);
        Ok(())
    }
}

fn report(found: &[DiscoveredDrive]) {
    if found.is_empty() {
        println!("❌ No drive answered");
        return;
    }
    for drive in found {
        println!("✅ {}", drive);
    }
    if let [only] = found {
        println!("💡 Use: escl-cli config set --ip {}", only.ip);
    }
}

/// 解析网段前缀 `a.b.c`
fn parse_base(text: &str) -> Result<[u8; 3]> {
    let parts: Vec<&str> = text.trim_end_matches('.').split('.').collect();
    if parts.len() != 3 {
        anyhow::bail!("Invalid subnet {:?}, expected three octets such as 192.168.1", text);
    }
    let mut base = [0u8; 3];
    for (slot, part) in base.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .with_context(|| format!("Invalid octet {:?} in {:?}", part, text))?;
    }
    // 完整地址校验（拒绝 256 等）
    let _: Ipv4Addr = format!("{}.{}.{}.1", base[0], base[1], base[2]).parse()?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base() {
        assert_eq!(parse_base("192.168.1").unwrap(), [192, 168, 1]);
        assert_eq!(parse_base("10.10.10.").unwrap(), [10, 10, 10]);
        assert!(parse_base("192.168").is_err());
        assert!(parse_base("192.168.300").is_err());
    }
}
