//! 配置管理命令
//!
//! 读写 CLI 配置文件（驱动器地址、电机参数、固件差异）

use crate::config::CliConfig;
use crate::modes::oneshot::ConnectArgs;
use anyhow::{Context, Result};
use clap::Subcommand;
use std::net::IpAddr;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示当前配置（TOML）
    Show,

    /// 显示配置文件路径
    Path,

    /// 写入默认配置
    Init {
        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },

    /// 设置配置项
    ///
    /// 连接参数取自全局选项：`config set --ip 192.168.1.10 --port 7775`
    Set {
        /// 驱动器旋钮位置（0-9, A-E），按出厂地址表换算为 IP
        #[arg(long)]
        switch: Option<char>,

        /// 指令间隔（ms）
        #[arg(long)]
        command_gap_ms: Option<u64>,

        /// 运行电流（A），空闲电流取一半
        #[arg(long)]
        current: Option<f64>,

        /// 转速上限（RPM）
        #[arg(long)]
        max_rpm: Option<f64>,
    },
}

impl ConfigCommand {
    pub fn execute(&self, connect: &ConnectArgs) -> Result<()> {
        let path = connect.config_path()?;
        match self {
            ConfigCommand::Show => {
                let config = CliConfig::load(&path)?;
                let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
                println!("# {}", path.display());
                println!("{}", text);
            },

            ConfigCommand::Path => println!("{}", path.display()),

            ConfigCommand::Init { force } => {
                if path.exists() && !force {
                    anyhow::bail!(
                        "{} already exists, use --force to overwrite",
                        path.display()
                    );
                }
                CliConfig::default().save(&path)?;
                println!("✅ Wrote default configuration to {}", path.display());
            },

            ConfigCommand::Set {
                switch,
                command_gap_ms,
                current,
                max_rpm,
            } => {
                if connect.ip.is_some() && switch.is_some() {
                    anyhow::bail!("--ip and --switch cannot be used together");
                }
                let mut config = CliConfig::load(&path)?;

                connect.apply(&mut config);
                if let Some(ip) = connect.ip {
                    println!("✅ Drive address: {}", ip);
                }
                if let Some(position) = switch {
                    let ip = escl_sdk::client::switch_address(*position).with_context(|| {
                        format!("Unknown switch position {:?}, expected 0-9 or A-E", position)
                    })?;
                    config.connection.drive_ip = Some(IpAddr::V4(ip));
                    println!("✅ Drive address: {} (switch {})", ip, position);
                }
                if let Some(gap) = command_gap_ms {
                    config.connection.command_gap_ms = *gap;
                    println!("✅ Command gap: {} ms", gap);
                }
                if let Some(current) = current {
                    let max_rpm = config.motor.max_rpm;
                    config.motor = escl_sdk::MotorConfig {
                        max_rpm,
                        ..escl_sdk::MotorConfig::with_current(*current)
                    };
                    println!("✅ Run current: {} A (idle {} A)", current, current / 2.0);
                }
                if let Some(limit) = max_rpm {
                    config.motor.max_rpm = *limit;
                    println!("✅ Speed limit: {} rpm", limit);
                }

                config.motor.validate().context("Invalid motor settings")?;
                config.save(&path)?;
            },
        }
        Ok(())
    }
}
