//! One-shot 模式
//!
//! 每个命令独立执行：
//! 1. 读取配置（命令行参数覆盖配置文件）
//! 2. 建立会话（UDP 或模拟驱动器）
//! 3. 执行操作
//!
//! 除 `selftest` 外不关闭会话：`close()` 会发送 `ST`/`MD`，
//! 而 `spin` 需要电机在进程退出后继续点动。

use anyhow::{Context, Result};
use clap::Args;
use escl_sdk::transport::mock::SimulatedDrive;
use escl_sdk::{ControllerSession, MotionController, SessionBuilder};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::commands::{
    MonitorCommand, RawCommand, SelftestCommand, SpeedCommand, SpinCommand, StatusCommand,
    StopCommand,
};
use crate::config::CliConfig;
use crate::utils;

/// 连接参数（所有子命令通用）
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// 配置文件路径
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// 驱动器 IP（覆盖配置文件）
    #[arg(long, global = true)]
    pub ip: Option<IpAddr>,

    /// 驱动器 UDP 端口
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// 本地 UDP 端口（0 由系统分配）
    #[arg(long, global = true)]
    pub local_port: Option<u16>,

    /// 单次交换超时（ms）
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// 使用内置模拟驱动器
    #[arg(long, global = true)]
    pub simulate: bool,
}

impl ConnectArgs {
    pub fn config_path(&self) -> Result<PathBuf> {
        CliConfig::path(self.config.as_deref())
    }

    /// 读取配置文件并应用命令行覆盖
    pub fn load(&self) -> Result<CliConfig> {
        let mut config = CliConfig::load(&self.config_path()?)?;
        self.apply(&mut config);
        Ok(config)
    }

    /// 把命令行给出的连接参数写入配置
    pub fn apply(&self, config: &mut CliConfig) {
        let connection = &mut config.connection;
        if let Some(ip) = self.ip {
            connection.drive_ip = Some(ip);
        }
        if let Some(port) = self.port {
            connection.drive_port = port;
        }
        if let Some(port) = self.local_port {
            connection.local_port = port;
        }
        if let Some(timeout) = self.timeout_ms {
            connection.timeout_ms = timeout;
        }
    }
}

/// 已建立的会话
pub struct Connection {
    pub session: Arc<ControllerSession>,
    pub config: CliConfig,
    /// 模拟模式下的驱动器句柄
    pub simulated: Option<SimulatedDrive>,
}

impl Connection {
    /// 建立会话
    ///
    /// 模拟模式忽略地址设置，指令间隔固定为 0。
    pub fn open(config: CliConfig, simulate: bool) -> Result<Self> {
        let mut options = config.connection.session_options();
        let builder = SessionBuilder::new().profile(config.profile.clone());

        if simulate {
            options.command_gap = Duration::ZERO;
            let drive = SimulatedDrive::new();
            let session = builder.options(options).transport(drive.clone()).build()?;
            tracing::info!("Using simulated drive");
            return Ok(Self {
                session: Arc::new(session),
                config,
                simulated: Some(drive),
            });
        }

        let ip = config.connection.drive_ip.context(
            "No drive address, pass --ip, run `escl-cli config set --ip <IP>`, or use --simulate",
        )?;
        let session = builder
            .drive_ip(ip)
            .drive_port(config.connection.drive_port)
            .local_port(config.connection.local_port)
            .options(options)
            .build()
            .with_context(|| format!("Failed to open session to {}", ip))?;

        Ok(Self {
            session: Arc::new(session),
            config,
            simulated: None,
        })
    }

    /// 运动控制器（带配置中的转速上限）
    pub fn motion(&self) -> MotionController {
        MotionController::new(self.session.clone()).with_max_rpm(self.config.motor.max_rpm)
    }

    pub fn describe(&self) -> String {
        match (&self.simulated, self.session.peer()) {
            (Some(_), _) => "simulated drive".to_string(),
            (None, Some(peer)) => peer.to_string(),
            (None, None) => "drive".to_string(),
        }
    }
}

/// One-shot 模式
pub struct OneShotMode {
    config: CliConfig,
    simulate: bool,
}

impl OneShotMode {
    pub fn new(connect: ConnectArgs) -> Result<Self> {
        Ok(Self {
            config: connect.load()?,
            simulate: connect.simulate,
        })
    }

    async fn connect(&self) -> Result<Arc<Connection>> {
        let config = self.config.clone();
        let simulate = self.simulate;
        let connection = utils::blocking(move || Connection::open(config, simulate)).await?;
        eprintln!("✅ Connected to {}", connection.describe());
        Ok(Arc::new(connection))
    }

    /// 在阻塞线程中对会话执行一个操作
    async fn run<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> Result<()> + Send + 'static,
    {
        let connection = self.connect().await?;
        utils::blocking(move || f(connection.as_ref())).await
    }

    /// 身份信息与报警
    pub async fn probe(&self) -> Result<()> {
        self.run(|connection| {
            let info = escl_sdk::client::drive_info(&connection.session)
                .context("Drive identity query failed")?;
            println!("{}", info);
            let report = escl_sdk::client::check_alarms(&connection.session, false)?;
            if report.is_clear() {
                println!("Alarms:    none");
            } else {
                println!("Alarms:    {}", report.descriptions().join(", "));
            }
            Ok(())
        })
        .await
    }

    /// 初始化
    pub async fn init(&self) -> Result<()> {
        self.run(|connection| {
            println!("⏳ Initializing drive...");
            let applied = escl_sdk::initialize(&connection.session, &connection.config.motor)
                .context("Initialization failed")?;
            for mnemonic in &applied.skipped {
                println!("⚠️  {} not supported by this firmware, skipped", mnemonic);
            }
            println!(
                "✅ Initialized: {} A run / {} A idle, {} steps/rev, jog accel {} rev/s²",
                applied.run_current,
                applied.idle_current,
                applied.resolution,
                applied.jog_acceleration
            );
            Ok(())
        })
        .await
    }

    pub async fn spin(&self, args: SpinCommand) -> Result<()> {
        self.run(move |connection| args.execute(connection)).await
    }

    pub async fn speed(&self, args: SpeedCommand) -> Result<()> {
        self.run(move |connection| args.execute(connection)).await
    }

    pub async fn stop(&self, args: StopCommand) -> Result<()> {
        self.run(move |connection| args.execute(connection)).await
    }

    pub async fn status(&self, args: StatusCommand) -> Result<()> {
        self.run(move |connection| args.execute(connection)).await
    }

    pub async fn monitor(&self, args: MonitorCommand) -> Result<()> {
        let connection = self.connect().await?;
        args.execute(connection).await
    }

    pub async fn raw(&self, args: RawCommand) -> Result<()> {
        self.run(move |connection| args.execute(connection)).await
    }

    pub async fn selftest(&self, args: SelftestCommand) -> Result<()> {
        if !args.confirm()? {
            println!("❌ Cancelled");
            return Ok(());
        }
        self.run(move |connection| args.execute(connection)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let args = ConnectArgs {
            ip: Some("10.10.10.10".parse().unwrap()),
            port: Some(7000),
            timeout_ms: Some(250),
            ..ConnectArgs::default()
        };
        let mut config = CliConfig::default();
        args.apply(&mut config);
        assert_eq!(config.connection.drive_ip, Some("10.10.10.10".parse().unwrap()));
        assert_eq!(config.connection.drive_port, 7000);
        assert_eq!(config.connection.local_port, 7777);
        assert_eq!(config.connection.timeout_ms, 250);
    }

    #[test]
    fn test_missing_address_is_reported() {
        let err = Connection::open(CliConfig::default(), false).err().unwrap();
        assert!(err.to_string().contains("No drive address"));
    }

    #[test]
    fn test_simulated_connection() {
        let connection = Connection::open(CliConfig::default(), true).unwrap();
        assert_eq!(connection.describe(), "simulated drive");
        assert!(connection.session.options().command_gap.is_zero());

        escl_sdk::initialize(&connection.session, &connection.config.motor).unwrap();
        let motion = connection.motion();
        motion.spin(escl_sdk::Rpm(120.0)).unwrap();
        let drive = connection.simulated.as_ref().unwrap();
        assert!(drive.is_jogging());
        assert_eq!(drive.target_rpm(), 120.0);
    }
}
