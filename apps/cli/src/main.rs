//! # eSCL CLI
//!
//! Command-line interface for eSCL stepper drives over Ethernet.
//!
//! ## 双模式架构
//!
//! ### One-shot 模式（推荐用于脚本）
//!
//! ```bash
//! # 配置默认驱动器地址
//! escl-cli config set --ip 192.168.1.10
//!
//! # 每条命令独立建立会话
//! escl-cli init
//! escl-cli spin -- -100
//! escl-cli speed 150
//! escl-cli status --json
//! escl-cli stop
//! ```
//!
//! ### REPL 模式（推荐用于调试）
//!
//! ```bash
//! $ escl-cli shell
//! escl> connect 192.168.1.10
//! escl> init
//! escl> spin 100
//! escl> status
//! escl> stop
//! escl> exit
//! ```
//!
//! 所有命令都接受 `--simulate`，使用内置的模拟驱动器代替真实硬件。

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod modes;
mod utils;

use commands::{
    ConfigCommand, DiscoverCommand, MonitorCommand, RawCommand, SelftestCommand, SpeedCommand,
    SpinCommand, StatusCommand, StopCommand,
};
use modes::oneshot::{ConnectArgs, OneShotMode};
use modes::repl::run_repl;

/// eSCL CLI - 步进驱动器命令行工具
#[derive(Parser, Debug)]
#[command(name = "escl-cli")]
#[command(about = "Command-line interface for eSCL stepper drives", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connect: ConnectArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 读取驱动器身份信息与报警
    Probe,

    /// 按旋钮地址表或网段查找驱动器
    Discover(DiscoverCommand),

    /// 执行初始化序列
    Init,

    /// 初始化后以指定转速点动（负值为逆时针）
    Spin(SpinCommand),

    /// 点动中改变转速
    Speed(SpeedCommand),

    /// 停止点动
    Stop(StopCommand),

    /// 查询一次状态
    Status(StatusCommand),

    /// 周期查询状态，Ctrl+C 退出
    Monitor(MonitorCommand),

    /// 发送原始指令并打印应答
    Raw(RawCommand),

    /// 自动化自检（会转动电机）
    Selftest(SelftestCommand),

    /// 启动交互式 Shell（REPL 模式）
    Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    escl_sdk::logging::init()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&cli.connect),

        Commands::Discover(cmd) => cmd.execute(&cli.connect).await,

        Commands::Shell => run_repl(cli.connect).await,

        Commands::Probe => OneShotMode::new(cli.connect)?.probe().await,
        Commands::Init => OneShotMode::new(cli.connect)?.init().await,
        Commands::Spin(args) => OneShotMode::new(cli.connect)?.spin(args).await,
        Commands::Speed(args) => OneShotMode::new(cli.connect)?.speed(args).await,
        Commands::Stop(args) => OneShotMode::new(cli.connect)?.stop(args).await,
        Commands::Status(args) => OneShotMode::new(cli.connect)?.status(args).await,
        Commands::Monitor(args) => OneShotMode::new(cli.connect)?.monitor(args).await,
        Commands::Raw(args) => OneShotMode::new(cli.connect)?.raw(args).await,
        Commands::Selftest(args) => OneShotMode::new(cli.connect)?.selftest(args).await,
    }
}
