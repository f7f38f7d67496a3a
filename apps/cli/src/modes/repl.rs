//! REPL 模式
//!
//! 交互式 Shell，会话与运动状态在命令之间保持。
//! 输入在专用线程中读取（rustyline 是阻塞 API），通过 crossbeam channel 交给主任务。

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded};
use escl_sdk::client::{check_alarms, drive_info};
use escl_sdk::{MotionController, MotionState, Rpm};
use rustyline::Editor;
use std::sync::Arc;
use std::thread;

use super::oneshot::{ConnectArgs, Connection};
use crate::utils;

/// 输入线程发给主任务的 Ctrl+C 标记
const INTERRUPT: &str = "SIGINT";

/// REPL 会话
pub struct ReplSession {
    connect: ConnectArgs,
    connection: Option<Arc<Connection>>,
    motion: Option<Arc<MotionController>>,
}

impl ReplSession {
    pub fn new(connect: ConnectArgs) -> Self {
        Self {
            connect,
            connection: None,
            motion: None,
        }
    }

    /// 连接状态描述
    pub fn status(&self) -> String {
        match (&self.connection, &self.motion) {
            (Some(connection), Some(motion)) => {
                format!("connected to {}, {}", connection.describe(), motion.state())
            },
            _ => "not connected".to_string(),
        }
    }

    /// 建立会话（`target` 为 IP 或 `sim`，省略时使用配置）
    pub async fn connect(&mut self, target: Option<&str>) -> Result<()> {
        if self.connection.is_some() {
            self.disconnect().await?;
        }

        let mut args = self.connect.clone();
        match target {
            Some("sim") | Some("simulate") => args.simulate = true,
            Some(ip) => {
                args.ip = Some(ip.parse().with_context(|| format!("Invalid IP address {:?}", ip))?);
                args.simulate = false;
            },
            None => {},
        }

        let config = args.load()?;
        let simulate = args.simulate;
        let connection = utils::blocking(move || Connection::open(config, simulate)).await?;
        let connection = Arc::new(connection);
        println!("✅ Connected to {}", connection.describe());

        self.motion = Some(Arc::new(connection.motion()));
        self.connection = Some(connection);
        Ok(())
    }

    /// 关闭会话（发送 ST/MD）
    pub async fn disconnect(&mut self) -> Result<()> {
        self.motion = None;
        if let Some(connection) = self.connection.take() {
            utils::blocking(move || {
                connection.session.close();
                Ok(())
            })
            .await?;
            println!("✅ Disconnected");
        }
        Ok(())
    }

    fn connection(&self) -> Result<Arc<Connection>> {
        self.connection
            .clone()
            .context("Not connected, use 'connect [ip|sim]' first")
    }

    fn motion(&self) -> Result<Arc<MotionController>> {
        self.motion
            .clone()
            .context("Not connected, use 'connect [ip|sim]' first")
    }

    /// 初始化后重建控制器（初始状态取决于是否已初始化）
    pub async fn init(&mut self) -> Result<()> {
        let connection = self.connection()?;
        let conn = connection.clone();
        let applied = utils::blocking(move || {
            Ok(escl_sdk::initialize(&conn.session, &conn.config.motor)?)
        })
        .await
        .context("Initialization failed")?;
        for mnemonic in &applied.skipped {
            println!("⚠️  {} not supported by this firmware, skipped", mnemonic);
        }
        self.motion = Some(Arc::new(connection.motion()));
        println!("✅ Initialized");
        Ok(())
    }

    /// 在阻塞线程中执行运动操作并打印新状态
    async fn motion_op<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&MotionController) -> Result<MotionState, escl_sdk::MotionError>
            + Send
            + 'static,
    {
        let motion = self.motion()?;
        let state = utils::blocking(move || Ok(f(motion.as_ref())?)).await?;
        println!("✅ {}", state);
        Ok(())
    }

    /// 急停（ST），未连接时忽略
    pub async fn emergency_stop(&self) {
        let Some(motion) = self.motion.clone() else {
            return;
        };
        match utils::blocking(move || Ok(motion.stop_immediate()?)).await {
            Ok(state) => eprintln!("🛑 Stopped ({})", state),
            Err(e) => eprintln!("❌ Emergency stop failed: {:#}", e),
        }
    }
}

/// REPL 输入（专用输入线程）
pub struct ReplInput {
    command_rx: Receiver<String>,
    _input_thread: thread::JoinHandle<Result<()>>,
}

impl ReplInput {
    /// 创建专用输入线程（保留历史记录）
    pub fn new() -> Self {
        let (command_tx, command_rx) = bounded::<String>(10);

        let input_thread = thread::spawn(move || {
            use rustyline::history::DefaultHistory;

            let mut rl = Editor::<(), DefaultHistory>::new()
                .map_err(|e| anyhow::anyhow!("Failed to initialize readline: {}", e))?;

            let history_path = ".escl_history";
            rl.load_history(history_path).ok();

            println!("eSCL CLI v{} - interactive shell", env!("CARGO_PKG_VERSION"));
            println!("Type 'help' for commands, 'exit' to quit");
            println!();

            loop {
                match rl.readline("escl> ") {
                    Ok(line) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }

                        if line == "exit" || line == "quit" {
                            rl.save_history(history_path).ok();
                            let _ = command_tx.send(line);
                            break;
                        }

                        let _ = rl.add_history_entry(line.clone());
                        if command_tx.send(line).is_err() {
                            break;
                        }
                    },

                    Err(rustyline::error::ReadlineError::Interrupted) => {
                        // Ctrl+C 在提示符处：交给主任务急停
                        println!("^C");
                        let _ = command_tx.send(INTERRUPT.to_string());
                    },

                    Err(rustyline::error::ReadlineError::Eof) => {
                        rl.save_history(history_path).ok();
                        let _ = command_tx.send("exit".to_string());
                        break;
                    },

                    Err(err) => {
                        eprintln!("Error: {:?}", err);
                        let _ = command_tx.send("exit".to_string());
                        break;
                    },
                }
            }

            Ok(())
        });

        Self {
            command_rx,
            _input_thread: input_thread,
        }
    }

    /// 等待用户输入（输入线程结束时返回 None）
    pub async fn recv_command(&self) -> Option<String> {
        let rx = self.command_rx.clone();
        tokio::task::spawn_blocking(move || rx.recv())
            .await
            .ok()
            .and_then(|result| result.ok())
    }
}

/// 运行 REPL 模式
pub async fn run_repl(connect: ConnectArgs) -> Result<()> {
    let auto_connect = connect.simulate || connect.ip.is_some();
    let mut session = ReplSession::new(connect);
    let input = ReplInput::new();

    println!();
    if auto_connect {
        if let Err(err) = session.connect(None).await {
            eprintln!("❌ Error: {:#}", err);
        }
    } else {
        println!("💡 Use 'connect <ip>' or 'connect sim', then 'init' and 'spin <rpm>'");
    }
    println!();

    loop {
        tokio::select! {
            line = input.recv_command() => {
                let Some(line) = line else {
                    break;
                };

                match line.as_str() {
                    INTERRUPT => session.emergency_stop().await,

                    "exit" | "quit" => break,

                    "help" => print_help(),

                    _ => {
                        if let Err(err) = handle_command(&line, &mut session).await {
                            eprintln!("❌ Error: {:#}", err);
                            print_help_hint(&line);
                        }
                    },
                }
            }

            // 命令执行期间的 Ctrl+C（终端未处于 raw 模式）
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n🛑 Ctrl+C");
                session.emergency_stop().await;
            }
        }
    }

    session.disconnect().await?;
    println!("👋 Bye");
    Ok(())
}

/// 处理命令
async fn handle_command(line: &str, session: &mut ReplSession) -> Result<()> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(&command) = parts.first() else {
        return Ok(());
    };

    match command {
        "connect" => session.connect(parts.get(1).copied()).await?,

        "disconnect" => session.disconnect().await?,

        "init" => session.init().await?,

        "spin" => {
            let rpm = Rpm(utils::parse_rpm(argument(&parts, "spin <rpm>")?)?);
            session.motion_op(move |motion| motion.spin(rpm)).await?;
        },

        "speed" => {
            let rpm = Rpm(utils::parse_rpm(argument(&parts, "speed <rpm>")?)?);
            session.motion_op(move |motion| motion.change_speed(rpm)).await?;
        },

        "stop" => session.motion_op(|motion| motion.stop()).await?,

        "estop" => session.motion_op(|motion| motion.stop_immediate()).await?,

        "enable" => session.motion_op(|motion| motion.enable()).await?,

        "disable" => session.motion_op(|motion| motion.disable()).await?,

        "sync" => session.motion_op(|motion| motion.reconcile()).await?,

        "state" => println!("📊 {}", session.status()),

        "status" => {
            let connection = session.connection()?;
            let snapshot =
                utils::blocking(move || Ok(escl_sdk::poll(&connection.session)?)).await?;
            print!("{}", snapshot);
            if let Ok(motion) = session.motion() {
                println!("Logical:       {}", motion.state());
            }
        },

        "alarms" => {
            let clear = parts.get(1) == Some(&"clear");
            let connection = session.connection()?;
            let report =
                utils::blocking(move || Ok(check_alarms(&connection.session, clear)?)).await?;
            if report.alarms.is_empty() {
                println!("✅ No alarms");
            } else {
                println!("⚠️  {}", report.descriptions().join(", "));
                if clear {
                    if report.is_clear() {
                        println!("✅ Alarms cleared");
                    } else {
                        println!("❌ Alarms remain after reset");
                    }
                }
            }
        },

        "info" => {
            let connection = session.connection()?;
            let info = utils::blocking(move || Ok(drive_info(&connection.session)?)).await?;
            println!("{}", info);
        },

        "raw" => {
            let text = line
                .trim_start()
                .strip_prefix("raw")
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .context("Usage: raw <command>")?
                .to_string();
            let connection = session.connection()?;
            let reply =
                utils::blocking(move || Ok(connection.session.lock()?.raw(&text)?)).await?;
            println!("{}", reply);
        },

        _ => anyhow::bail!("Unknown command: {}", command),
    }

    Ok(())
}

fn argument<'a>(parts: &[&'a str], usage: &str) -> Result<&'a str> {
    parts
        .get(1)
        .copied()
        .with_context(|| format!("Usage: {}", usage))
}

/// 打印帮助信息
fn print_help() {
    println!("Commands:");
    println!("  connect [ip|sim]              Open a session (default: configured drive)");
    println!("  disconnect                    Stop, disable and close the session");
    println!("  init                          Run the initialization sequence");
    println!("  spin <rpm>                    Jog at rpm (negative = counter-clockwise)");
    println!("  speed <rpm>                   Change speed while jogging");
    println!("  stop                          Stop jogging (decelerate)");
    println!("  estop                         Stop immediately");
    println!("  enable / disable              Motor enable / disable");
    println!("  sync                          Rebuild state from the drive");
    println!("  state                         Show session and motion state");
    println!("  status                        Poll drive status");
    println!("  alarms [clear]                Read (and reset) alarms");
    println!("  info                          Drive identity");
    println!("  raw <command>                 Send a raw command");
    println!("  help                          Show this help");
    println!("  exit / quit                   Leave the shell");
    println!();
    println!("Keys:");
    println!("  Ctrl+C                        Emergency stop");
    println!("  Ctrl+D                        Exit");
    println!();
}

/// 提供基于错误的帮助提示
fn print_help_hint(command: &str) {
    if command.starts_with("spin") || command.starts_with("speed") {
        eprintln!("💡 Hint: 'init' before 'spin', 'speed' only works while jogging");
    } else if command.starts_with("connect") {
        eprintln!("💡 Hint: 'connect 192.168.1.10' or 'connect sim'");
    } else {
        eprintln!("💡 Hint: type 'help' for all commands");
    }
}
