//! 点动控制命令（spin / speed / stop）

use crate::modes::oneshot::Connection;
use crate::utils::parse_rpm;
use anyhow::{Context, Result};
use clap::Args;
use escl_sdk::{MotionState, Rpm};

/// 点动参数
#[derive(Args, Debug, Clone)]
pub struct SpinCommand {
    /// 转速（RPM），负值为逆时针
    #[arg(allow_hyphen_values = true)]
    pub rpm: String,

    /// 跳过初始化（驱动器已在本进程外完成配置时使用）
    #[arg(long)]
    pub no_init: bool,
}

impl SpinCommand {
    pub fn execute(&self, connection: &Connection) -> Result<()> {
        let rpm = Rpm(parse_rpm(&self.rpm)?);

        if !self.no_init {
            println!("⏳ Initializing drive...");
            escl_sdk::initialize(&connection.session, &connection.config.motor)
                .context("Initialization failed")?;
        }

        let motion = connection.motion();
        let state = motion.spin(rpm).with_context(|| format!("Failed to spin at {} rpm", rpm.0))?;
        println!("✅ {}", state);
        Ok(())
    }
}

/// 变速参数
#[derive(Args, Debug, Clone)]
pub struct SpeedCommand {
    /// 新转速（RPM，带符号，负值直接反向）
    #[arg(allow_hyphen_values = true)]
    pub rpm: String,
}

impl SpeedCommand {
    pub fn execute(&self, connection: &Connection) -> Result<()> {
        let rpm = Rpm(parse_rpm(&self.rpm)?);
        let motion = connection.motion();

        // 新进程不知道驱动器是否在点动，先按实际状态重建
        let current = motion.reconcile().context("Failed to read drive state")?;
        if !current.is_jogging() {
            anyhow::bail!("Drive is not jogging ({}), use `spin` first", current);
        }

        let state = motion
            .change_speed(rpm)
            .with_context(|| format!("Failed to change speed to {} rpm", rpm.0))?;
        println!("✅ {}", state);
        Ok(())
    }
}

/// 停止参数
#[derive(Args, Debug, Clone)]
pub struct StopCommand {
    /// 立即停止（ST），不按减速度减速
    #[arg(long)]
    pub immediate: bool,

    /// 停止后失能电机
    #[arg(long)]
    pub disable: bool,
}

impl StopCommand {
    pub fn execute(&self, connection: &Connection) -> Result<()> {
        if self.stop(connection)? == MotionState::Disabled {
            println!("✅ Stopped, motor disabled");
        } else {
            println!("✅ Stopped");
        }
        Ok(())
    }

    /// 停止并返回驱动器的实际状态
    pub fn stop(&self, connection: &Connection) -> Result<MotionState> {
        let motion = connection.motion();

        // 使能状态以驱动器为准，不能由本进程是否初始化推断
        motion.reconcile().context("Failed to read drive state")?;
        let state = if self.immediate {
            motion.stop_immediate()
        } else {
            motion.stop()
        }
        .context("Stop was not acknowledged")?;

        if self.disable {
            return motion.disable().context("Failed to disable motor");
        }
        Ok(state)
    }
}
