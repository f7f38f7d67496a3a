//! 自动化自检
//!
//! 依次执行：身份信息 → 报警检查（并复位）→ 初始化 → 正转 → 反转 → 停止 → 关闭会话。
//! 每一步等待观测到的运动阶段收敛后再进行下一步。

use crate::modes::oneshot::Connection;
use anyhow::{Context, Result};
use clap::Args;
use escl_sdk::client::{ObservedPhase, StatusSnapshot, check_alarms, drive_info, wait_until};
use escl_sdk::Rpm;
use std::time::Duration;

/// 等待速度收敛的超时
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);
const SETTLE_INTERVAL: Duration = Duration::from_millis(100);

/// 自检参数
#[derive(Args, Debug, Clone)]
pub struct SelftestCommand {
    /// 跳过确认提示
    #[arg(short, long)]
    pub yes: bool,

    /// 测试转速（RPM，取绝对值）
    #[arg(long, default_value_t = 60.0)]
    pub rpm: f64,

    /// 每个方向保持的时间（ms）
    #[arg(long, default_value_t = 2000)]
    pub dwell_ms: u64,
}

impl SelftestCommand {
    /// 运行前确认（电机会转动）
    pub fn confirm(&self) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }
        println!("⚠️  The self test spins the motor in both directions at {} rpm", self.rpm.abs());
        inquire::Confirm::new("Continue?")
            .with_default(false)
            .prompt()
            .map_err(|e| anyhow::anyhow!("Confirmation failed: {}", e))
    }

    pub fn execute(&self, connection: &Connection) -> Result<()> {
        let rpm = self.rpm.abs();
        if rpm == 0.0 || !rpm.is_finite() {
            anyhow::bail!("Test speed must be a non-zero number");
        }

        let result = self.run_steps(connection, rpm);
        // 无论成败都关闭会话（ST + MD）
        connection.session.close();

        match &result {
            Ok(()) => println!("✅ Self test passed"),
            Err(_) => println!("❌ Self test failed"),
        }
        result
    }

    fn run_steps(&self, connection: &Connection, rpm: f64) -> Result<()> {
        let session = &connection.session;
        let dwell = Duration::from_millis(self.dwell_ms);

        println!("[1/7] Reading drive identity");
        let info = drive_info(session).context("Drive identity query failed")?;
        println!("{}", info);

        println!("[2/7] Checking alarms");
        let report = check_alarms(session, true).context("Alarm check failed")?;
        if !report.is_clear() {
            anyhow::bail!("Alarms remain after reset: {}", report.descriptions().join(", "));
        }

        println!("[3/7] Initializing");
        escl_sdk::initialize(session, &connection.config.motor).context("Initialization failed")?;
        let motion = connection.motion();

        println!("[4/7] Spinning at {} rpm", rpm);
        motion.spin(Rpm(rpm))?;
        let snapshot = settle(session, ObservedPhase::AtSpeed)?;
        println!("      {} rpm", snapshot.actual_rpm);
        std::thread::sleep(dwell);

        println!("[5/7] Reversing to {} rpm", -rpm);
        motion.change_speed(Rpm(-rpm))?;
        let snapshot = settle(session, ObservedPhase::AtSpeed)?;
        if snapshot.actual_rpm >= 0 {
            anyhow::bail!("Direction did not reverse ({} rpm)", snapshot.actual_rpm);
        }
        println!("      {} rpm", snapshot.actual_rpm);
        std::thread::sleep(dwell);

        println!("[6/7] Stopping");
        motion.stop()?;
        settle(session, ObservedPhase::Stationary)?;

        println!("[7/7] Closing session");
        Ok(())
    }
}

fn settle(session: &escl_sdk::ControllerSession, phase: ObservedPhase) -> Result<StatusSnapshot> {
    wait_until(session, SETTLE_TIMEOUT, SETTLE_INTERVAL, |snapshot| {
        snapshot.phase() == phase
    })
    .with_context(|| format!("Drive did not reach {}", phase))
}
