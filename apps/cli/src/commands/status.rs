//! 状态查询命令（status / monitor）

use crate::modes::oneshot::Connection;
use crate::utils;
use anyhow::{Context, Result};
use clap::Args;
use escl_sdk::client::{ObservedPhase, StatusSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 单次状态查询
#[derive(Args, Debug, Clone)]
pub struct StatusCommand {
    /// 以 JSON 输出
    #[arg(long)]
    pub json: bool,
}

/// JSON 输出格式
#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    #[serde(flatten)]
    snapshot: &'a StatusSnapshot,
    phase: ObservedPhase,
    status_flags: Vec<&'static str>,
    alarm_descriptions: Vec<String>,
}

impl StatusCommand {
    pub fn execute(&self, connection: &Connection) -> Result<()> {
        let snapshot = escl_sdk::poll(&connection.session).context("Status poll failed")?;
        if self.json {
            println!("{}", render_json(&snapshot)?);
        } else {
            print!("{}", snapshot);
        }
        Ok(())
    }
}

pub fn render_json(snapshot: &StatusSnapshot) -> Result<String> {
    let report = StatusReport {
        snapshot,
        phase: snapshot.phase(),
        status_flags: snapshot.status.describe(),
        alarm_descriptions: snapshot.alarms.describe(),
    };
    serde_json::to_string_pretty(&report).context("Failed to serialize status")
}

/// 周期查询
#[derive(Args, Debug, Clone)]
pub struct MonitorCommand {
    /// 查询间隔（ms）
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,

    /// 查询次数（默认直到 Ctrl+C）
    #[arg(short = 'n', long)]
    pub count: Option<u64>,
}

impl MonitorCommand {
    pub async fn execute(&self, connection: Arc<Connection>) -> Result<()> {
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl+C handler")?;

        println!("📊 Monitoring every {} ms, press Ctrl+C to stop\n", self.interval_ms);

        let interval = Duration::from_millis(self.interval_ms);
        let mut iteration = 0u64;
        while running.load(Ordering::SeqCst) {
            if self.count.is_some_and(|count| iteration >= count) {
                break;
            }
            iteration += 1;

            let conn = connection.clone();
            let snapshot = utils::blocking(move || Ok(escl_sdk::poll(&conn.session)?)).await?;
            println!("======== #{} ({}) ========", iteration, snapshot.phase());
            print!("{}", snapshot);

            if snapshot.has_alarms() {
                println!("⚠️  Alarms: {}", snapshot.alarms.describe().join(", "));
            }

            tokio::time::sleep(interval).await;
        }

        println!("✅ Monitor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escl_sdk::protocol::{AlarmFlags, StatusFlags};

    #[test]
    fn test_render_json() {
        let snapshot = StatusSnapshot {
            position: 1200,
            actual_rpm: 60,
            target_rpm: 60,
            status: StatusFlags::ENABLED | StatusFlags::JOGGING,
            alarms: AlarmFlags::empty(),
            temperature_c: 31.5,
            bus_voltage: 48.0,
            current: 1.2,
        };
        let json: serde_json::Value = serde_json::from_str(&render_json(&snapshot).unwrap()).unwrap();
        assert_eq!(json["position"], 1200);
        assert_eq!(json["target_rpm"], 60);
        assert_eq!(json["phase"], "AtSpeed");
        assert!(
            json["status_flags"]
                .as_array()
                .unwrap()
                .iter()
                .any(|flag| flag == "Jogging")
        );
        assert!(json["alarm_descriptions"].as_array().unwrap().is_empty());
    }
}
