//! 报警诊断与驱动器身份信息

use escl_driver::{ControllerSession, DriverError};
use escl_protocol::{AlarmFlags, Command, Mnemonic, ModelInfo, StatusLetter};
use tracing::{info, warn};

/// 报警检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlarmReport {
    /// 检查时的报警位
    pub alarms: AlarmFlags,
    /// 复位后重新读取的报警位（未请求复位时为 `None`）
    pub after_reset: Option<AlarmFlags>,
}

impl AlarmReport {
    /// 报警描述（含未知位）
    pub fn descriptions(&self) -> Vec<String> {
        self.alarms.describe()
    }

    /// 当前是否仍有报警
    pub fn is_clear(&self) -> bool {
        self.after_reset.unwrap_or(self.alarms).is_empty()
    }
}

/// 读取报警码，`clear` 为真且存在报警时发送 `AR` 并重新读取
pub fn check_alarms(session: &ControllerSession, clear: bool) -> Result<AlarmReport, DriverError> {
    let mut guard = session.lock()?;
    let alarms = read_alarms(&mut guard)?;
    if alarms.is_empty() {
        info!("No alarms");
        return Ok(AlarmReport {
            alarms,
            after_reset: None,
        });
    }

    warn!("Drive alarms: {}", alarms);
    if !clear {
        return Ok(AlarmReport {
            alarms,
            after_reset: None,
        });
    }

    guard.execute(&Command::new(Mnemonic::AlarmReset)?)?;
    let after = read_alarms(&mut guard)?;
    if after.is_empty() {
        info!("Alarms cleared");
    } else {
        warn!("Alarms remain after reset: {}", after);
    }
    Ok(AlarmReport {
        alarms,
        after_reset: Some(after),
    })
}

fn read_alarms(guard: &mut escl_driver::SessionGuard<'_>) -> Result<AlarmFlags, DriverError> {
    let value = guard.query(Mnemonic::AlarmCode)?;
    Ok(AlarmFlags::from_bits_retain(value.as_hex_u16()?))
}

/// 驱动器身份信息
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriveInfo {
    /// `RV` 固件版本
    pub firmware_revision: String,
    /// `MV` 型号与版本
    pub model: ModelInfo,
    /// `RS` 状态字母
    pub status: Vec<StatusLetter>,
    /// 网络看门狗使能（部分固件不支持）
    pub watchdog_enabled: Option<bool>,
    /// 网络看门狗延时（ms）
    pub watchdog_delay: Option<i64>,
}

impl std::fmt::Display for DriveInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Firmware:  {}", self.firmware_revision)?;
        writeln!(f, "Model:     {}", self.model)?;
        let status: Vec<_> = self.status.iter().map(|s| s.description()).collect();
        writeln!(f, "Status:    {}", status.join(", "))?;
        match (self.watchdog_enabled, self.watchdog_delay) {
            (Some(enabled), Some(delay)) => {
                write!(f, "Watchdog:  {} ({} ms)", if enabled { "on" } else { "off" }, delay)
            },
            (Some(enabled), None) => write!(f, "Watchdog:  {}", if enabled { "on" } else { "off" }),
            _ => write!(f, "Watchdog:  unsupported"),
        }
    }
}

/// 读取 `RV`、`MV`、`RS`、`ZE`、`ZS`
///
/// `ZE`/`ZS` 被拒绝时记为 `None`，其余查询失败直接返回错误。
pub fn drive_info(session: &ControllerSession) -> Result<DriveInfo, DriverError> {
    let mut guard = session.lock()?;
    let firmware_revision = guard.query(Mnemonic::FirmwareRevision)?.raw().to_string();
    let model = ModelInfo::parse(guard.query(Mnemonic::ModelRevision)?.raw())?;
    let status = StatusLetter::parse_all(guard.query(Mnemonic::StatusLetters)?.raw())?;

    let watchdog_enabled = optional(guard.query(Mnemonic::WatchdogEnabled))?
        .map(|value| value.as_i64().map(|v| v != 0))
        .transpose()?;
    let watchdog_delay = optional(guard.query(Mnemonic::WatchdogDelay))?
        .map(|value| value.as_i64())
        .transpose()?;

    info!("Drive {} (firmware {})", model, firmware_revision);
    Ok(DriveInfo {
        firmware_revision,
        model,
        status,
        watchdog_enabled,
        watchdog_delay,
    })
}

/// 驱动器以错误应答拒绝的查询视为不支持
fn optional<T>(result: Result<T, DriverError>) -> Result<Option<T>, DriverError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(DriverError::Command(e)) if !e.timed_out() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escl_transport::mock::{ScriptedTransport, SimulatedDrive};

    #[test]
    fn test_no_alarms() {
        let drive = SimulatedDrive::new();
        let session = ControllerSession::with_transport(drive.clone());
        let report = check_alarms(&session, true).unwrap();
        assert!(report.is_clear());
        assert_eq!(report.after_reset, None);
        assert_eq!(drive.sent(), vec!["AL"]);
    }

    #[test]
    fn test_alarms_reported_without_clear() {
        let drive = SimulatedDrive::new();
        drive.set_alarm(0x0048);
        let session = ControllerSession::with_transport(drive.clone());
        let report = check_alarms(&session, false).unwrap();
        assert!(!report.is_clear());
        assert_eq!(report.descriptions().len(), 2);
        assert_eq!(drive.sent(), vec!["AL"]);
    }

    #[test]
    fn test_alarms_cleared() {
        let drive = SimulatedDrive::new();
        drive.set_alarm(0x0008);
        let session = ControllerSession::with_transport(drive.clone());
        let report = check_alarms(&session, true).unwrap();
        assert_eq!(report.alarms, AlarmFlags::OVER_TEMPERATURE);
        assert_eq!(report.after_reset, Some(AlarmFlags::empty()));
        assert!(report.is_clear());
        assert_eq!(drive.sent(), vec!["AL", "AR", "AL"]);
    }

    #[test]
    fn test_drive_info() {
        let session = ControllerSession::with_transport(SimulatedDrive::new());
        let info = drive_info(&session).unwrap();
        assert_eq!(info.firmware_revision, "107");
        assert_eq!(info.model.model_code, "050");
        assert_eq!(info.watchdog_enabled, Some(false));
        assert_eq!(info.watchdog_delay, Some(0));
        assert!(info.to_string().contains("Firmware:  107"));
    }

    #[test]
    fn test_drive_info_without_watchdog() {
        let script = ScriptedTransport::new()
            .reply("RV=107")
            .reply("MV=1070050D")
            .reply("RS=R")
            .reply("?2")
            .reply("?2");
        let session = ControllerSession::with_transport(script);
        let info = drive_info(&session).unwrap();
        assert_eq!(info.model.family(), Some("STM23-Q"));
        assert_eq!(info.model.sub_model, Some('D'));
        assert_eq!(info.watchdog_enabled, None);
        assert_eq!(info.watchdog_delay, None);
        assert!(info.to_string().contains("unsupported"));
    }
}
