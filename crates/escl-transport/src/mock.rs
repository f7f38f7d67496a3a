//! 无硬件测试后端
//!
//! - [`ScriptedTransport`]: 按预设顺序返回应答（`None` 表示超时），记录发送的指令
//! - [`SimulatedDrive`]: 解释 eSCL 指令的模拟驱动器，带点动加减速模型
//!
//! 两者都是 `Clone`，克隆体共享内部状态：测试保留一份克隆用于检查，
//! 另一份交给会话。

use crate::{Transport, TransportError};
use escl_protocol::Mnemonic;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// 模拟超时时报告的时长（模拟后端不会真正等待）
const SIMULATED_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// ScriptedTransport
// ============================================================================

#[derive(Default)]
struct Script {
    replies: VecDeque<Option<String>>,
    sent: Vec<String>,
    pending: Option<Option<String>>,
}

/// 按脚本应答的传输
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条应答
    pub fn reply(self, text: &str) -> Self {
        self.inner.lock().replies.push_back(Some(text.to_string()));
        self
    }

    /// 追加一次超时
    pub fn timeout(self) -> Self {
        self.inner.lock().replies.push_back(None);
        self
    }

    pub fn push_reply(&self, text: &str) {
        self.inner.lock().replies.push_back(Some(text.to_string()));
    }

    /// 已发送的指令
    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().sent.clone()
    }

    /// 剩余未消费的应答数量
    pub fn remaining(&self) -> usize {
        self.inner.lock().replies.len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        let mut script = self.inner.lock();
        script.sent.push(command.to_string());
        // 脚本耗尽视为超时
        let reply = script.replies.pop_front().flatten();
        script.pending = Some(reply);
        Ok(())
    }

    fn receive(&mut self) -> Result<String, TransportError> {
        match self.inner.lock().pending.take() {
            Some(Some(reply)) => Ok(reply),
            _ => Err(TransportError::Timeout(SIMULATED_TIMEOUT)),
        }
    }
}

// ============================================================================
// SimulatedDrive
// ============================================================================

/// 注入的应答覆盖
#[derive(Debug, Clone)]
struct Injection {
    reply: Option<String>,
    remaining: usize,
}

#[derive(Debug)]
struct DriveState {
    enabled: bool,
    hex_format: bool,
    control_mode: i64,
    resolution: f64,
    run_current: f64,
    idle_current: f64,
    jog_accel: f64,
    jog_decel: f64,
    jog_speed: f64,
    direction: f64,
    jogging: bool,
    /// rev/s，带符号
    target: f64,
    /// rev/s，带符号
    actual: f64,
    /// steps
    position: f64,
    alarm: u16,
    temperature_raw: i64,
    voltage_raw: i64,

    tick: f64,
    unsupported: HashSet<String>,
    precision_limits: HashMap<String, usize>,
    cs_keyed_reply: bool,
    injections: HashMap<String, Injection>,
    drop_rate: f64,
    rng: StdRng,

    sent: Vec<String>,
    pending: Option<String>,
}

impl DriveState {
    fn new(seed: u64) -> Self {
        Self {
            enabled: false,
            hex_format: false,
            control_mode: 7,
            resolution: 20000.0,
            run_current: 0.0,
            idle_current: 0.0,
            jog_accel: 10.0,
            jog_decel: 10.0,
            jog_speed: 1.0,
            direction: 1.0,
            jogging: false,
            target: 0.0,
            actual: 0.0,
            position: 0.0,
            alarm: 0,
            temperature_raw: 312,
            voltage_raw: 480,
            tick: 0.1,
            unsupported: HashSet::from(["VM".to_string()]),
            precision_limits: HashMap::new(),
            cs_keyed_reply: false,
            injections: HashMap::new(),
            drop_rate: 0.0,
            rng: StdRng::seed_from_u64(seed),
            sent: Vec::new(),
            pending: None,
        }
    }

    /// 推进物理模型
    fn advance(&mut self, dt: f64) {
        let delta = self.target - self.actual;
        if delta != 0.0 {
            // 远离零加速用 JA，趋向零减速用 JL
            let speeding_up =
                self.target.abs() > self.actual.abs() && self.target.signum() == self.actual.signum();
            let rate = if speeding_up || self.actual == 0.0 {
                self.jog_accel
            } else {
                self.jog_decel
            };
            let step = rate * dt;
            if delta.abs() <= step {
                self.actual = self.target;
            } else {
                self.actual += step * delta.signum();
            }
        }
        self.position += self.actual * self.resolution * dt;
    }

    fn status_code(&self) -> u16 {
        let mut code = 0u16;
        if self.enabled {
            code |= 0x0001;
        }
        if self.actual != 0.0 {
            code |= 0x0010;
        }
        if self.jogging {
            code |= 0x0020;
        }
        if !self.jogging && self.actual != 0.0 {
            code |= 0x0040;
        }
        if self.alarm != 0 {
            code |= 0x0200;
        }
        code
    }

    fn status_letters(&self) -> String {
        let mut letters = String::new();
        if self.alarm != 0 {
            letters.push('A');
        }
        if !self.enabled {
            letters.push('D');
        } else {
            letters.push('R');
        }
        if self.jogging {
            letters.push('J');
        }
        if self.actual != 0.0 {
            letters.push('F');
        }
        if !self.jogging && self.actual != 0.0 {
            letters.push('S');
        }
        letters
    }

    fn number(&self, key: &str, value: i64) -> String {
        if self.hex_format {
            format!("{}={:X}", key, value)
        } else {
            format!("{}={}", key, value)
        }
    }

    /// 解释一条指令并生成应答（`None` 表示不应答）
    fn respond(&mut self, wire: &str) -> Option<String> {
        let Some((mnemonic, arg)) = Mnemonic::split_wire(wire) else {
            return Some("?".to_string());
        };
        let code = mnemonic.code();

        if let Some(injection) = self.injections.get_mut(code)
            && injection.remaining > 0
        {
            injection.remaining -= 1;
            return injection.reply.clone();
        }

        if self.unsupported.contains(code) {
            return Some("?".to_string());
        }

        if let Some(limit) = self.precision_limits.get(code)
            && let Some((_, frac)) = arg.split_once('.')
            && frac.len() > *limit
        {
            return Some("?".to_string());
        }

        let value = arg.parse::<f64>().ok();
        let ack = Some("%".to_string());

        match mnemonic {
            Mnemonic::MotorDisable => {
                self.enabled = false;
                self.jogging = false;
                self.target = 0.0;
                self.actual = 0.0;
                ack
            },
            Mnemonic::MotorEnable => {
                self.enabled = true;
                ack
            },
            Mnemonic::DataFormat => {
                self.hex_format = arg.eq_ignore_ascii_case("H");
                ack
            },
            Mnemonic::RunCurrent => self.store(value, |s, v| s.run_current = v),
            Mnemonic::IdleCurrent => self.store(value, |s, v| s.idle_current = v),
            Mnemonic::Resolution => self.store(value, |s, v| s.resolution = v),
            Mnemonic::JogAcceleration => self.store(value, |s, v| s.jog_accel = v),
            Mnemonic::JogDeceleration => self.store(value, |s, v| s.jog_decel = v),
            Mnemonic::JogSpeed => self.store(value, |s, v| s.jog_speed = v.abs()),
            Mnemonic::Direction => self.store(value, |s, v| {
                s.direction = if v < 0.0 { -1.0 } else { 1.0 }
            }),
            Mnemonic::ControlMode => self.store(value, |s, v| s.control_mode = v as i64),
            Mnemonic::IdleCurrentDelay
            | Mnemonic::Acceleration
            | Mnemonic::Deceleration
            | Mnemonic::MaxAcceleration
            | Mnemonic::MaxVelocity => self.store(value, |_, _| {}),
            Mnemonic::CommenceJog => {
                if !self.enabled || self.control_mode != 10 || self.alarm != 0 {
                    return Some("?1".to_string());
                }
                self.jogging = true;
                self.target = self.jog_speed * self.direction;
                ack
            },
            Mnemonic::ChangeJogSpeed => {
                let Some(v) = value else {
                    return Some("?".to_string());
                };
                if self.jogging {
                    self.target = v;
                }
                if self.cs_keyed_reply {
                    Some(format!("CS={}", arg))
                } else {
                    ack
                }
            },
            Mnemonic::StopJog => {
                self.jogging = false;
                self.target = 0.0;
                ack
            },
            Mnemonic::StopImmediate => {
                self.jogging = false;
                self.target = 0.0;
                self.actual = 0.0;
                ack
            },
            Mnemonic::AlarmReset => {
                self.alarm = 0;
                ack
            },
            Mnemonic::Position => Some(self.number("IP", self.position.round() as i64)),
            Mnemonic::ActualVelocity => Some(self.number("IV", (self.actual * 60.0).round() as i64)),
            Mnemonic::TargetVelocity => Some(self.number("IV", (self.target * 60.0).round() as i64)),
            Mnemonic::StatusCode => Some(format!("SC={:04X}", self.status_code())),
            Mnemonic::AlarmCode => Some(format!("AL={:04X}", self.alarm)),
            Mnemonic::Temperature => Some(self.number("IT", self.temperature_raw)),
            Mnemonic::BusVoltage => Some(self.number("IU", self.voltage_raw)),
            Mnemonic::Current => {
                let amps = if !self.enabled {
                    0.0
                } else if self.actual != 0.0 {
                    self.run_current
                } else {
                    self.idle_current
                };
                Some(self.number("IC", (amps * 100.0).round() as i64))
            },
            Mnemonic::FirmwareRevision => Some("RV=107".to_string()),
            Mnemonic::ModelRevision => Some("MV=1070050D".to_string()),
            Mnemonic::StatusLetters => Some(format!("RS={}", self.status_letters())),
            Mnemonic::WatchdogEnabled => Some("ZE=0".to_string()),
            Mnemonic::WatchdogDelay => Some("ZS=0".to_string()),
        }
    }

    fn store(&mut self, value: Option<f64>, apply: impl FnOnce(&mut Self, f64)) -> Option<String> {
        match value {
            Some(v) => {
                apply(self, v);
                Some("%".to_string())
            },
            None => Some("?".to_string()),
        }
    }
}

/// 模拟驱动器
///
/// 初始状态：失能、控制模式 7（脉冲方向）、无报警。每次请求推进 `tick`（默认 0.1 s）
/// 的物理时间；点动速度按 JA/JL 线性趋近目标。`VM` 默认不受支持（返回 `?`）。
#[derive(Clone)]
pub struct SimulatedDrive {
    inner: Arc<Mutex<DriveState>>,
}

impl Default for SimulatedDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDrive {
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// 指定随机种子（用于丢包注入）
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DriveState::new(seed))),
        }
    }

    /// 每次请求推进的物理时间
    pub fn set_tick(&self, tick: Duration) {
        self.inner.lock().tick = tick.as_secs_f64();
    }

    /// 丢弃应答的概率（0.0 ~ 1.0）
    pub fn set_drop_rate(&self, rate: f64) {
        self.inner.lock().drop_rate = rate.clamp(0.0, 1.0);
    }

    /// 将助记符标记为不受支持 / 支持
    pub fn set_unsupported(&self, code: &str, unsupported: bool) {
        let mut state = self.inner.lock();
        if unsupported {
            state.unsupported.insert(code.to_string());
        } else {
            state.unsupported.remove(code);
        }
    }

    /// 限制某助记符参数可接受的小数位数
    pub fn set_precision_limit(&self, code: &str, places: usize) {
        self.inner.lock().precision_limits.insert(code.to_string(), places);
    }

    /// `CS` 是否以 `CS=value` 形式应答
    pub fn set_cs_keyed_reply(&self, keyed: bool) {
        self.inner.lock().cs_keyed_reply = keyed;
    }

    /// 接下来 `times` 次该助记符的请求返回指定应答（`None` 为超时）
    pub fn inject(&self, code: &str, reply: Option<&str>, times: usize) {
        self.inner.lock().injections.insert(
            code.to_string(),
            Injection {
                reply: reply.map(str::to_string),
                remaining: times,
            },
        );
    }

    pub fn set_alarm(&self, bits: u16) {
        self.inner.lock().alarm = bits;
    }

    pub fn set_temperature_raw(&self, raw: i64) {
        self.inner.lock().temperature_raw = raw;
    }

    /// 已接收的全部指令
    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.inner.lock().sent.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    pub fn is_jogging(&self) -> bool {
        self.inner.lock().jogging
    }

    pub fn control_mode(&self) -> i64 {
        self.inner.lock().control_mode
    }

    /// 实际速度（RPM）
    pub fn actual_rpm(&self) -> f64 {
        self.inner.lock().actual * 60.0
    }

    /// 目标速度（RPM）
    pub fn target_rpm(&self) -> f64 {
        self.inner.lock().target * 60.0
    }

    /// 不经过请求直接推进物理时间
    pub fn advance(&self, dt: Duration) {
        self.inner.lock().advance(dt.as_secs_f64());
    }
}

impl Transport for SimulatedDrive {
    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        let mut state = self.inner.lock();
        state.sent.push(command.to_string());
        let tick = state.tick;
        state.advance(tick);

        let drop_rate = state.drop_rate;
        if drop_rate > 0.0 && state.rng.gen_bool(drop_rate) {
            trace!("SIM drop {}", command);
            state.pending = None;
            return Ok(());
        }

        let reply = state.respond(command);
        trace!("SIM {} -> {:?}", command, reply);
        state.pending = reply;
        Ok(())
    }

    fn receive(&mut self) -> Result<String, TransportError> {
        self.inner
            .lock()
            .pending
            .take()
            .ok_or(TransportError::Timeout(SIMULATED_TIMEOUT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_replies_in_order() {
        let mut transport = ScriptedTransport::new().reply("%").timeout().reply("SC=0001");
        assert_eq!(transport.request("MD").unwrap(), "%");
        assert!(transport.request("SC").unwrap_err().is_timeout());
        assert_eq!(transport.request("SC").unwrap(), "SC=0001");
        assert!(transport.request("SC").unwrap_err().is_timeout());
        assert_eq!(transport.sent(), vec!["MD", "SC", "SC", "SC"]);
    }

    #[test]
    fn test_simulated_jog_reaches_target() {
        let mut drive = SimulatedDrive::new();
        for cmd in ["ME", "CM10", "JA10", "JL10", "JS2.5", "DI-1", "CJ"] {
            assert_eq!(drive.request(cmd).unwrap(), "%", "{}", cmd);
        }
        drive.advance(Duration::from_secs(1));
        assert_eq!(drive.request("IV1").unwrap(), "IV=-150");
        assert_eq!(drive.request("IV0").unwrap(), "IV=-150");
        assert_eq!(drive.request("SC").unwrap(), "SC=0031");

        assert_eq!(drive.request("SJ").unwrap(), "%");
        assert_eq!(drive.request("IV1").unwrap(), "IV=0");
        drive.advance(Duration::from_secs(1));
        assert_eq!(drive.request("IV0").unwrap(), "IV=0");
        assert_eq!(drive.request("SC").unwrap(), "SC=0001");
    }

    #[test]
    fn test_simulated_jog_requires_velocity_mode() {
        let mut drive = SimulatedDrive::new();
        drive.request("ME").unwrap();
        assert_eq!(drive.request("CJ").unwrap(), "?1");
    }

    #[test]
    fn test_simulated_quirks() {
        let mut drive = SimulatedDrive::new();
        assert_eq!(drive.request("VM10").unwrap(), "?");

        drive.set_precision_limit("CC", 1);
        assert_eq!(drive.request("CC1.25").unwrap(), "?");
        assert_eq!(drive.request("CC1.3").unwrap(), "%");

        drive.inject("SC", None, 1);
        assert!(drive.request("SC").unwrap_err().is_timeout());
        assert_eq!(drive.request("SC").unwrap(), "SC=0000");
    }

    #[test]
    fn test_drop_rate_is_deterministic_per_seed() {
        let run = |seed| {
            let mut drive = SimulatedDrive::with_seed(seed);
            drive.set_drop_rate(0.5);
            (0..32)
                .map(|_| drive.request("SC").is_ok())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
        assert!(run(7).iter().any(|ok| !ok));
    }
}
