//! 控制会话
//!
//! 一个 [`ControllerSession`] 对应一台驱动器。协议是严格的一问一答且没有请求标识，
//! 因此所有交换都必须经过 [`SessionGuard`]：持有 guard 期间其他调用方阻塞，
//! 多步操作（初始化、点动启动、一轮状态查询）在同一个 guard 内完成。
//!
//! ```text
//! Command ──encode──> transport.request() ──decode──> Reply
//!                           │ 超时 / ?code
//!                           ▼
//!                     ErrorClassifier ── Transient ──> 立即重试（最多 2 次）
//!                           │
//!                           └── 其他 ──> CommandError
//! ```

use crate::applied::AppliedConfig;
use crate::classifier::{ErrorClassifier, Failure, RetryPolicy};
use crate::error::{CommandError, DriverError, ErrorClass};
use crate::profile::FirmwareProfile;
use escl_protocol::{Command, KeyedValue, Mnemonic, Reply, ReplyShape, decode};
use escl_transport::{DEFAULT_TIMEOUT, Transport, TransportError};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

type BoxedTransport = Box<dyn Transport + Send>;

/// 会话参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionOptions {
    /// 单次交换超时
    #[cfg_attr(feature = "serde", serde(with = "crate::classifier::duration_ms"))]
    pub timeout: Duration,
    /// 相邻两条指令之间的间隔（部分驱动器需要短暂的处理时间）
    #[cfg_attr(feature = "serde", serde(with = "crate::classifier::duration_ms"))]
    pub command_gap: Duration,
    pub retry: RetryPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            command_gap: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }
}

/// 控制会话
pub struct ControllerSession {
    transport: Mutex<Option<BoxedTransport>>,
    classifier: ErrorClassifier,
    options: SessionOptions,
    applied: RwLock<Option<AppliedConfig>>,
    peer: Option<SocketAddr>,
}

impl ControllerSession {
    pub fn new<T>(transport: T, profile: FirmwareProfile, options: SessionOptions) -> Self
    where
        T: Transport + Send + 'static,
    {
        let mut transport: BoxedTransport = Box::new(transport);
        transport.set_receive_timeout(options.timeout);
        let peer = transport.peer();
        Self {
            transport: Mutex::new(Some(transport)),
            classifier: ErrorClassifier::new(profile),
            options,
            applied: RwLock::new(None),
            peer,
        }
    }

    /// 使用默认固件配置与参数
    pub fn with_transport<T>(transport: T) -> Self
    where
        T: Transport + Send + 'static,
    {
        Self::new(transport, FirmwareProfile::default(), SessionOptions::default())
    }

    /// 获取独占访问权（阻塞直到其他调用方释放）
    ///
    /// # 错误
    /// - `DriverError::SessionClosed`: 会话已关闭
    pub fn lock(&self) -> Result<SessionGuard<'_>, DriverError> {
        let slot = self.transport.lock();
        if slot.is_none() {
            return Err(DriverError::SessionClosed);
        }
        Ok(SessionGuard {
            slot,
            session: self,
        })
    }

    /// 单条指令的便捷方法（内部加锁）
    pub fn execute(&self, command: &Command) -> Result<Reply, DriverError> {
        self.lock()?.execute(command)
    }

    /// 单条查询的便捷方法（内部加锁）
    pub fn query(&self, mnemonic: Mnemonic) -> Result<KeyedValue, DriverError> {
        self.lock()?.query(mnemonic)
    }

    pub fn profile(&self) -> &FirmwareProfile {
        self.classifier.profile()
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// 驱动器地址（模拟后端为 None）
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// 最近一次初始化成功后生效的配置
    pub fn applied(&self) -> Option<AppliedConfig> {
        self.applied.read().clone()
    }

    /// 记录已生效的配置（仅由初始化流程调用）
    pub fn record_applied(&self, config: AppliedConfig) {
        *self.applied.write() = Some(config);
    }

    pub fn is_closed(&self) -> bool {
        self.transport.lock().is_none()
    }

    /// 关闭会话
    ///
    /// 尽力发送 `ST`（立即停止）和 `MD`（失能），忽略其结果，然后释放传输。
    /// 重复调用无副作用。
    pub fn close(&self) {
        let mut slot = self.transport.lock();
        let Some(mut transport) = slot.take() else {
            return;
        };
        for wire in ["ST", "MD"] {
            if let Err(e) = transport.request(wire) {
                warn!("Best-effort {} during close failed: {}", wire, e);
            }
        }
        info!("Controller session closed");
    }
}

impl Drop for ControllerSession {
    fn drop(&mut self) {
        if !self.is_closed() {
            debug!("Controller session dropped without close(), releasing transport");
        }
    }
}

/// 会话独占访问
///
/// 持有期间同一会话上的其他操作阻塞。
pub struct SessionGuard<'a> {
    slot: MutexGuard<'a, Option<BoxedTransport>>,
    session: &'a ControllerSession,
}

impl SessionGuard<'_> {
    fn transport(&mut self) -> Result<&mut BoxedTransport, DriverError> {
        self.slot.as_mut().ok_or(DriverError::SessionClosed)
    }

    /// 发送指令并返回成功应答（`Ack` 或键值）
    ///
    /// 错误应答和超时会被分类：`Transient` 按重试策略立即重试，
    /// 其余（以及重试耗尽）返回 `DriverError::Command`。
    pub fn execute(&mut self, command: &Command) -> Result<Reply, DriverError> {
        let wire = command.encode();
        let mnemonic = command.mnemonic();
        let shape = self.session.profile().reply_shape(mnemonic);
        let options = self.session.options;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if !options.command_gap.is_zero() {
                std::thread::sleep(options.command_gap);
            }

            let (raw, class) = match self.transport()?.request(&wire) {
                Ok(text) => {
                    trace!("{} -> {:?} (attempt {})", wire, text, attempt);
                    match decode(&text)? {
                        Reply::Error { code } => {
                            let class = self
                                .session
                                .classifier
                                .classify(command, Failure::ErrorReply(&code));
                            (Some(text), class)
                        },
                        reply if shape_matches(shape, mnemonic, &reply) => {
                            debug!("{} -> {}", wire, reply);
                            return Ok(reply);
                        },
                        // 查询收到其他键：迟到的旧应答，按时序问题处理
                        _ if shape == ReplyShape::Keyed => (Some(text), ErrorClass::Transient),
                        _ => {
                            return Err(DriverError::UnexpectedReply {
                                command: *command,
                                reply: text,
                                expected: shape,
                            });
                        },
                    }
                },
                Err(TransportError::Timeout(timeout)) => {
                    trace!("{} timed out after {:?} (attempt {})", wire, timeout, attempt);
                    (None, self.session.classifier.classify(command, Failure::Timeout))
                },
                Err(e) => return Err(e.into()),
            };

            if options.retry.should_retry(class, attempt) {
                warn!(
                    "{} failed ({}), retrying ({}/{})",
                    wire,
                    raw.as_deref().unwrap_or("timeout"),
                    attempt,
                    options.retry.max_retries
                );
                if !options.retry.delay.is_zero() {
                    std::thread::sleep(options.retry.delay);
                }
                continue;
            }

            let error = CommandError {
                command: *command,
                reply: raw,
                class,
                attempts: attempt,
            };
            match class {
                ErrorClass::PermanentUnsupported => info!("{}", error),
                _ => debug!("{}", error),
            }
            return Err(error.into());
        }
    }

    /// 发送查询并返回键值（键已校验）
    pub fn query(&mut self, mnemonic: Mnemonic) -> Result<KeyedValue, DriverError> {
        let command = Command::new(mnemonic)?;
        match self.execute(&command)? {
            Reply::Keyed(value) => Ok(value),
            other => Err(DriverError::UnexpectedReply {
                command,
                reply: other.to_string(),
                expected: ReplyShape::Keyed,
            }),
        }
    }

    /// 发送原始文本并返回原始应答（不分类、不重试，供调试使用）
    pub fn raw(&mut self, text: &str) -> Result<String, DriverError> {
        let reply = self.transport()?.request(text)?;
        debug!("raw {:?} -> {:?}", text, reply);
        Ok(reply)
    }

    pub fn session(&self) -> &ControllerSession {
        self.session
    }
}

fn shape_matches(shape: ReplyShape, mnemonic: Mnemonic, reply: &Reply) -> bool {
    let key_matches = |value: &KeyedValue| value.key().eq_ignore_ascii_case(mnemonic.reply_key());
    match (shape, reply) {
        (ReplyShape::Ack, Reply::Ack) => true,
        (ReplyShape::Keyed, Reply::Keyed(value)) => key_matches(value),
        (ReplyShape::AckOrKeyed, Reply::Ack) => true,
        (ReplyShape::AckOrKeyed, Reply::Keyed(value)) => key_matches(value),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escl_transport::mock::ScriptedTransport;

    fn session(script: ScriptedTransport) -> ControllerSession {
        ControllerSession::with_transport(script)
    }

    #[test]
    fn test_execute_ack() {
        let script = ScriptedTransport::new().reply("%");
        let session = session(script.clone());
        let reply = session
            .execute(&Command::new(Mnemonic::StopJog).unwrap())
            .unwrap();
        assert_eq!(reply, Reply::Ack);
        assert_eq!(script.sent(), vec!["SJ"]);
    }

    #[test]
    fn test_transient_query_retried_twice() {
        let script = ScriptedTransport::new().reply("?").timeout().reply("SC=0001");
        let session = session(script.clone());
        let value = session.query(Mnemonic::StatusCode).unwrap();
        assert_eq!(value.as_hex_u16().unwrap(), 1);
        assert_eq!(script.sent(), vec!["SC", "SC", "SC"]);
    }

    #[test]
    fn test_transient_retries_exhausted() {
        let script = ScriptedTransport::new().reply("?").reply("?").reply("?").reply("SC=0001");
        let session = session(script.clone());
        let err = session.query(Mnemonic::StatusCode).unwrap_err();
        let err = err.as_command_error().unwrap();
        assert_eq!(err.class, ErrorClass::Transient);
        assert_eq!(err.attempts, 3);
        assert_eq!(script.remaining(), 1);
    }

    #[test]
    fn test_unknown_error_not_retried() {
        let script = ScriptedTransport::new().reply("?4").reply("%");
        let session = session(script.clone());
        let cmd = Command::with_value(Mnemonic::JogSpeed, 2.5).unwrap();
        let err = session.execute(&cmd).unwrap_err();
        let err = err.as_command_error().unwrap();
        assert_eq!(err.class, ErrorClass::Unknown);
        assert_eq!(err.raw_reply(), "?4");
        assert_eq!(script.sent(), vec!["JS2.5"]);
    }

    #[test]
    fn test_unsupported_not_retried() {
        let script = ScriptedTransport::new().reply("?");
        let session = session(script.clone());
        let cmd = Command::with_value(Mnemonic::MaxVelocity, 10.0).unwrap();
        let err = session.execute(&cmd).unwrap_err();
        assert_eq!(err.class(), Some(ErrorClass::PermanentUnsupported));
        assert_eq!(script.sent().len(), 1);
    }

    #[test]
    fn test_stale_key_treated_as_transient() {
        let script = ScriptedTransport::new().reply("IV=12").reply("AL=0000");
        let session = session(script);
        let value = session.query(Mnemonic::AlarmCode).unwrap();
        assert_eq!(value.key(), "AL");
    }

    #[test]
    fn test_change_speed_accepts_either_shape() {
        let script = ScriptedTransport::new().reply("%").reply("CS=2.5");
        let session = session(script);
        let cmd = Command::with_value(Mnemonic::ChangeJogSpeed, 2.5).unwrap();
        assert!(session.execute(&cmd).is_ok());
        assert!(session.execute(&cmd).is_ok());
    }

    #[test]
    fn test_reply_shape_override() {
        let script = ScriptedTransport::new().reply("CS=2.5");
        let profile =
            FirmwareProfile::default().with_reply_shape(Mnemonic::ChangeJogSpeed, ReplyShape::Ack);
        let session = ControllerSession::new(script, profile, SessionOptions::default());
        let cmd = Command::with_value(Mnemonic::ChangeJogSpeed, 2.5).unwrap();
        assert!(matches!(
            session.execute(&cmd),
            Err(DriverError::UnexpectedReply { .. })
        ));
    }

    #[test]
    fn test_close_sends_stop_and_disable() {
        let script = ScriptedTransport::new().reply("%").reply("%");
        let session = session(script.clone());
        session.close();
        assert_eq!(script.sent(), vec!["ST", "MD"]);
        assert!(session.is_closed());
        assert!(matches!(session.lock(), Err(DriverError::SessionClosed)));
        // 重复关闭无副作用
        session.close();
        assert_eq!(script.sent().len(), 2);
    }

    #[test]
    fn test_guard_serializes_access() {
        use std::sync::Arc;

        let script = ScriptedTransport::new();
        for _ in 0..20 {
            script.push_reply("%");
        }
        let session = Arc::new(session(script.clone()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || {
                    let mut guard = session.lock().unwrap();
                    for _ in 0..5 {
                        guard.execute(&Command::new(Mnemonic::StopJog).unwrap()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(script.sent().len(), 20);
        assert_eq!(script.remaining(), 0);
    }
}
