//! 参数精度恢复
//!
//! 固件拒绝参数精度（`PermanentInvalidArgument`）时，按固件可接受的小数位数
//! 重新取整并重发一次。修正的是请求本身，所以不属于会话层的自动重试。

use escl_driver::{DriverError, ErrorClass, SessionGuard};
use escl_protocol::{Command, Reply};
use tracing::warn;

/// 执行指令；精度被拒绝时重新取整重发一次
///
/// 返回应答和实际被接受的指令。
pub(crate) fn execute_rerounding(
    guard: &mut SessionGuard<'_>,
    command: &Command,
) -> Result<(Reply, Command), DriverError> {
    match guard.execute(command) {
        Err(e) if e.class() == Some(ErrorClass::PermanentInvalidArgument) => {
            let places = guard.session().profile().accepted_places(command.mnemonic());
            let rerounded = command.rerounded(places)?;
            warn!(
                "{} rejected for precision, resubmitting as {} ({} decimal places)",
                command, rerounded, places
            );
            let reply = guard.execute(&rerounded)?;
            Ok((reply, rerounded))
        },
        result => result.map(|reply| (reply, *command)),
    }
}
