//! 原始指令命令

use crate::modes::oneshot::Connection;
use anyhow::Result;
use clap::Args;

/// 发送原始文本（不分类、不重试）
#[derive(Args, Debug, Clone)]
pub struct RawCommand {
    /// 指令文本，如 `RV`、`IP`、`JS1.5`
    #[arg(allow_hyphen_values = true)]
    pub text: String,
}

impl RawCommand {
    pub fn execute(&self, connection: &Connection) -> Result<()> {
        let text = self.text.trim();
        if text.is_empty() {
            anyhow::bail!("Empty command");
        }
        let reply = connection.session.lock()?.raw(text)?;
        println!("{}", reply);
        Ok(())
    }
}
