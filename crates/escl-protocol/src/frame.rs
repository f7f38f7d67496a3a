//! eSCL UDP 数据报封装
//!
//! ```text
//! ┌──────┬──────┬───────────────────┬──────┐
//! │ 0x00 │ 0x07 │ ASCII 指令 / 应答 │ 0x0D │
//! └──────┴──────┴───────────────────┴──────┘
//! ```

use crate::ProtocolError;

/// 帧头
pub const HEADER: [u8; 2] = [0x00, 0x07];
/// 结束符（CR）
pub const TERMINATOR: u8 = 0x0D;
/// 驱动器默认接收端口
pub const DRIVE_PORT: u16 = 7775;
/// 本地默认绑定端口
pub const LOCAL_PORT: u16 = 7777;

/// 封装为数据报
pub fn frame(text: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(text.len() + 3);
    packet.extend_from_slice(&HEADER);
    packet.extend_from_slice(text.as_bytes());
    packet.push(TERMINATOR);
    packet
}

/// 解封数据报
///
/// 缺少结束符时容忍（部分固件省略 CR），但帧头必须正确，内容必须为 ASCII。
pub fn unframe(packet: &[u8]) -> Result<String, ProtocolError> {
    let body = packet
        .strip_prefix(&HEADER)
        .ok_or_else(|| ProtocolError::InvalidFrame(format!("bad header in {} bytes", packet.len())))?;
    let body = body.strip_suffix(&[TERMINATOR]).unwrap_or(body);

    if !body.is_ascii() {
        return Err(ProtocolError::InvalidFrame("non-ASCII payload".to_string()));
    }
    // is_ascii 已保证 UTF-8 合法
    Ok(String::from_utf8_lossy(body).into_owned())
}
