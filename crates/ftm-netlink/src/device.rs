//! 网卡名称到接口索引的解析

use crate::NetlinkError;
use tracing::trace;

/// 接口名最大长度（IFNAMSIZ - 1）
const MAX_IFACE_NAME_LEN: usize = 15;

/// 解析网卡接口索引（如 `wlan0` → 3）
///
/// # 错误
/// - `NetlinkError::Device`: 名称为空、过长、含 NUL，或接口不存在
pub fn resolve_ifindex(interface: &str) -> Result<u32, NetlinkError> {
    if interface.is_empty() {
        return Err(NetlinkError::Device("Interface name is empty".to_string()));
    }
    if interface.len() > MAX_IFACE_NAME_LEN {
        return Err(NetlinkError::Device(format!(
            "Interface name '{}' is too long (max {} characters)",
            interface, MAX_IFACE_NAME_LEN
        )));
    }
    if interface.contains('\0') {
        return Err(NetlinkError::Device(format!(
            "Invalid interface name '{}': contains NUL",
            interface.escape_debug()
        )));
    }

    let index = nix::net::if_::if_nametoindex(interface).map_err(|errno| {
        NetlinkError::Device(format!(
            "Interface '{}' does not exist ({})",
            interface,
            errno.desc()
        ))
    })?;

    trace!("Interface '{}' has index {}", interface, index);
    Ok(index)
}
