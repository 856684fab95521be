//! # FTM Netlink
//!
//! generic netlink 通道层：socket 会话、回复分发与网卡索引解析。
//!
//! - [`ChannelSession`]：`NETLINK_GENERIC` socket，打开时解析 `nl80211` 族 ID
//! - [`Dispatcher`]：按报文类别（Error / Finish / Ack / Valid）分发到 [`ReplyHandler`]
//! - [`NetlinkTransport`]：会话与分发器之间的接缝，测试中由 `MockTransport` 替代

use bytes::Bytes;
use ftm_protocol::ProtocolError;
use std::io;
use thiserror::Error;

pub mod dispatch;

#[cfg(target_os = "linux")]
pub mod device;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(target_os = "linux")]
pub mod socket;

pub use dispatch::{AckOnly, Control, Dispatcher, LoopStatus, ReplyHandler};

#[cfg(target_os = "linux")]
pub use device::resolve_ifindex;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockTransport;
#[cfg(target_os = "linux")]
pub use socket::ChannelSession;

/// 通道层错误类型
#[derive(Error, Debug)]
pub enum NetlinkError {
    /// socket 创建失败
    #[error("Failed to allocate netlink socket: {0}")]
    AllocationFailure(#[source] io::Error),

    /// bind 或缓冲区设置失败
    #[error("Failed to connect netlink socket: {0}")]
    ConnectFailure(#[source] io::Error),

    #[error("Generic netlink family '{0}' not found")]
    FamilyNotFound(String),

    #[error("Failed to send netlink message: {0}")]
    SendFailure(#[source] io::Error),

    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// 内核返回 -1（EPERM），通常需要 CAP_NET_ADMIN
    #[error("Permission denied")]
    PermissionDenied,

    #[error("Kernel error {code}: {}", errno_text(.code))]
    Kernel { code: i32 },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Device error: {0}")]
    Device(String),

    /// datagram 超出接收缓冲区
    #[error("Datagram truncated: {0} bytes exceeds receive buffer")]
    Truncated(usize),

    #[error("Channel session closed")]
    Closed,

    #[error("Netlink receive overrun")]
    Overrun,
}

fn errno_text(code: &i32) -> String {
    io::Error::from_raw_os_error(code.saturating_neg()).to_string()
}

/// netlink 报文收发接口
///
/// 一个传输层同一时间只允许一个未完成的请求。
pub trait NetlinkTransport {
    /// 已解析的 genl 族 ID
    fn family_id(&self) -> u16;

    /// 分配下一个请求序列号
    fn next_sequence(&mut self) -> u32;

    /// 发送一条完整的 netlink 报文
    fn send(&mut self, message: &[u8]) -> Result<(), NetlinkError>;

    /// 阻塞接收一个 datagram（可能包含多条报文）
    fn recv(&mut self) -> Result<Bytes, NetlinkError>;
}

impl<T: NetlinkTransport + ?Sized> NetlinkTransport for &mut T {
    fn family_id(&self) -> u16 {
        (**self).family_id()
    }

    fn next_sequence(&mut self) -> u32 {
        (**self).next_sequence()
    }

    fn send(&mut self, message: &[u8]) -> Result<(), NetlinkError> {
        (**self).send(message)
    }

    fn recv(&mut self) -> Result<Bytes, NetlinkError> {
        (**self).recv()
    }
}
