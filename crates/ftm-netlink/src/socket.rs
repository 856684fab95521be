//! generic netlink socket 会话
//!
//! ## 打开流程
//!
//! 1. `socket(AF_NETLINK, SOCK_RAW | SOCK_CLOEXEC, NETLINK_GENERIC)`（`nix::sys::socket`）
//! 2. `bind` 到 `NetlinkAddr`（端口号由内核分配）
//! 3. 收发缓冲区设为 32 KiB
//! 4. 尽力开启 `NETLINK_EXT_ACK`（失败只记录警告）
//! 5. 通过 `CTRL_CMD_GETFAMILY` 解析族 ID
//!
//! 任一步失败时 fd 随 `OwnedFd` 一起释放。
//!
//! ## 限制
//!
//! - 阻塞 I/O，接收没有超时
//! - 通常需要 `CAP_NET_ADMIN` 才能发起测量

use crate::dispatch::{Control, Dispatcher, ReplyHandler};
use crate::{NetlinkError, NetlinkTransport};
use bytes::Bytes;
use ftm_protocol::GenlMessage;
use ftm_protocol::encode_family_request;
use ftm_protocol::ids::{CTRL_ATTR_FAMILY_ID, GENL_ID_CTRL, NL80211_GENL_NAME};
use nix::errno::Errno;
use nix::sys::socket::{
    AddressFamily, MsgFlags, NetlinkAddr, SetSockOpt, SockFlag, SockProtocol, SockType, bind,
    recv, sendto, setsockopt, socket, sockopt,
};
use std::io;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

/// 收发缓冲区大小
pub const SOCKET_BUFFER_SIZE: usize = 32 * 1024;

/// nl80211 通道会话
///
/// # 示例
///
/// ```no_run
/// use ftm_netlink::{ChannelSession, NetlinkTransport};
///
/// let session = ChannelSession::open().unwrap();
/// println!("nl80211 family id: {}", session.family_id());
/// ```
#[derive(Debug)]
pub struct ChannelSession {
    fd: Option<OwnedFd>,
    family_id: u16,
    seq: u32,
    recv_buf: Vec<u8>,
}

impl ChannelSession {
    /// 打开会话并解析 `nl80211` 族 ID
    pub fn open() -> Result<Self, NetlinkError> {
        Self::open_family(NL80211_GENL_NAME)
    }

    /// 打开会话并解析指定的 genl 族
    pub fn open_family(family: &str) -> Result<Self, NetlinkError> {
        let fd = socket(
            AddressFamily::Netlink,
            SockType::Raw,
            SockFlag::SOCK_CLOEXEC,
            SockProtocol::NetlinkGeneric,
        )
        .map_err(|e| NetlinkError::AllocationFailure(io::Error::from(e)))?;

        // 端口号由内核分配
        bind(fd.as_raw_fd(), &NetlinkAddr::new(0, 0))
            .map_err(|e| NetlinkError::ConnectFailure(io::Error::from(e)))?;

        setsockopt(&fd, sockopt::SndBuf, &SOCKET_BUFFER_SIZE)
            .map_err(|e| NetlinkError::ConnectFailure(io::Error::from(e)))?;
        setsockopt(&fd, sockopt::RcvBuf, &SOCKET_BUFFER_SIZE)
            .map_err(|e| NetlinkError::ConnectFailure(io::Error::from(e)))?;

        // 旧内核不支持扩展 ACK，不影响使用
        if let Err(e) = setsockopt(&fd, NetlinkExtAck, &true) {
            warn!("Failed to enable NETLINK_EXT_ACK: {}", e);
        }

        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(1);

        let mut session = Self {
            fd: Some(fd),
            family_id: 0,
            seq: seed,
            recv_buf: vec![0; SOCKET_BUFFER_SIZE],
        };
        session.family_id = session.resolve_family(family)?;

        debug!(
            "Netlink session opened: family '{}' id={}",
            family, session.family_id
        );
        Ok(session)
    }

    fn resolve_family(&mut self, family: &str) -> Result<u16, NetlinkError> {
        let seq = self.next_sequence();
        let request = encode_family_request(family, seq)?;
        self.send(&request)?;

        let mut resolver = FamilyResolver::default();
        if let Err(e) = Dispatcher::with_sequence(seq).run(self, &mut resolver) {
            debug!("Family lookup for '{}' failed: {}", family, e);
            return Err(match e {
                NetlinkError::Kernel { .. } | NetlinkError::PermissionDenied => {
                    NetlinkError::FamilyNotFound(family.to_string())
                },
                other => other,
            });
        }
        resolver
            .family_id
            .ok_or_else(|| NetlinkError::FamilyNotFound(family.to_string()))
    }

    /// 关闭会话（可重复调用）
    pub fn close(&mut self) {
        if self.fd.take().is_some() {
            trace!("Netlink session closed (family id {})", self.family_id);
        }
    }

    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    fn raw_fd(&self) -> Result<std::os::fd::RawFd, NetlinkError> {
        self.fd
            .as_ref()
            .map(|fd| fd.as_raw_fd())
            .ok_or(NetlinkError::Closed)
    }
}

impl NetlinkTransport for ChannelSession {
    fn family_id(&self) -> u16 {
        self.family_id
    }

    fn next_sequence(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    fn send(&mut self, message: &[u8]) -> Result<(), NetlinkError> {
        let fd = self.raw_fd()?;
        let kernel = NetlinkAddr::new(0, 0);

        let sent = loop {
            match sendto(fd, message, &kernel, MsgFlags::empty()) {
                Ok(sent) => break sent,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(NetlinkError::SendFailure(io::Error::from(e))),
            }
        };
        if sent != message.len() {
            return Err(NetlinkError::SendFailure(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {} of {} bytes", sent, message.len()),
            )));
        }
        trace!("Sent {} bytes", message.len());
        Ok(())
    }

    fn recv(&mut self) -> Result<Bytes, NetlinkError> {
        let fd = self.raw_fd()?;
        // MSG_TRUNC 让内核返回 datagram 的真实长度
        let len = loop {
            match recv(fd, &mut self.recv_buf, MsgFlags::MSG_TRUNC) {
                Ok(len) => break len,
                Err(Errno::EINTR) => continue,
                Err(Errno::ENOBUFS) => return Err(NetlinkError::Overrun),
                Err(e) => return Err(NetlinkError::Io(io::Error::from(e))),
            }
        };

        if len > self.recv_buf.len() {
            return Err(NetlinkError::Truncated(len));
        }
        trace!("Received {} bytes", len);
        Ok(Bytes::copy_from_slice(&self.recv_buf[..len]))
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// `SOL_NETLINK` / `NETLINK_EXT_ACK`（nix 未提供该选项）
#[derive(Debug, Clone, Copy)]
struct NetlinkExtAck;

impl SetSockOpt for NetlinkExtAck {
    type Val = bool;

    fn set<F: AsFd>(&self, fd: &F, val: &bool) -> nix::Result<()> {
        let value = libc::c_int::from(*val);
        // SAFETY: value 在调用期间有效，长度与 c_int 一致
        let ret = unsafe {
            libc::setsockopt(
                fd.as_fd().as_raw_fd(),
                libc::SOL_NETLINK,
                libc::NETLINK_EXT_ACK,
                &value as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        Errno::result(ret).map(drop)
    }
}

/// `CTRL_CMD_GETFAMILY` 回复处理
#[derive(Debug, Default)]
struct FamilyResolver {
    family_id: Option<u16>,
}

impl ReplyHandler for FamilyResolver {
    fn on_valid(&mut self, msg: GenlMessage) -> Control {
        if msg.header.msg_type != GENL_ID_CTRL {
            return Control::Ignored;
        }
        let id = msg
            .table()
            .ok()
            .and_then(|table| table.get(CTRL_ATTR_FAMILY_ID))
            .and_then(|attr| attr.get_u16("family_id").ok());
        match id {
            Some(id) => {
                self.family_id = Some(id);
                Control::Continue
            },
            None => Control::Ignored,
        }
    }
}
