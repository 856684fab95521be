//! netlink 报文头与报文迭代
//!
//! 一个 datagram 可能包含多条 netlink 报文，每条报文按 4 字节对齐：
//!
//! ```text
//! [nlmsghdr 16B][payload ...][pad] [nlmsghdr 16B][payload ...][pad] ...
//! ```
//!
//! - `NLMSG_ERROR` 的 payload 是 `struct nlmsgerr`（错误码 + 回显的请求头），
//!   错误码为 0 时即 ACK
//! - 其他类型（族 ID）的 payload 以 4 字节 genl 头开始，后跟属性

use crate::ProtocolError;
use crate::attr::{AttrIter, AttrTable};
use crate::ids::{NLM_F_ACK_TLVS, NLM_F_CAPPED, NLMSGERR_ATTR_COOKIE, NLMSGERR_ATTR_MSG};
use bytes::{BufMut, Bytes, BytesMut};

/// netlink 报文头长度
pub const NLMSG_HDRLEN: usize = 16;
/// genl 头长度
pub const GENL_HDRLEN: usize = 4;

/// 按 4 字节对齐
pub const fn nlmsg_align(len: usize) -> usize {
    (len + 3) & !3
}

/// `struct nlmsghdr`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NlMsgHdr {
    /// 报文总长度（含头）
    pub len: u32,
    /// 报文类型（控制类型或 genl 族 ID）
    pub msg_type: u16,
    pub flags: u16,
    pub seq: u32,
    /// 发送方端口号
    pub pid: u32,
}

impl NlMsgHdr {
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < NLMSG_HDRLEN {
            return Err(ProtocolError::Truncated {
                needed: NLMSG_HDRLEN,
                available: buf.len(),
            });
        }
        Ok(Self {
            len: u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
            msg_type: u16::from_ne_bytes([buf[4], buf[5]]),
            flags: u16::from_ne_bytes([buf[6], buf[7]]),
            seq: u32::from_ne_bytes([buf[8], buf[9], buf[10], buf[11]]),
            pid: u32::from_ne_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_ne(self.len);
        buf.put_u16_ne(self.msg_type);
        buf.put_u16_ne(self.flags);
        buf.put_u32_ne(self.seq);
        buf.put_u32_ne(self.pid);
    }
}

/// 单条 netlink 报文（payload 与 datagram 共享内存）
#[derive(Debug, Clone)]
pub struct NetlinkMessage {
    pub header: NlMsgHdr,
    pub payload: Bytes,
}

impl NetlinkMessage {
    /// 按 `struct nlmsgerr` 解析
    pub fn as_error(&self) -> Result<ErrorMessage, ProtocolError> {
        ErrorMessage::parse(&self.header, &self.payload)
    }

    /// 按 genl 报文解析
    pub fn as_generic(&self) -> Result<GenlMessage, ProtocolError> {
        GenlMessage::parse(self.header, &self.payload)
    }
}

/// datagram 内的报文迭代器
#[derive(Debug, Clone)]
pub struct MessageIter {
    rest: Bytes,
}

impl MessageIter {
    pub fn new(datagram: Bytes) -> Self {
        Self { rest: datagram }
    }
}

impl Iterator for MessageIter {
    type Item = Result<NetlinkMessage, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.len() < NLMSG_HDRLEN {
            return None;
        }

        let header = match NlMsgHdr::parse(&self.rest) {
            Ok(header) => header,
            Err(e) => {
                self.rest = Bytes::new();
                return Some(Err(e));
            },
        };

        let len = header.len as usize;
        if len < NLMSG_HDRLEN || len > self.rest.len() {
            let available = self.rest.len();
            self.rest = Bytes::new();
            return Some(Err(ProtocolError::Truncated {
                needed: len.max(NLMSG_HDRLEN),
                available,
            }));
        }

        let payload = self.rest.slice(NLMSG_HDRLEN..len);
        let advance = nlmsg_align(len).min(self.rest.len());
        let _ = self.rest.split_to(advance);
        Some(Ok(NetlinkMessage { header, payload }))
    }
}

/// `NLMSG_ERROR` 报文（错误码为 0 时是 ACK）
#[derive(Debug, Clone)]
pub struct ErrorMessage {
    /// 内核错误码（规范上为负的 errno，0 表示 ACK）
    pub code: i32,
    /// 回显的请求报文头
    pub request: NlMsgHdr,
    /// 外层报文头
    pub header: NlMsgHdr,
    ext_ack: Bytes,
}

impl ErrorMessage {
    pub fn parse(header: &NlMsgHdr, payload: &Bytes) -> Result<Self, ProtocolError> {
        let needed = 4 + NLMSG_HDRLEN;
        if payload.len() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                available: payload.len(),
            });
        }
        let code = i32::from_ne_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let request = NlMsgHdr::parse(&payload[4..])?;

        let ext_ack = if header.flags & NLM_F_ACK_TLVS != 0 {
            let mut offset = needed;
            if header.flags & NLM_F_CAPPED == 0 {
                // 未截断时回显了完整请求
                offset += nlmsg_align(request.len as usize).saturating_sub(NLMSG_HDRLEN);
            }
            if offset < payload.len() {
                payload.slice(offset..)
            } else {
                Bytes::new()
            }
        } else {
            Bytes::new()
        };

        Ok(Self {
            code,
            request,
            header: *header,
            ext_ack,
        })
    }

    pub fn is_ack(&self) -> bool {
        self.code == 0
    }

    /// 扩展 ACK 中的可读错误信息（`NLMSGERR_ATTR_MSG`）
    pub fn diagnostic(&self) -> Option<String> {
        let table = AttrTable::parse(&self.ext_ack).ok()?;
        table
            .get(NLMSGERR_ATTR_MSG)
            .map(|attr| attr.get_string())
            .filter(|msg| !msg.is_empty())
    }

    /// 扩展 ACK 中的 cookie（`NLMSGERR_ATTR_COOKIE`，8 字节时才有效）
    pub fn cookie(&self) -> Option<u64> {
        let table = AttrTable::parse(&self.ext_ack).ok()?;
        table
            .get(NLMSGERR_ATTR_COOKIE)
            .and_then(|attr| attr.get_u64("cookie").ok())
    }
}

/// genl 报文
#[derive(Debug, Clone)]
pub struct GenlMessage {
    pub header: NlMsgHdr,
    pub cmd: u8,
    pub version: u8,
    attrs: Bytes,
}

impl GenlMessage {
    pub fn parse(header: NlMsgHdr, payload: &Bytes) -> Result<Self, ProtocolError> {
        if payload.len() < GENL_HDRLEN {
            return Err(ProtocolError::Truncated {
                needed: GENL_HDRLEN,
                available: payload.len(),
            });
        }
        Ok(Self {
            header,
            cmd: payload[0],
            version: payload[1],
            attrs: payload.slice(GENL_HDRLEN..),
        })
    }

    pub fn attr_bytes(&self) -> &[u8] {
        &self.attrs
    }

    pub fn attributes(&self) -> AttrIter<'_> {
        AttrIter::new(&self.attrs)
    }

    pub fn table(&self) -> Result<AttrTable<'_>, ProtocolError> {
        AttrTable::parse(&self.attrs)
    }
}
