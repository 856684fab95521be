//! 嵌套属性（netlink TLV）构建与解析
//!
//! 属性格式：
//!
//! ```text
//! +---------+---------+----------------------+---------+
//! | len u16 | type u16| payload (len - 4)    | padding |
//! +---------+---------+----------------------+---------+
//! ```
//!
//! `len` 不包含对齐填充，每个属性按 4 字节对齐。嵌套属性的 payload
//! 是若干子属性，类型字段带 `NLA_F_NESTED` 标志。

use crate::ProtocolError;
use crate::ids::{NLA_F_NESTED, NLA_TYPE_MASK};
use crate::message::{GENL_HDRLEN, NLMSG_HDRLEN, NlMsgHdr};
use bytes::{BufMut, Bytes, BytesMut};

/// 属性头长度
pub const NLA_HDRLEN: usize = 4;
/// 属性对齐字节数
pub const NLA_ALIGNTO: usize = 4;

/// 默认报文容量上限（与 socket 缓冲区下限一致）
pub const DEFAULT_MESSAGE_LIMIT: usize = 32 * 1024;

/// 按 4 字节对齐
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// 已打开嵌套属性的句柄
///
/// 由 [`MessageBuilder::nest_start`] 返回，必须交还给
/// [`MessageBuilder::nest_end`]，且关闭顺序与打开顺序严格相反。
#[derive(Debug)]
#[must_use = "nested attribute must be closed with nest_end"]
pub struct NestToken {
    offset: usize,
    depth: usize,
}

/// genl 报文构建器
///
/// 所有写入操作都返回 `Result`，任意一步失败都应直接丢弃整个构建器，
/// [`MessageBuilder::finish`] 只会产出完整闭合的报文。
///
/// # Example
///
/// ```
/// use ftm_protocol::MessageBuilder;
///
/// let mut builder = MessageBuilder::genl(0x1c, 0x05, 1, 131, 0);
/// builder.put_u32(3, 7).unwrap();
/// let nest = builder.nest_start(273).unwrap();
/// builder.put_flag(1).unwrap();
/// builder.nest_end(nest).unwrap();
/// let bytes = builder.finish().unwrap();
/// assert_eq!(bytes.len() % 4, 0);
/// ```
#[derive(Debug)]
pub struct MessageBuilder {
    buf: BytesMut,
    limit: usize,
    nests: Vec<usize>,
}

impl MessageBuilder {
    /// 创建只有 netlink 报文头的构建器
    pub fn new(msg_type: u16, flags: u16, seq: u32) -> Self {
        let mut buf = BytesMut::with_capacity(256);
        NlMsgHdr {
            len: 0,
            msg_type,
            flags,
            seq,
            pid: 0,
        }
        .write(&mut buf);
        Self {
            buf,
            limit: DEFAULT_MESSAGE_LIMIT,
            nests: Vec::new(),
        }
    }

    /// 创建带 genl 头的构建器
    pub fn genl(family: u16, flags: u16, seq: u32, cmd: u8, version: u8) -> Self {
        let mut builder = Self::new(family, flags, seq);
        builder.buf.put_u8(cmd);
        builder.buf.put_u8(version);
        builder.buf.put_u16_ne(0);
        builder
    }

    /// 设置报文容量上限（字节）
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(NLMSG_HDRLEN + GENL_HDRLEN);
        self
    }

    /// 当前已写入的字节数
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn reserve(&self, needed: usize, what: &str) -> Result<(), ProtocolError> {
        if self.buf.len() + needed > self.limit {
            return Err(ProtocolError::BuildFailure(format!(
                "{} does not fit: {} + {} bytes exceeds limit of {}",
                what,
                self.buf.len(),
                needed,
                self.limit
            )));
        }
        Ok(())
    }

    /// 写入原始字节属性
    pub fn put_bytes(&mut self, kind: u16, data: &[u8]) -> Result<(), ProtocolError> {
        let len = NLA_HDRLEN + data.len();
        if len > u16::MAX as usize {
            return Err(ProtocolError::BuildFailure(format!(
                "attribute {} payload too large ({} bytes)",
                kind,
                data.len()
            )));
        }
        let aligned = nla_align(len);
        self.reserve(aligned, "attribute")?;

        self.buf.put_u16_ne(len as u16);
        self.buf.put_u16_ne(kind);
        self.buf.put_slice(data);
        self.buf.put_bytes(0, aligned - len);
        Ok(())
    }

    pub fn put_u8(&mut self, kind: u16, value: u8) -> Result<(), ProtocolError> {
        self.put_bytes(kind, &[value])
    }

    pub fn put_u16(&mut self, kind: u16, value: u16) -> Result<(), ProtocolError> {
        self.put_bytes(kind, &value.to_ne_bytes())
    }

    pub fn put_u32(&mut self, kind: u16, value: u32) -> Result<(), ProtocolError> {
        self.put_bytes(kind, &value.to_ne_bytes())
    }

    pub fn put_i32(&mut self, kind: u16, value: i32) -> Result<(), ProtocolError> {
        self.put_bytes(kind, &value.to_ne_bytes())
    }

    pub fn put_u64(&mut self, kind: u16, value: u64) -> Result<(), ProtocolError> {
        self.put_bytes(kind, &value.to_ne_bytes())
    }

    pub fn put_i64(&mut self, kind: u16, value: i64) -> Result<(), ProtocolError> {
        self.put_bytes(kind, &value.to_ne_bytes())
    }

    /// 写入标志属性（只有存在与否，没有 false 值）
    pub fn put_flag(&mut self, kind: u16) -> Result<(), ProtocolError> {
        self.put_bytes(kind, &[])
    }

    /// 写入以 NUL 结尾的字符串属性
    pub fn put_str(&mut self, kind: u16, value: &str) -> Result<(), ProtocolError> {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        self.put_bytes(kind, &data)
    }

    /// 打开嵌套属性
    pub fn nest_start(&mut self, kind: u16) -> Result<NestToken, ProtocolError> {
        self.reserve(NLA_HDRLEN, "nested attribute")?;
        let offset = self.buf.len();
        self.buf.put_u16_ne(0);
        self.buf.put_u16_ne(kind | NLA_F_NESTED);
        self.nests.push(offset);
        Ok(NestToken {
            offset,
            depth: self.nests.len(),
        })
    }

    /// 关闭嵌套属性，回填长度
    pub fn nest_end(&mut self, token: NestToken) -> Result<(), ProtocolError> {
        match self.nests.last() {
            Some(&offset) if offset == token.offset && self.nests.len() == token.depth => {},
            _ => {
                return Err(ProtocolError::BuildFailure(format!(
                    "nested attribute at offset {} closed out of order",
                    token.offset
                )));
            },
        }
        self.nests.pop();

        let len = self.buf.len() - token.offset;
        if len > u16::MAX as usize {
            return Err(ProtocolError::BuildFailure(format!(
                "nested attribute too large ({} bytes)",
                len
            )));
        }
        self.buf[token.offset..token.offset + 2].copy_from_slice(&(len as u16).to_ne_bytes());
        Ok(())
    }

    /// 完成构建，回填报文长度
    pub fn finish(mut self) -> Result<Bytes, ProtocolError> {
        if !self.nests.is_empty() {
            return Err(ProtocolError::BuildFailure(format!(
                "{} nested attribute(s) left open",
                self.nests.len()
            )));
        }
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        Ok(self.buf.freeze())
    }
}

/// 解析后的单个属性（借用底层缓冲区）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr<'a> {
    kind: u16,
    flags: u16,
    payload: &'a [u8],
}

impl<'a> Attr<'a> {
    /// 属性类型（已去除 NESTED / NET_BYTEORDER 标志）
    pub fn kind(&self) -> u16 {
        self.kind
    }

    pub fn is_nested(&self) -> bool {
        self.flags & NLA_F_NESTED != 0
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    fn fixed<const N: usize>(&self, field: &'static str) -> Result<[u8; N], ProtocolError> {
        self.payload
            .try_into()
            .map_err(|_| ProtocolError::InvalidLength {
                field,
                expected: N,
                actual: self.payload.len(),
            })
    }

    pub fn get_u8(&self, field: &'static str) -> Result<u8, ProtocolError> {
        self.fixed::<1>(field).map(|b| b[0])
    }

    pub fn get_u16(&self, field: &'static str) -> Result<u16, ProtocolError> {
        self.fixed(field).map(u16::from_ne_bytes)
    }

    pub fn get_u32(&self, field: &'static str) -> Result<u32, ProtocolError> {
        self.fixed(field).map(u32::from_ne_bytes)
    }

    pub fn get_i32(&self, field: &'static str) -> Result<i32, ProtocolError> {
        self.fixed(field).map(i32::from_ne_bytes)
    }

    pub fn get_u64(&self, field: &'static str) -> Result<u64, ProtocolError> {
        self.fixed(field).map(u64::from_ne_bytes)
    }

    pub fn get_i64(&self, field: &'static str) -> Result<i64, ProtocolError> {
        self.fixed(field).map(i64::from_ne_bytes)
    }

    /// 读取字符串（截断到第一个 NUL）
    pub fn get_string(&self) -> String {
        let end = self.payload.iter().position(|&b| b == 0).unwrap_or(self.payload.len());
        String::from_utf8_lossy(&self.payload[..end]).into_owned()
    }

    /// 遍历子属性
    pub fn nested(&self) -> AttrIter<'a> {
        AttrIter::new(self.payload)
    }

    /// 将子属性解析为按类型索引的表
    pub fn table(&self) -> Result<AttrTable<'a>, ProtocolError> {
        AttrTable::parse(self.payload)
    }
}

/// 属性迭代器
///
/// 遇到长度非法的属性时产出一次错误后结束。
#[derive(Debug, Clone)]
pub struct AttrIter<'a> {
    rest: &'a [u8],
}

impl<'a> AttrIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { rest: buf }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Result<Attr<'a>, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        // 不足一个属性头的尾部视为填充
        if self.rest.len() < NLA_HDRLEN {
            return None;
        }

        let len = u16::from_ne_bytes([self.rest[0], self.rest[1]]) as usize;
        let raw_kind = u16::from_ne_bytes([self.rest[2], self.rest[3]]);

        if len < NLA_HDRLEN || len > self.rest.len() {
            let available = self.rest.len();
            self.rest = &[];
            return Some(Err(ProtocolError::Truncated {
                needed: len.max(NLA_HDRLEN),
                available,
            }));
        }

        let attr = Attr {
            kind: raw_kind & NLA_TYPE_MASK,
            flags: raw_kind & !NLA_TYPE_MASK,
            payload: &self.rest[NLA_HDRLEN..len],
        };
        let advance = nla_align(len).min(self.rest.len());
        self.rest = &self.rest[advance..];
        Some(Ok(attr))
    }
}

/// 按类型索引的属性表（同类型重复出现时后者覆盖前者）
#[derive(Debug, Clone, Default)]
pub struct AttrTable<'a> {
    attrs: Vec<Attr<'a>>,
}

impl<'a> AttrTable<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, ProtocolError> {
        let attrs = AttrIter::new(buf).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { attrs })
    }

    pub fn get(&self, kind: u16) -> Option<Attr<'a>> {
        self.attrs.iter().rev().find(|a| a.kind == kind).copied()
    }

    pub fn contains(&self, kind: u16) -> bool {
        self.get(kind).is_some()
    }

    /// 获取必需属性，缺失时返回 `MissingAttribute(name)`
    pub fn require(&self, kind: u16, name: &'static str) -> Result<Attr<'a>, ProtocolError> {
        self.get(kind).ok_or(ProtocolError::MissingAttribute(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attr<'a>> {
        self.attrs.iter()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs_of(bytes: &[u8]) -> &[u8] {
        &bytes[NLMSG_HDRLEN + GENL_HDRLEN..]
    }

    #[test]
    fn test_nla_align() {
        assert_eq!(nla_align(0), 0);
        assert_eq!(nla_align(1), 4);
        assert_eq!(nla_align(4), 4);
        assert_eq!(nla_align(5), 8);
        assert_eq!(nla_align(10), 12);
    }

    #[test]
    fn test_finish_patches_message_length() {
        let mut builder = MessageBuilder::genl(0x1c, 0x05, 9, 131, 0);
        builder.put_u8(1, 0xAB).unwrap();
        let bytes = builder.finish().unwrap();

        let len = u32::from_ne_bytes(bytes[0..4].try_into().unwrap()) as usize;
        assert_eq!(len, bytes.len());
        // 1 字节 payload 对齐到 8 字节属性
        assert_eq!(bytes.len(), NLMSG_HDRLEN + GENL_HDRLEN + 8);
    }

    #[test]
    fn test_nested_roundtrip() {
        let mut builder = MessageBuilder::genl(0x1c, 0, 1, 131, 0);
        let outer = builder.nest_start(273).unwrap();
        let inner = builder.nest_start(5).unwrap();
        builder.put_u16(4, 0x1234).unwrap();
        builder.put_flag(1).unwrap();
        builder.nest_end(inner).unwrap();
        builder.put_i64(2, -42).unwrap();
        builder.nest_end(outer).unwrap();
        let bytes = builder.finish().unwrap();

        let table = AttrTable::parse(attrs_of(&bytes)).unwrap();
        let outer = table.require(273, "outer").unwrap();
        assert!(outer.is_nested());

        let outer_table = outer.table().unwrap();
        assert_eq!(outer_table.get(2).unwrap().get_i64("i64").unwrap(), -42);

        let inner_table = outer_table.require(5, "inner").unwrap().table().unwrap();
        assert_eq!(inner_table.get(4).unwrap().get_u16("u16").unwrap(), 0x1234);
        assert!(inner_table.get(1).unwrap().payload().is_empty());
    }

    #[test]
    fn test_nest_out_of_order_is_build_failure() {
        let mut builder = MessageBuilder::genl(0x1c, 0, 1, 131, 0);
        let outer = builder.nest_start(1).unwrap();
        let _inner = builder.nest_start(2).unwrap();
        let err = builder.nest_end(outer).unwrap_err();
        assert!(matches!(err, ProtocolError::BuildFailure(_)));
    }

    #[test]
    fn test_open_nest_blocks_finish() {
        let mut builder = MessageBuilder::genl(0x1c, 0, 1, 131, 0);
        let _nest = builder.nest_start(1).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(ProtocolError::BuildFailure(_))
        ));
    }

    #[test]
    fn test_limit_exhaustion_fails_nest_start() {
        let mut builder = MessageBuilder::genl(0x1c, 0, 1, 131, 0).with_limit(24);
        // 20 字节头 + 4 字节 = 24，刚好放下一个空嵌套
        let nest = builder.nest_start(1).unwrap();
        builder.nest_end(nest).unwrap();
        assert!(matches!(
            builder.nest_start(2),
            Err(ProtocolError::BuildFailure(_))
        ));
        assert!(matches!(
            builder.put_u32(3, 1),
            Err(ProtocolError::BuildFailure(_))
        ));
    }

    #[test]
    fn test_wrong_width_is_invalid_length() {
        let mut builder = MessageBuilder::genl(0x1c, 0, 1, 131, 0);
        builder.put_u32(13, 500).unwrap();
        let bytes = builder.finish().unwrap();
        let table = AttrTable::parse(attrs_of(&bytes)).unwrap();
        let err = table.get(13).unwrap().get_i64("rtt_avg").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidLength {
                field: "rtt_avg",
                expected: 8,
                actual: 4
            }
        );
    }

    #[test]
    fn test_truncated_attribute() {
        // len = 12，但只有 8 字节
        let mut raw = Vec::new();
        raw.extend_from_slice(&12u16.to_ne_bytes());
        raw.extend_from_slice(&1u16.to_ne_bytes());
        raw.extend_from_slice(&[0, 0, 0, 0]);
        let result = AttrTable::parse(&raw);
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_string_attribute() {
        let mut builder = MessageBuilder::genl(0x10, 0, 1, 3, 1);
        builder.put_str(2, "nl80211").unwrap();
        let bytes = builder.finish().unwrap();
        let table = AttrTable::parse(attrs_of(&bytes)).unwrap();
        assert_eq!(table.get(2).unwrap().get_string(), "nl80211");
    }
}
