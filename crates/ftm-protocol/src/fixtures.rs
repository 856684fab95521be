//! 内核回复报文构造（仅用于测试与 mock 传输层）
//!
//! 构造的报文与内核发出的格式一致，可直接喂给 `MessageIter`。

use crate::attr::MessageBuilder;
use crate::ids::*;
use crate::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};
use crate::response::{FTM_RESPONSE_FIELDS, FieldValue, PeerResponse};
use crate::types::MacAddr;
use bytes::{BufMut, Bytes, BytesMut};

const FIXTURE_MSG: &str = "fixture message fits in the default limit";

#[derive(Debug, Clone)]
struct PeerFixture {
    mac: MacAddr,
    fields: PeerResponse,
    with_resp: bool,
    raw_ftm: Vec<(u16, Vec<u8>)>,
}

/// `PEER_MEASUREMENT_RESULT` 报文构造器
///
/// `peer()` 之后的 `without_resp` / `with_raw_ftm_attr` 作用于最近添加的 peer。
#[derive(Debug, Clone)]
pub struct ResultBuilder {
    family: u16,
    seq: u32,
    cookie: Option<u64>,
    peers: Vec<PeerFixture>,
}

impl ResultBuilder {
    pub fn new(family: u16, cookie: u64) -> Self {
        Self {
            family,
            seq: 0,
            cookie: Some(cookie),
            peers: Vec::new(),
        }
    }

    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    /// 添加一个 peer 条目
    ///
    /// `fields` 中的 FTM 字段、`status`、`host_time`、`final_report` 会被编码，
    /// 其中的 `mac` 被忽略。
    pub fn peer(mut self, mac: MacAddr, fields: PeerResponse) -> Self {
        self.peers.push(PeerFixture {
            mac,
            fields,
            with_resp: true,
            raw_ftm: Vec::new(),
        });
        self
    }

    pub fn without_cookie(mut self) -> Self {
        self.cookie = None;
        self
    }

    pub fn without_resp(mut self) -> Self {
        if let Some(peer) = self.peers.last_mut() {
            peer.with_resp = false;
        }
        self
    }

    /// 在 FTM 嵌套中追加一个原始属性
    pub fn with_raw_ftm_attr(mut self, tag: u16, payload: &[u8]) -> Self {
        if let Some(peer) = self.peers.last_mut() {
            peer.raw_ftm.push((tag, payload.to_vec()));
        }
        self
    }

    pub fn build(self) -> Bytes {
        let mut builder = MessageBuilder::genl(
            self.family,
            0,
            self.seq,
            NL80211_CMD_PEER_MEASUREMENT_RESULT,
            0,
        );
        if let Some(cookie) = self.cookie {
            builder.put_u64(NL80211_ATTR_COOKIE, cookie).expect(FIXTURE_MSG);
        }

        let pmsr = builder.nest_start(NL80211_ATTR_PEER_MEASUREMENTS).expect(FIXTURE_MSG);
        let peers = builder.nest_start(NL80211_PMSR_ATTR_PEERS).expect(FIXTURE_MSG);
        for (index, peer) in self.peers.iter().enumerate() {
            let entry = builder.nest_start(index as u16).expect(FIXTURE_MSG);
            builder
                .put_bytes(NL80211_PMSR_PEER_ATTR_ADDR, peer.mac.as_bytes())
                .expect(FIXTURE_MSG);
            if peer.with_resp {
                put_resp(&mut builder, peer);
            }
            builder.nest_end(entry).expect(FIXTURE_MSG);
        }
        builder.nest_end(peers).expect(FIXTURE_MSG);
        builder.nest_end(pmsr).expect(FIXTURE_MSG);
        builder.finish().expect(FIXTURE_MSG)
    }
}

fn put_resp(builder: &mut MessageBuilder, peer: &PeerFixture) {
    let resp = builder.nest_start(NL80211_PMSR_PEER_ATTR_RESP).expect(FIXTURE_MSG);
    if let Some(status) = peer.fields.status {
        builder.put_u32(NL80211_PMSR_RESP_ATTR_STATUS, status).expect(FIXTURE_MSG);
    }
    if let Some(host_time) = peer.fields.host_time {
        builder
            .put_u64(NL80211_PMSR_RESP_ATTR_HOST_TIME, host_time)
            .expect(FIXTURE_MSG);
    }
    if peer.fields.final_report {
        builder.put_flag(NL80211_PMSR_RESP_ATTR_FINAL).expect(FIXTURE_MSG);
    }

    let data = builder.nest_start(NL80211_PMSR_RESP_ATTR_DATA).expect(FIXTURE_MSG);
    let ftm = builder.nest_start(NL80211_PMSR_TYPE_FTM).expect(FIXTURE_MSG);
    for field in FTM_RESPONSE_FIELDS.iter() {
        let Some(value) = (field.get)(&peer.fields) else {
            continue;
        };
        match value {
            FieldValue::U8(v) => builder.put_u8(field.tag, v),
            FieldValue::U32(v) => builder.put_u32(field.tag, v),
            FieldValue::S32(v) => builder.put_i32(field.tag, v),
            FieldValue::U64(v) => builder.put_u64(field.tag, v),
            FieldValue::S64(v) => builder.put_i64(field.tag, v),
        }
        .expect(FIXTURE_MSG);
    }
    for (tag, payload) in &peer.raw_ftm {
        builder.put_bytes(*tag, payload).expect(FIXTURE_MSG);
    }
    builder.nest_end(ftm).expect(FIXTURE_MSG);
    builder.nest_end(data).expect(FIXTURE_MSG);
    builder.nest_end(resp).expect(FIXTURE_MSG);
}

/// 只带一个 peer 的结果报文
pub fn result(family: u16, cookie: u64, mac: MacAddr, fields: PeerResponse) -> Bytes {
    ResultBuilder::new(family, cookie).peer(mac, fields).build()
}

/// `PEER_MEASUREMENT_COMPLETE` 报文
pub fn complete(family: u16, cookie: u64) -> Bytes {
    let mut builder = MessageBuilder::genl(family, 0, 0, NL80211_CMD_PEER_MEASUREMENT_COMPLETE, 0);
    builder.put_u64(NL80211_ATTR_COOKIE, cookie).expect(FIXTURE_MSG);
    builder.finish().expect(FIXTURE_MSG)
}

/// 任意命令的空 genl 报文
pub fn genl(family: u16, seq: u32, cmd: u8) -> Bytes {
    MessageBuilder::genl(family, 0, seq, cmd, 0)
        .finish()
        .expect(FIXTURE_MSG)
}

/// `CTRL_CMD_NEWFAMILY` 回复
pub fn family_reply(seq: u32, family_id: u16) -> Bytes {
    // CTRL_CMD_NEWFAMILY = 1
    let mut builder = MessageBuilder::genl(GENL_ID_CTRL, 0, seq, 1, 2);
    builder.put_str(CTRL_ATTR_FAMILY_NAME, NL80211_GENL_NAME).expect(FIXTURE_MSG);
    builder.put_u16(CTRL_ATTR_FAMILY_ID, family_id).expect(FIXTURE_MSG);
    builder.finish().expect(FIXTURE_MSG)
}

/// ACK（错误码为 0 的 `NLMSG_ERROR`）
pub fn ack(seq: u32) -> Bytes {
    error_reply(seq, 0, None, None)
}

/// 携带测量 cookie 的 ACK（`NLMSGERR_ATTR_COOKIE`）
pub fn ack_with_cookie(seq: u32, cookie: u64) -> Bytes {
    error_reply(seq, 0, None, Some(cookie))
}

/// `NLMSG_ERROR`，可选携带扩展 ACK 信息
pub fn error(seq: u32, code: i32, message: Option<&str>) -> Bytes {
    error_reply(seq, code, message, None)
}

fn error_reply(seq: u32, code: i32, message: Option<&str>, cookie: Option<u64>) -> Bytes {
    let mut body = BytesMut::new();
    body.put_i32_ne(code);
    NlMsgHdr {
        len: NLMSG_HDRLEN as u32,
        msg_type: 0,
        flags: NLM_F_REQUEST | NLM_F_ACK,
        seq,
        pid: 0,
    }
    .write(&mut body);

    let mut flags = NLM_F_CAPPED;
    if let Some(text) = message {
        flags |= NLM_F_ACK_TLVS;
        let mut payload = text.as_bytes().to_vec();
        payload.push(0);
        put_tlv(&mut body, NLMSGERR_ATTR_MSG, &payload);
    }
    if let Some(cookie) = cookie {
        flags |= NLM_F_ACK_TLVS;
        put_tlv(&mut body, NLMSGERR_ATTR_COOKIE, &cookie.to_ne_bytes());
    }

    let mut buf = BytesMut::new();
    NlMsgHdr {
        len: (NLMSG_HDRLEN + body.len()) as u32,
        msg_type: NLMSG_ERROR,
        flags,
        seq,
        pid: 0,
    }
    .write(&mut buf);
    buf.put_slice(&body);
    buf.freeze()
}

fn put_tlv(buf: &mut BytesMut, kind: u16, payload: &[u8]) {
    let len = 4 + payload.len();
    buf.put_u16_ne(len as u16);
    buf.put_u16_ne(kind);
    buf.put_slice(payload);
    buf.put_bytes(0, nlmsg_align(len) - len);
}

/// `NLMSG_DONE`
pub fn done(seq: u32) -> Bytes {
    control(NLMSG_DONE, seq)
}

/// `NLMSG_NOOP`
pub fn noop(seq: u32) -> Bytes {
    control(NLMSG_NOOP, seq)
}

fn control(msg_type: u16, seq: u32) -> Bytes {
    let mut buf = BytesMut::new();
    NlMsgHdr {
        len: (NLMSG_HDRLEN + 4) as u32,
        msg_type,
        flags: NLM_F_MULTI,
        seq,
        pid: 0,
    }
    .write(&mut buf);
    buf.put_i32_ne(0);
    buf.freeze()
}

/// 把多条报文拼成一个 datagram
pub fn datagram(parts: &[Bytes]) -> Bytes {
    let mut buf = BytesMut::new();
    for part in parts {
        buf.put_slice(part);
    }
    buf.freeze()
}
