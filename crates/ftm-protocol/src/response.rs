//! 测距结果（`NL80211_CMD_PEER_MEASUREMENT_RESULT`）解码
//!
//! 结果属性树：
//!
//! ```text
//! COOKIE (u64)
//! PEER_MEASUREMENTS
//! └── PEERS
//!     └── <entry>
//!         ├── ADDR (6 bytes)
//!         └── RESP
//!             ├── STATUS (u32)       可选
//!             ├── HOST_TIME (u64)    可选
//!             ├── FINAL (flag)
//!             └── DATA
//!                 └── FTM
//!                     └── 16 个可选字段，见 [`FTM_RESPONSE_FIELDS`]
//! ```
//!
//! 结构性属性缺失时整条报文被拒绝；FTM 字段缺失只表示该字段未上报，
//! 与数值 0 不同。

use crate::ProtocolError;
use crate::attr::Attr;
use crate::ids::*;
use crate::message::GenlMessage;
use crate::types::MacAddr;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// 测量状态（`enum nl80211_peer_measurement_status`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum PmsrStatus {
    Success = 0,
    Refused = 1,
    Timeout = 2,
    Failure = 3,
}

/// 单个 peer 的测量结果
///
/// 所有线上字段都是可选的，`None` 表示固件没有上报。
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerResponse {
    pub mac: MacAddr,
    /// 原始状态值（见 [`PmsrStatus`]）
    pub status: Option<u32>,
    /// 主机启动时间（纳秒）
    pub host_time: Option<u64>,
    /// 该 peer 的最后一份报告
    pub final_report: bool,

    pub fail_reason: Option<u32>,
    pub burst_index: Option<u32>,
    pub num_ftmr_attempts: Option<u32>,
    pub num_ftmr_successes: Option<u32>,
    pub busy_retry_time: Option<u32>,
    pub num_bursts_exp: Option<u8>,
    pub burst_duration: Option<u8>,
    pub ftms_per_burst: Option<u8>,
    /// 平均 RSSI（dBm）
    pub rssi_avg: Option<i32>,
    pub rssi_spread: Option<u32>,
    /// 平均 RTT（皮秒）
    pub rtt_avg: Option<i64>,
    pub rtt_variance: Option<u64>,
    pub rtt_spread: Option<u64>,
    /// 平均距离（毫米）
    pub dist_avg: Option<i64>,
    pub dist_variance: Option<u64>,
    pub dist_spread: Option<u64>,

    /// RTT 校正偏移（皮秒，来自请求配置）
    pub rtt_correction: Option<i64>,
    /// 实际距离（米，来自请求配置）
    pub dist_truth: Option<f64>,
}

impl PeerResponse {
    pub fn pmsr_status(&self) -> Option<PmsrStatus> {
        self.status.and_then(|s| PmsrStatus::try_from(s).ok())
    }
}

/// 属性线上类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    U8,
    U32,
    S32,
    U64,
    S64,
}

impl WireType {
    /// 属性 payload 的字节数
    pub const fn width(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U32 | Self::S32 => 4,
            Self::U64 | Self::S64 => 8,
        }
    }

    pub fn read(self, attr: &Attr<'_>, name: &'static str) -> Result<FieldValue, ProtocolError> {
        Ok(match self {
            Self::U8 => FieldValue::U8(attr.get_u8(name)?),
            Self::U32 => FieldValue::U32(attr.get_u32(name)?),
            Self::S32 => FieldValue::S32(attr.get_i32(name)?),
            Self::U64 => FieldValue::U64(attr.get_u64(name)?),
            Self::S64 => FieldValue::S64(attr.get_i64(name)?),
        })
    }
}

/// 解码后的字段值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    U8(u8),
    U32(u32),
    S32(i32),
    U64(u64),
    S64(i64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{}", v),
            Self::U32(v) => write!(f, "{}", v),
            Self::S32(v) => write!(f, "{}", v),
            Self::U64(v) => write!(f, "{}", v),
            Self::S64(v) => write!(f, "{}", v),
        }
    }
}

/// FTM 结果字段描述
pub struct FieldDescriptor {
    pub name: &'static str,
    pub tag: u16,
    pub wire: WireType,
    pub set: fn(&mut PeerResponse, FieldValue),
    pub get: fn(&PeerResponse) -> Option<FieldValue>,
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("wire", &self.wire)
            .finish()
    }
}

macro_rules! ftm_field {
    ($name:ident, $tag:expr, $wire:ident) => {
        FieldDescriptor {
            name: stringify!($name),
            tag: $tag,
            wire: WireType::$wire,
            set: |resp: &mut PeerResponse, value: FieldValue| {
                if let FieldValue::$wire(v) = value {
                    resp.$name = Some(v);
                }
            },
            get: |resp: &PeerResponse| resp.$name.map(FieldValue::$wire),
        }
    };
}

/// FTM 结果字段表（按线上编号排序）
pub const FTM_RESPONSE_FIELDS: [FieldDescriptor; 16] = [
    ftm_field!(fail_reason, NL80211_PMSR_FTM_RESP_ATTR_FAIL_REASON, U32),
    ftm_field!(burst_index, NL80211_PMSR_FTM_RESP_ATTR_BURST_INDEX, U32),
    ftm_field!(num_ftmr_attempts, NL80211_PMSR_FTM_RESP_ATTR_NUM_FTMR_ATTEMPTS, U32),
    ftm_field!(num_ftmr_successes, NL80211_PMSR_FTM_RESP_ATTR_NUM_FTMR_SUCCESSES, U32),
    ftm_field!(busy_retry_time, NL80211_PMSR_FTM_RESP_ATTR_BUSY_RETRY_TIME, U32),
    ftm_field!(num_bursts_exp, NL80211_PMSR_FTM_RESP_ATTR_NUM_BURSTS_EXP, U8),
    ftm_field!(burst_duration, NL80211_PMSR_FTM_RESP_ATTR_BURST_DURATION, U8),
    ftm_field!(ftms_per_burst, NL80211_PMSR_FTM_RESP_ATTR_FTMS_PER_BURST, U8),
    ftm_field!(rssi_avg, NL80211_PMSR_FTM_RESP_ATTR_RSSI_AVG, S32),
    ftm_field!(rssi_spread, NL80211_PMSR_FTM_RESP_ATTR_RSSI_SPREAD, U32),
    ftm_field!(rtt_avg, NL80211_PMSR_FTM_RESP_ATTR_RTT_AVG, S64),
    ftm_field!(rtt_variance, NL80211_PMSR_FTM_RESP_ATTR_RTT_VARIANCE, U64),
    ftm_field!(rtt_spread, NL80211_PMSR_FTM_RESP_ATTR_RTT_SPREAD, U64),
    ftm_field!(dist_avg, NL80211_PMSR_FTM_RESP_ATTR_DIST_AVG, S64),
    ftm_field!(dist_variance, NL80211_PMSR_FTM_RESP_ATTR_DIST_VARIANCE, U64),
    ftm_field!(dist_spread, NL80211_PMSR_FTM_RESP_ATTR_DIST_SPREAD, U64),
];

/// 按线上编号查找字段描述
pub fn field_by_tag(tag: u16) -> Option<&'static FieldDescriptor> {
    FTM_RESPONSE_FIELDS.iter().find(|f| f.tag == tag)
}

/// 一条结果报文
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultReport {
    /// 内核为本次测量请求分配的 cookie
    pub cookie: u64,
    pub peers: Vec<PeerResponse>,
}

/// 解码一条结果报文
pub fn decode_result(msg: &GenlMessage) -> Result<ResultReport, ProtocolError> {
    let table = msg.table()?;

    let cookie = table
        .require(NL80211_ATTR_COOKIE, "NL80211_ATTR_COOKIE")?
        .get_u64("cookie")?;
    let pmsr = table
        .require(NL80211_ATTR_PEER_MEASUREMENTS, "NL80211_ATTR_PEER_MEASUREMENTS")?
        .table()?;
    let peers_attr = pmsr.require(NL80211_PMSR_ATTR_PEERS, "NL80211_PMSR_ATTR_PEERS")?;

    let mut peers = Vec::new();
    for entry in peers_attr.nested() {
        peers.push(decode_peer(&entry?)?);
    }

    Ok(ResultReport { cookie, peers })
}

/// 解码单个 peer 条目
pub fn decode_peer(entry: &Attr<'_>) -> Result<PeerResponse, ProtocolError> {
    let entry = entry.table()?;

    let mac = MacAddr::from_slice(
        entry
            .require(NL80211_PMSR_PEER_ATTR_ADDR, "NL80211_PMSR_PEER_ATTR_ADDR")?
            .payload(),
    )?;
    let resp = entry
        .require(NL80211_PMSR_PEER_ATTR_RESP, "NL80211_PMSR_PEER_ATTR_RESP")?
        .table()?;
    let ftm = resp
        .require(NL80211_PMSR_RESP_ATTR_DATA, "NL80211_PMSR_RESP_ATTR_DATA")?
        .table()?
        .require(NL80211_PMSR_TYPE_FTM, "NL80211_PMSR_TYPE_FTM")?;

    let mut response = PeerResponse {
        mac,
        status: resp
            .get(NL80211_PMSR_RESP_ATTR_STATUS)
            .map(|a| a.get_u32("status"))
            .transpose()?,
        host_time: resp
            .get(NL80211_PMSR_RESP_ATTR_HOST_TIME)
            .map(|a| a.get_u64("host_time"))
            .transpose()?,
        final_report: resp.contains(NL80211_PMSR_RESP_ATTR_FINAL),
        ..Default::default()
    };

    for attr in ftm.nested() {
        let attr = attr?;
        // 未知属性（含 PAD）直接忽略
        let Some(field) = field_by_tag(attr.kind()) else {
            continue;
        };
        if attr.payload().len() != field.wire.width() {
            return Err(ProtocolError::InvalidLength {
                field: field.name,
                expected: field.wire.width(),
                actual: attr.payload().len(),
            });
        }
        (field.set)(&mut response, field.wire.read(&attr, field.name)?);
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::ResultBuilder;
    use crate::message::MessageIter;

    fn decode(bytes: bytes::Bytes) -> Result<ResultReport, ProtocolError> {
        let msg = MessageIter::new(bytes).next().unwrap().unwrap();
        decode_result(&msg.as_generic().unwrap())
    }

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0x0a, 0x83, 0xa1, 0x15, 0xbf, last])
    }

    #[test]
    fn test_descriptor_table_is_consistent() {
        let mut tags: Vec<u16> = FTM_RESPONSE_FIELDS.iter().map(|f| f.tag).collect();
        tags.dedup();
        assert_eq!(tags.len(), 16);
        assert!(tags.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(field_by_tag(NL80211_PMSR_FTM_RESP_ATTR_RTT_AVG).unwrap().name, "rtt_avg");
        assert!(field_by_tag(NL80211_PMSR_FTM_RESP_ATTR_PAD).is_none());
    }

    #[test]
    fn test_decode_full_result() {
        let fields = PeerResponse {
            rtt_avg: Some(500),
            rtt_variance: Some(20),
            rtt_spread: Some(7),
            rssi_avg: Some(-40),
            dist_avg: Some(75),
            num_ftmr_attempts: Some(5),
            num_ftmr_successes: Some(4),
            status: Some(0),
            final_report: true,
            ..Default::default()
        };
        let bytes = ResultBuilder::new(0x1c, 0xdead_beef)
            .peer(mac(0x50), fields)
            .build();

        let report = decode(bytes).unwrap();
        assert_eq!(report.cookie, 0xdead_beef);
        assert_eq!(report.peers.len(), 1);
        let peer = &report.peers[0];
        assert_eq!(peer.mac, mac(0x50));
        assert_eq!(peer.rtt_avg, Some(500));
        assert_eq!(peer.rtt_variance, Some(20));
        assert_eq!(peer.rtt_spread, Some(7));
        assert_eq!(peer.rssi_avg, Some(-40));
        assert_eq!(peer.dist_avg, Some(75));
        assert_eq!(peer.num_ftmr_successes, Some(4));
        assert_eq!(peer.fail_reason, None);
        assert_eq!(peer.burst_index, None);
        assert_eq!(peer.pmsr_status(), Some(PmsrStatus::Success));
        assert!(peer.final_report);
    }

    #[test]
    fn test_absent_is_not_zero() {
        let bytes = ResultBuilder::new(0x1c, 1)
            .peer(
                mac(1),
                PeerResponse {
                    rtt_avg: Some(0),
                    ..Default::default()
                },
            )
            .build();
        let peer = &decode(bytes).unwrap().peers[0];
        assert_eq!(peer.rtt_avg, Some(0));
        assert_eq!(peer.rssi_avg, None);
        assert_eq!(peer.status, None);
        assert!(!peer.final_report);
    }

    #[test]
    fn test_missing_cookie_rejects_message() {
        let bytes = ResultBuilder::new(0x1c, 1)
            .peer(mac(1), PeerResponse::default())
            .without_cookie()
            .build();
        assert_eq!(
            decode(bytes).unwrap_err(),
            ProtocolError::MissingAttribute("NL80211_ATTR_COOKIE")
        );
    }

    #[test]
    fn test_missing_resp_rejects_message() {
        let bytes = ResultBuilder::new(0x1c, 1)
            .peer(mac(1), PeerResponse::default())
            .without_resp()
            .build();
        assert_eq!(
            decode(bytes).unwrap_err(),
            ProtocolError::MissingAttribute("NL80211_PMSR_PEER_ATTR_RESP")
        );
    }

    #[test]
    fn test_wrong_width_rejects_message() {
        let bytes = ResultBuilder::new(0x1c, 1)
            .peer(mac(1), PeerResponse::default())
            .with_raw_ftm_attr(NL80211_PMSR_FTM_RESP_ATTR_RTT_AVG, &500u32.to_ne_bytes())
            .build();
        assert_eq!(
            decode(bytes).unwrap_err(),
            ProtocolError::InvalidLength {
                field: "rtt_avg",
                expected: 8,
                actual: 4
            }
        );
    }

    #[test]
    fn test_unknown_and_pad_attributes_ignored() {
        let bytes = ResultBuilder::new(0x1c, 1)
            .peer(
                mac(1),
                PeerResponse {
                    rtt_avg: Some(42),
                    ..Default::default()
                },
            )
            .with_raw_ftm_attr(NL80211_PMSR_FTM_RESP_ATTR_PAD, &[])
            .with_raw_ftm_attr(30, &[1, 2, 3])
            .build();
        assert_eq!(decode(bytes).unwrap().peers[0].rtt_avg, Some(42));
    }

    #[test]
    fn test_multiple_peers_in_one_message() {
        let bytes = ResultBuilder::new(0x1c, 9)
            .peer(
                mac(1),
                PeerResponse {
                    rtt_avg: Some(100),
                    ..Default::default()
                },
            )
            .peer(
                mac(2),
                PeerResponse {
                    rtt_avg: Some(200),
                    ..Default::default()
                },
            )
            .build();
        let report = decode(bytes).unwrap();
        let avgs: Vec<_> = report.peers.iter().map(|p| p.rtt_avg).collect();
        assert_eq!(avgs, vec![Some(100), Some(200)]);
        assert_eq!(report.peers[1].mac, mac(2));
    }

    #[test]
    fn test_descriptor_getters() {
        let resp = PeerResponse {
            rtt_avg: Some(-3),
            ftms_per_burst: Some(8),
            ..Default::default()
        };
        let rendered: Vec<String> = FTM_RESPONSE_FIELDS
            .iter()
            .filter_map(|f| (f.get)(&resp).map(|v| format!("{}={}", f.name, v)))
            .collect();
        assert_eq!(rendered, vec!["ftms_per_burst=8", "rtt_avg=-3"]);
    }
}
