//! 测距请求（`NL80211_CMD_PEER_MEASUREMENT_START`）
//!
//! 请求属性树：
//!
//! ```text
//! IFINDEX (u32)
//! PEER_MEASUREMENTS
//! └── PEERS
//!     └── <i>                        每个 peer 一个条目，类型为其下标
//!         ├── ADDR (6 bytes)
//!         ├── REQ
//!         │   └── DATA
//!         │       └── FTM
//!         │           ├── ASAP (flag，仅为 true 时出现)
//!         │           ├── PREAMBLE (u32)
//!         │           ├── NUM_BURSTS_EXP (u8)
//!         │           ├── BURST_PERIOD (u16)
//!         │           ├── BURST_DURATION (u8)
//!         │           ├── FTMS_PER_BURST (u8)
//!         │           └── NUM_FTMR_RETRIES (u8)
//!         └── CHAN
//!             ├── CHANNEL_WIDTH (u32)
//!             └── WIPHY_FREQ (u32)
//! ```

use crate::ProtocolError;
use crate::attr::{AttrTable, DEFAULT_MESSAGE_LIMIT, MessageBuilder};
use crate::ids::*;
use crate::message::MessageIter;
use crate::types::{ChannelWidth, MacAddr, Preamble};
use bytes::Bytes;

/// 单个 peer 的测距参数
///
/// `rtt_correction` 与 `dist_truth` 只在客户端使用，不会编码进请求。
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerRequest {
    pub mac: MacAddr,
    pub chan_width: ChannelWidth,
    /// 中心频率（MHz）
    pub center_freq: u32,
    pub preamble: Preamble,
    /// burst 数量的指数（2^n 个 burst）
    pub num_bursts_exp: u8,
    /// burst 周期（100 ms 单位）
    pub burst_period: u16,
    /// burst 持续时间（编码值）
    pub burst_duration: u8,
    pub ftms_per_burst: u8,
    pub num_ftmr_retries: u8,
    pub asap: bool,
    /// RTT 校正偏移（皮秒）
    pub rtt_correction: Option<i64>,
    /// 实际距离（米），用于反推校正值
    pub dist_truth: Option<f64>,
}

impl PeerRequest {
    pub fn new(mac: MacAddr, center_freq: u32) -> Self {
        Self {
            mac,
            center_freq,
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, chan_width: ChannelWidth, preamble: Preamble) -> Self {
        self.chan_width = chan_width;
        self.preamble = preamble;
        self
    }

    pub fn with_asap(mut self, asap: bool) -> Self {
        self.asap = asap;
        self
    }

    pub fn with_rtt_correction(mut self, offset_ps: i64) -> Self {
        self.rtt_correction = Some(offset_ps);
        self
    }

    pub fn with_dist_truth(mut self, meters: f64) -> Self {
        self.dist_truth = Some(meters);
        self
    }
}

/// 一次测距请求的完整配置
///
/// peer 在列表中的位置即线上的 peer 编号。
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasurementConfig {
    /// 网络接口索引
    pub ifindex: u32,
    pub peers: Vec<PeerRequest>,
}

impl MeasurementConfig {
    pub fn new(ifindex: u32, peers: Vec<PeerRequest>) -> Self {
        Self { ifindex, peers }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

/// 编码测距请求
///
/// 报文标志为 `REQUEST | ACK`。peer 列表为空或超出容量时返回
/// `BuildFailure`，不会返回部分构建的报文。
pub fn encode_start_request(
    config: &MeasurementConfig,
    family_id: u16,
    seq: u32,
) -> Result<Bytes, ProtocolError> {
    encode_start_request_with_limit(config, family_id, seq, DEFAULT_MESSAGE_LIMIT)
}

/// 同 [`encode_start_request`]，但指定报文容量上限
pub fn encode_start_request_with_limit(
    config: &MeasurementConfig,
    family_id: u16,
    seq: u32,
    limit: usize,
) -> Result<Bytes, ProtocolError> {
    if config.peers.is_empty() {
        return Err(ProtocolError::BuildFailure(
            "measurement config has no peers".to_string(),
        ));
    }

    let mut builder = MessageBuilder::genl(
        family_id,
        NLM_F_REQUEST | NLM_F_ACK,
        seq,
        NL80211_CMD_PEER_MEASUREMENT_START,
        0,
    )
    .with_limit(limit);

    builder.put_u32(NL80211_ATTR_IFINDEX, config.ifindex)?;

    let pmsr = builder.nest_start(NL80211_ATTR_PEER_MEASUREMENTS)?;
    let peers = builder.nest_start(NL80211_PMSR_ATTR_PEERS)?;
    for (index, peer) in config.peers.iter().enumerate() {
        let kind = u16::try_from(index).map_err(|_| {
            ProtocolError::BuildFailure(format!("too many peers ({})", config.peers.len()))
        })?;
        put_peer(&mut builder, kind, peer)?;
    }
    builder.nest_end(peers)?;
    builder.nest_end(pmsr)?;

    builder.finish()
}

fn put_peer(builder: &mut MessageBuilder, kind: u16, peer: &PeerRequest) -> Result<(), ProtocolError> {
    let entry = builder.nest_start(kind)?;
    builder.put_bytes(NL80211_PMSR_PEER_ATTR_ADDR, peer.mac.as_bytes())?;

    let req = builder.nest_start(NL80211_PMSR_PEER_ATTR_REQ)?;
    let data = builder.nest_start(NL80211_PMSR_REQ_ATTR_DATA)?;
    let ftm = builder.nest_start(NL80211_PMSR_TYPE_FTM)?;
    if peer.asap {
        builder.put_flag(NL80211_PMSR_FTM_REQ_ATTR_ASAP)?;
    }
    builder.put_u32(NL80211_PMSR_FTM_REQ_ATTR_PREAMBLE, peer.preamble.into())?;
    builder.put_u8(NL80211_PMSR_FTM_REQ_ATTR_NUM_BURSTS_EXP, peer.num_bursts_exp)?;
    builder.put_u16(NL80211_PMSR_FTM_REQ_ATTR_BURST_PERIOD, peer.burst_period)?;
    builder.put_u8(NL80211_PMSR_FTM_REQ_ATTR_BURST_DURATION, peer.burst_duration)?;
    builder.put_u8(NL80211_PMSR_FTM_REQ_ATTR_FTMS_PER_BURST, peer.ftms_per_burst)?;
    builder.put_u8(NL80211_PMSR_FTM_REQ_ATTR_NUM_FTMR_RETRIES, peer.num_ftmr_retries)?;
    builder.nest_end(ftm)?;
    builder.nest_end(data)?;
    builder.nest_end(req)?;

    let chan = builder.nest_start(NL80211_PMSR_PEER_ATTR_CHAN)?;
    builder.put_u32(NL80211_ATTR_CHANNEL_WIDTH, peer.chan_width.into())?;
    builder.put_u32(NL80211_ATTR_WIPHY_FREQ, peer.center_freq)?;
    builder.nest_end(chan)?;

    builder.nest_end(entry)
}

/// 编码 genl 族 ID 查询（`CTRL_CMD_GETFAMILY`）
pub fn encode_family_request(name: &str, seq: u32) -> Result<Bytes, ProtocolError> {
    let mut builder = MessageBuilder::genl(
        GENL_ID_CTRL,
        NLM_F_REQUEST | NLM_F_ACK,
        seq,
        CTRL_CMD_GETFAMILY,
        1,
    );
    builder.put_str(CTRL_ATTR_FAMILY_NAME, name)?;
    builder.finish()
}

/// 解析已编码的测距请求（用于校验与测试）
///
/// 客户端字段（`rtt_correction`、`dist_truth`）不在线上，解析结果中为 `None`。
pub fn decode_start_request(bytes: &[u8]) -> Result<MeasurementConfig, ProtocolError> {
    let message = MessageIter::new(Bytes::copy_from_slice(bytes))
        .next()
        .ok_or(ProtocolError::Truncated {
            needed: crate::message::NLMSG_HDRLEN,
            available: bytes.len(),
        })??;
    let genl = message.as_generic()?;
    if genl.cmd != NL80211_CMD_PEER_MEASUREMENT_START {
        return Err(ProtocolError::InvalidValue {
            field: "cmd".to_string(),
            value: genl.cmd.to_string(),
        });
    }

    let table = genl.table()?;
    let ifindex = table
        .require(NL80211_ATTR_IFINDEX, "NL80211_ATTR_IFINDEX")?
        .get_u32("ifindex")?;
    let pmsr = table
        .require(NL80211_ATTR_PEER_MEASUREMENTS, "NL80211_ATTR_PEER_MEASUREMENTS")?
        .table()?;
    let peers_attr = pmsr.require(NL80211_PMSR_ATTR_PEERS, "NL80211_PMSR_ATTR_PEERS")?;

    let mut peers = Vec::new();
    for entry in peers_attr.nested() {
        peers.push(decode_peer_request(&entry?.table()?)?);
    }

    Ok(MeasurementConfig { ifindex, peers })
}

fn decode_peer_request(entry: &AttrTable<'_>) -> Result<PeerRequest, ProtocolError> {
    let mac = MacAddr::from_slice(
        entry
            .require(NL80211_PMSR_PEER_ATTR_ADDR, "NL80211_PMSR_PEER_ATTR_ADDR")?
            .payload(),
    )?;

    let chan = entry
        .require(NL80211_PMSR_PEER_ATTR_CHAN, "NL80211_PMSR_PEER_ATTR_CHAN")?
        .table()?;
    let raw_width = chan
        .require(NL80211_ATTR_CHANNEL_WIDTH, "NL80211_ATTR_CHANNEL_WIDTH")?
        .get_u32("chan_width")?;
    let chan_width = ChannelWidth::try_from(raw_width).map_err(|_| ProtocolError::InvalidValue {
        field: "chan_width".to_string(),
        value: raw_width.to_string(),
    })?;
    let center_freq = chan
        .require(NL80211_ATTR_WIPHY_FREQ, "NL80211_ATTR_WIPHY_FREQ")?
        .get_u32("center_freq")?;

    let ftm = entry
        .require(NL80211_PMSR_PEER_ATTR_REQ, "NL80211_PMSR_PEER_ATTR_REQ")?
        .table()?
        .require(NL80211_PMSR_REQ_ATTR_DATA, "NL80211_PMSR_REQ_ATTR_DATA")?
        .table()?
        .require(NL80211_PMSR_TYPE_FTM, "NL80211_PMSR_TYPE_FTM")?
        .table()?;

    let raw_preamble = ftm
        .require(NL80211_PMSR_FTM_REQ_ATTR_PREAMBLE, "NL80211_PMSR_FTM_REQ_ATTR_PREAMBLE")?
        .get_u32("preamble")?;
    let preamble = Preamble::try_from(raw_preamble).map_err(|_| ProtocolError::InvalidValue {
        field: "preamble".to_string(),
        value: raw_preamble.to_string(),
    })?;

    let u8_field = |kind: u16, name: &'static str| -> Result<u8, ProtocolError> {
        ftm.get(kind).map_or(Ok(0), |attr| attr.get_u8(name))
    };

    Ok(PeerRequest {
        mac,
        chan_width,
        center_freq,
        preamble,
        num_bursts_exp: u8_field(NL80211_PMSR_FTM_REQ_ATTR_NUM_BURSTS_EXP, "num_bursts_exp")?,
        burst_period: ftm
            .get(NL80211_PMSR_FTM_REQ_ATTR_BURST_PERIOD)
            .map_or(Ok(0), |attr| attr.get_u16("burst_period"))?,
        burst_duration: u8_field(NL80211_PMSR_FTM_REQ_ATTR_BURST_DURATION, "burst_duration")?,
        ftms_per_burst: u8_field(NL80211_PMSR_FTM_REQ_ATTR_FTMS_PER_BURST, "ftms_per_burst")?,
        num_ftmr_retries: u8_field(
            NL80211_PMSR_FTM_REQ_ATTR_NUM_FTMR_RETRIES,
            "num_ftmr_retries",
        )?,
        asap: ftm.contains(NL80211_PMSR_FTM_REQ_ATTR_ASAP),
        rtt_correction: None,
        dist_truth: None,
    })
}
