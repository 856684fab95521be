//! netlink / nl80211 常量定义
//!
//! 数值与内核头文件 `linux/netlink.h`、`linux/genetlink.h`、`linux/nl80211.h`
//! 保持一致，属于内核 ABI，不可修改。

// ============================================================================
// netlink 报文层
// ============================================================================

pub const NLMSG_NOOP: u16 = 1;
pub const NLMSG_ERROR: u16 = 2;
pub const NLMSG_DONE: u16 = 3;
pub const NLMSG_OVERRUN: u16 = 4;

pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_ACK: u16 = 0x04;
/// 错误回复中只回显了请求头（未附带原始负载）
pub const NLM_F_CAPPED: u16 = 0x100;
/// 错误回复中附带扩展 ACK TLV
pub const NLM_F_ACK_TLVS: u16 = 0x200;

/// 扩展 ACK 中的可读错误信息
pub const NLMSGERR_ATTR_MSG: u16 = 1;
/// 扩展 ACK 中的 cookie（测量请求被接受时由内核填写）
pub const NLMSGERR_ATTR_COOKIE: u16 = 3;

pub const NLA_F_NESTED: u16 = 0x8000;
pub const NLA_F_NET_BYTEORDER: u16 = 0x4000;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

// ============================================================================
// generic netlink 控制器（族 ID 解析）
// ============================================================================

pub const GENL_ID_CTRL: u16 = 0x10;
pub const CTRL_CMD_GETFAMILY: u8 = 3;
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;

/// nl80211 族名称
pub const NL80211_GENL_NAME: &str = "nl80211";

// ============================================================================
// nl80211 命令
// ============================================================================

pub const NL80211_CMD_PEER_MEASUREMENT_START: u8 = 131;
pub const NL80211_CMD_PEER_MEASUREMENT_RESULT: u8 = 132;
pub const NL80211_CMD_PEER_MEASUREMENT_COMPLETE: u8 = 133;

// ============================================================================
// nl80211 顶层属性
// ============================================================================

pub const NL80211_ATTR_IFINDEX: u16 = 3;
pub const NL80211_ATTR_WIPHY_FREQ: u16 = 38;
pub const NL80211_ATTR_COOKIE: u16 = 88;
pub const NL80211_ATTR_CHANNEL_WIDTH: u16 = 159;
pub const NL80211_ATTR_PEER_MEASUREMENTS: u16 = 273;

// === enum nl80211_peer_measurement_attrs ===
pub const NL80211_PMSR_ATTR_PEERS: u16 = 5;

// === enum nl80211_peer_measurement_peer_attrs ===
pub const NL80211_PMSR_PEER_ATTR_ADDR: u16 = 1;
pub const NL80211_PMSR_PEER_ATTR_CHAN: u16 = 2;
pub const NL80211_PMSR_PEER_ATTR_REQ: u16 = 3;
pub const NL80211_PMSR_PEER_ATTR_RESP: u16 = 4;

// === enum nl80211_peer_measurement_req ===
pub const NL80211_PMSR_REQ_ATTR_DATA: u16 = 1;

// === enum nl80211_peer_measurement_resp ===
pub const NL80211_PMSR_RESP_ATTR_DATA: u16 = 1;
pub const NL80211_PMSR_RESP_ATTR_STATUS: u16 = 2;
pub const NL80211_PMSR_RESP_ATTR_HOST_TIME: u16 = 3;
pub const NL80211_PMSR_RESP_ATTR_FINAL: u16 = 5;

// === enum nl80211_peer_measurement_type ===
pub const NL80211_PMSR_TYPE_FTM: u16 = 1;

// === enum nl80211_peer_measurement_ftm_req ===
pub const NL80211_PMSR_FTM_REQ_ATTR_ASAP: u16 = 1;
pub const NL80211_PMSR_FTM_REQ_ATTR_PREAMBLE: u16 = 2;
pub const NL80211_PMSR_FTM_REQ_ATTR_NUM_BURSTS_EXP: u16 = 3;
pub const NL80211_PMSR_FTM_REQ_ATTR_BURST_PERIOD: u16 = 4;
pub const NL80211_PMSR_FTM_REQ_ATTR_BURST_DURATION: u16 = 5;
pub const NL80211_PMSR_FTM_REQ_ATTR_FTMS_PER_BURST: u16 = 6;
pub const NL80211_PMSR_FTM_REQ_ATTR_NUM_FTMR_RETRIES: u16 = 7;

// === enum nl80211_peer_measurement_ftm_resp ===
pub const NL80211_PMSR_FTM_RESP_ATTR_FAIL_REASON: u16 = 1;
pub const NL80211_PMSR_FTM_RESP_ATTR_BURST_INDEX: u16 = 2;
pub const NL80211_PMSR_FTM_RESP_ATTR_NUM_FTMR_ATTEMPTS: u16 = 3;
pub const NL80211_PMSR_FTM_RESP_ATTR_NUM_FTMR_SUCCESSES: u16 = 4;
pub const NL80211_PMSR_FTM_RESP_ATTR_BUSY_RETRY_TIME: u16 = 5;
pub const NL80211_PMSR_FTM_RESP_ATTR_NUM_BURSTS_EXP: u16 = 6;
pub const NL80211_PMSR_FTM_RESP_ATTR_BURST_DURATION: u16 = 7;
pub const NL80211_PMSR_FTM_RESP_ATTR_FTMS_PER_BURST: u16 = 8;
pub const NL80211_PMSR_FTM_RESP_ATTR_RSSI_AVG: u16 = 9;
pub const NL80211_PMSR_FTM_RESP_ATTR_RSSI_SPREAD: u16 = 10;
pub const NL80211_PMSR_FTM_RESP_ATTR_RTT_AVG: u16 = 13;
pub const NL80211_PMSR_FTM_RESP_ATTR_RTT_VARIANCE: u16 = 14;
pub const NL80211_PMSR_FTM_RESP_ATTR_RTT_SPREAD: u16 = 15;
pub const NL80211_PMSR_FTM_RESP_ATTR_DIST_AVG: u16 = 16;
pub const NL80211_PMSR_FTM_RESP_ATTR_DIST_VARIANCE: u16 = 17;
pub const NL80211_PMSR_FTM_RESP_ATTR_DIST_SPREAD: u16 = 18;
pub const NL80211_PMSR_FTM_RESP_ATTR_PAD: u16 = 21;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mask_strips_flags() {
        let ty = NL80211_ATTR_PEER_MEASUREMENTS | NLA_F_NESTED;
        assert_eq!(ty & NLA_TYPE_MASK, NL80211_ATTR_PEER_MEASUREMENTS);
        assert_eq!(NLA_TYPE_MASK, 0x3FFF);
    }

    #[test]
    fn test_pmsr_commands_are_consecutive() {
        assert_eq!(
            NL80211_CMD_PEER_MEASUREMENT_RESULT,
            NL80211_CMD_PEER_MEASUREMENT_START + 1
        );
        assert_eq!(
            NL80211_CMD_PEER_MEASUREMENT_COMPLETE,
            NL80211_CMD_PEER_MEASUREMENT_START + 2
        );
    }
}
