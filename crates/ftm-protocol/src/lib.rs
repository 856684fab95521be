//! # FTM Protocol
//!
//! nl80211 峰值测量（PMSR / FTM）报文定义与编解码（无 socket 依赖）
//!
//! ## 模块
//!
//! - `ids`: netlink / genl / nl80211 常量定义
//! - `attr`: 嵌套属性（TLV）构建与解析
//! - `message`: netlink 报文头与报文迭代
//! - `types`: MAC 地址、信道宽度、前导码等基础类型
//! - `request`: 测距请求编码（`PEER_MEASUREMENT_START`）
//! - `response`: 测距结果解码（`PEER_MEASUREMENT_RESULT`）
//!
//! ## 字节序
//!
//! netlink 使用主机字节序（native endian），属性按 4 字节对齐。

pub mod attr;
#[cfg(any(test, feature = "mock"))]
pub mod fixtures;
pub mod ids;
pub mod message;
pub mod request;
pub mod response;
pub mod types;

// 重新导出常用类型
pub use attr::{Attr, AttrIter, AttrTable, MessageBuilder, NestToken};
pub use message::{ErrorMessage, GenlMessage, MessageIter, NetlinkMessage, NlMsgHdr};
pub use request::{
    MeasurementConfig, PeerRequest, decode_start_request, encode_family_request,
    encode_start_request, encode_start_request_with_limit,
};
pub use response::{
    FTM_RESPONSE_FIELDS, FieldDescriptor, FieldValue, PeerResponse, PmsrStatus, ResultReport,
    WireType, decode_peer, decode_result,
};
pub use types::{ChannelWidth, MacAddr, Preamble};

use thiserror::Error;

/// 协议编解码错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 请求构建失败（容量耗尽、嵌套未按顺序关闭等），不会产出半成品报文
    #[error("Build failure: {0}")]
    BuildFailure(String),

    /// 必需属性缺失（解码失败，整条报文被拒绝）
    #[error("Missing attribute: {0}")]
    MissingAttribute(&'static str),

    #[error("Invalid length for {field}: expected {expected}, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Truncated message: need {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::MissingAttribute("NL80211_ATTR_COOKIE");
        assert_eq!(format!("{}", err), "Missing attribute: NL80211_ATTR_COOKIE");

        let err = ProtocolError::InvalidLength {
            field: "rtt_avg",
            expected: 8,
            actual: 4,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("rtt_avg") && msg.contains("expected 8"));

        let err = ProtocolError::BuildFailure("nest overflow".to_string());
        assert!(format!("{}", err).contains("nest overflow"));
    }
}
