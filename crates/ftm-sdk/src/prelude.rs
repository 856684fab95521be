//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use ftm_sdk::prelude::*;
//! ```

// 协议层
pub use ftm_protocol::{
    ChannelWidth, MacAddr, MeasurementConfig, PeerRequest, PeerResponse, Preamble,
};

// 通道层
pub use ftm_netlink::NetlinkTransport;
#[cfg(target_os = "linux")]
pub use ftm_netlink::{ChannelSession, resolve_ifindex};

// 驱动层
pub use ftm_driver::{AttemptState, ResultsWrap, RunReport, SessionController};

// 工具层
pub use ftm_tools::{
    AttemptLog, PeerStatistics, ProcessedResult, StatisticsAggregator, distance_from_rtt,
    load_config, rtt_from_distance,
};

// 错误类型
pub use ftm_driver::DriverError;
pub use ftm_netlink::NetlinkError;
pub use ftm_protocol::ProtocolError;
