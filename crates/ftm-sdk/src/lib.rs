//! FTM SDK - Wi-Fi 精细时间测量（FTM）测距 Rust SDK
//!
//! 通过 nl80211 的 peer measurement 接口向内核提交 FTM 测距请求，
//! 接收并解码测量结果，跨多次尝试计算运行平均。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): netlink/genl 报文与嵌套属性的编码/解码
//! - **通道层** (`netlink`): generic netlink socket、回复分发、网卡索引解析
//! - **驱动层** (`driver`): 多次测量会话、结果核对与收集
//! - **工具层** (`tools`): 统计、尝试记录、配置文件
//!
//! # 快速开始
//!
//! ```rust,ignore
//! use ftm_sdk::prelude::*;
//!
//! ftm_sdk::init_logger("info")?;
//! let ifindex = resolve_ifindex("wlan0")?;
//! let config = load_config("ftm.toml", ifindex)?;
//!
//! let mut stats = StatisticsAggregator::new(&config, 5);
//! let mut controller = SessionController::new(ChannelSession::open()?);
//! let report = controller.run(&config, 5, |results, _, index| {
//!     stats.observe(results.responses(), index);
//! });
//! ```

pub use ftm_driver as driver;
pub use ftm_netlink as netlink;
pub use ftm_protocol as protocol;
pub use ftm_tools as tools;

pub mod prelude;

// 各层错误
pub use ftm_driver::DriverError;
pub use ftm_netlink::NetlinkError;
pub use ftm_protocol::ProtocolError;

// 常用类型
pub use ftm_driver::{ResultsWrap, RunReport, SessionController};
pub use ftm_protocol::{MacAddr, MeasurementConfig, PeerRequest, PeerResponse};
pub use ftm_tools::{AttemptLog, StatisticsAggregator};

#[cfg(target_os = "linux")]
pub use ftm_netlink::{ChannelSession, resolve_ifindex};

use std::sync::Once;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

static LOGGER_INIT: Once = Once::new();

/// 初始化日志
///
/// 安装 `tracing` 全局 subscriber（输出到 stderr，`RUST_LOG` 优先，否则使用
/// `default_directive`），并把 `log` crate 的记录转发到 `tracing`。
/// 只有第一次调用生效，之后的调用直接返回 `Ok`。
pub fn init_logger(default_directive: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_directive))?;

    let mut result = Ok(());
    LOGGER_INIT.call_once(|| result = install_logger(filter));
    result
}

fn install_logger(filter: EnvFilter) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr),
    );
    tracing::subscriber::set_global_default(subscriber)?;

    tracing_log::LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init()?;
    Ok(())
}
