//! # FTM Tools - 测距统计与辅助工具
//!
//! **依赖原则**: 只依赖 `ftm-protocol`，不依赖通道层与会话层
//!
//! ## 包含模块
//!
//! - `statistics` - RTT/距离换算与跨尝试的运行平均
//! - `recording` - 每次尝试的记录与日志文件
//! - `config` - TOML 测距配置文件

pub mod config;
pub mod recording;
pub mod statistics;

pub use config::{ConfigFile, PeerEntry, load_config, parse_config};
pub use recording::{AttemptLog, AttemptRecord, PeerLog, log_file_name};
pub use statistics::{
    PeerStatistics, ProcessedResult, SPEED_OF_LIGHT, StatisticsAggregator, distance_from_rtt,
    relative_difference, rtt_from_distance,
};
