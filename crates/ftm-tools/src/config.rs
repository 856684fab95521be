//! # 测距配置文件
//!
//! TOML 格式，每个 peer 一个 `[[peers]]` 表：
//!
//! ```toml
//! [[peers]]
//! mac = "0a:83:a1:15:bf:50"
//! center_freq = 2412
//! chan_width = "20"          # 20_noht | 20 | 40 | 80 | 80p80 | 160 | 5 | 10
//! preamble = "ht"            # legacy | ht | vht | dmg
//! asap = true
//! ftms_per_burst = 5
//! num_ftmr_retries = 5
//! burst_duration = 15
//! rtt_correction = -50       # 可选，皮秒
//! dist_truth = 3.5           # 可选，米
//! ```
//!
//! 未给出的数值参数取 0，由驱动使用其默认值。

use anyhow::{Context, Result, bail};
use ftm_protocol::{ChannelWidth, MacAddr, MeasurementConfig, PeerRequest, Preamble};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// 配置文件顶层结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
}

/// 单个 peer 的配置项
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerEntry {
    pub mac: String,
    /// 中心频率（MHz）
    pub center_freq: u32,
    #[serde(default)]
    pub chan_width: Option<String>,
    #[serde(default)]
    pub preamble: Option<String>,
    #[serde(default)]
    pub asap: bool,
    #[serde(default)]
    pub num_bursts_exp: u8,
    #[serde(default)]
    pub burst_period: u16,
    #[serde(default)]
    pub burst_duration: u8,
    #[serde(default)]
    pub ftms_per_burst: u8,
    #[serde(default)]
    pub num_ftmr_retries: u8,
    #[serde(default)]
    pub rtt_correction: Option<i64>,
    #[serde(default)]
    pub dist_truth: Option<f64>,
}

impl PeerEntry {
    /// 转换为测距请求参数
    pub fn to_request(&self) -> Result<PeerRequest> {
        let mac: MacAddr = self
            .mac
            .parse()
            .with_context(|| format!("Invalid MAC address '{}'", self.mac))?;
        let chan_width = match &self.chan_width {
            Some(text) => text
                .parse::<ChannelWidth>()
                .with_context(|| format!("Invalid channel width '{}'", text))?,
            None => ChannelWidth::default(),
        };
        let preamble = match &self.preamble {
            Some(text) => text
                .parse::<Preamble>()
                .with_context(|| format!("Invalid preamble '{}'", text))?,
            None => Preamble::default(),
        };

        Ok(PeerRequest {
            mac,
            chan_width,
            center_freq: self.center_freq,
            preamble,
            num_bursts_exp: self.num_bursts_exp,
            burst_period: self.burst_period,
            burst_duration: self.burst_duration,
            ftms_per_burst: self.ftms_per_burst,
            num_ftmr_retries: self.num_ftmr_retries,
            asap: self.asap,
            rtt_correction: self.rtt_correction,
            dist_truth: self.dist_truth,
        })
    }
}

/// 解析配置文本
pub fn parse_config(content: &str, device_index: u32) -> Result<MeasurementConfig> {
    let file: ConfigFile = toml::from_str(content).context("Failed to parse TOML configuration")?;
    if file.peers.is_empty() {
        bail!("Configuration contains no peers");
    }

    let peers = file
        .peers
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            entry
                .to_request()
                .with_context(|| format!("Invalid configuration for peer #{}", index))
        })
        .collect::<Result<Vec<_>>>()?;

    // 结果按 MAC 逐槽位核对，同一 MAC 出现两次无法区分
    let mut seen = HashSet::with_capacity(peers.len());
    for (index, peer) in peers.iter().enumerate() {
        if !seen.insert(peer.mac) {
            bail!("Duplicate peer {} at #{}", peer.mac, index);
        }
    }

    Ok(MeasurementConfig::new(device_index, peers))
}

/// 从文件加载配置
pub fn load_config<P: AsRef<Path>>(path: P, device_index: u32) -> Result<MeasurementConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
    parse_config(&content, device_index)
        .with_context(|| format!("Invalid configuration file {}", path.display()))
}
