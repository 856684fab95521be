//! # 测距统计
//!
//! RTT 与距离的换算、跨尝试的运行平均以及校正值计算。
//!
//! 只有存在且非零的 `rtt_avg` 会计入运行平均；缺失字段不影响任何输出。
//! 校正偏移只在读取时叠加，累计值本身从不被修改。

use crate::recording::AttemptLog;
use ftm_protocol::{MeasurementConfig, PeerResponse};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 光速（m/s）
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// 每秒皮秒数
const PICOS_PER_SECOND: f64 = 1_000_000_000_000.0;

/// RTT（皮秒）换算为距离（米）
pub fn distance_from_rtt(rtt_ps: i64) -> f64 {
    rtt_ps as f64 * SPEED_OF_LIGHT / PICOS_PER_SECOND
}

/// 距离（米）换算为 RTT（皮秒）
pub fn rtt_from_distance(meters: f64) -> f64 {
    meters * PICOS_PER_SECOND / SPEED_OF_LIGHT
}

/// 相对差值 `|(updated - original) / original|`
///
/// `original` 为 0 时无意义，返回 `None`。
pub fn relative_difference(original: f64, updated: f64) -> Option<f64> {
    if original == 0.0 {
        return None;
    }
    Some(((updated - original) / original).abs())
}

/// 单个 peer 的累计统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatistics {
    /// 有效 `rtt_avg` 之和（皮秒）
    pub rtt_sum: i64,
    /// 有效样本数
    pub count: u32,
}

impl PeerStatistics {
    /// 计入一次测量结果，返回是否被计入
    pub fn record(&mut self, response: &PeerResponse) -> bool {
        match response.rtt_avg {
            Some(rtt) if rtt != 0 => {
                self.rtt_sum = self.rtt_sum.saturating_add(rtt);
                self.count += 1;
                true
            },
            _ => false,
        }
    }

    /// 运行平均 RTT（整数除法），无样本时为 `None`
    pub fn running_average(&self) -> Option<i64> {
        if self.count == 0 {
            return None;
        }
        Some(self.rtt_sum / i64::from(self.count))
    }

    /// 叠加校正偏移后的运行平均，溢出时为 `None`
    pub fn corrected_running_average(&self, offset: i64) -> Option<i64> {
        self.running_average().and_then(|avg| avg.checked_add(offset))
    }
}

/// 单次尝试、单个 peer 的派生数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedResult {
    /// 本次 `rtt_avg` 对应的距离
    pub distance: Option<f64>,
    /// `rtt_avg + rtt_correction` 对应的距离
    pub corrected_distance: Option<f64>,
    pub rtt_running_avg: Option<i64>,
    pub distance_running_avg: Option<f64>,
    pub corrected_rtt_running_avg: Option<i64>,
    pub corrected_distance_running_avg: Option<f64>,
    /// 由实际距离反推的 RTT 校正值（仅用于诊断）
    pub rtt_correction_value: Option<i64>,
    /// 本次 RTT 相对运行平均的偏离
    pub deviation: Option<f64>,
}

impl ProcessedResult {
    /// `stats` 应已计入本次结果
    pub fn from_response(response: &PeerResponse, stats: &PeerStatistics) -> Self {
        let distance = response.rtt_avg.map(distance_from_rtt);
        let corrected_distance = response
            .rtt_avg
            .zip(response.rtt_correction)
            .and_then(|(rtt, offset)| rtt.checked_add(offset))
            .map(distance_from_rtt);
        let rtt_running_avg = stats.running_average();
        let corrected_rtt_running_avg = response
            .rtt_correction
            .and_then(|offset| stats.corrected_running_average(offset));
        let rtt_correction_value = distance
            .zip(response.dist_truth)
            .map(|(dist, truth)| rtt_from_distance(dist - truth) as i64);
        let deviation = rtt_running_avg
            .zip(response.rtt_avg)
            .and_then(|(avg, rtt)| relative_difference(avg as f64, rtt as f64));

        Self {
            distance,
            corrected_distance,
            rtt_running_avg,
            distance_running_avg: rtt_running_avg.map(distance_from_rtt),
            corrected_rtt_running_avg,
            corrected_distance_running_avg: corrected_rtt_running_avg.map(distance_from_rtt),
            rtt_correction_value,
            deviation,
        }
    }
}

/// 跨尝试的统计汇总
///
/// 由会话回调在每次尝试完成后调用 [`observe`](Self::observe)。
#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    peers: Vec<PeerStatistics>,
    log: AttemptLog,
}

impl StatisticsAggregator {
    pub fn new(config: &MeasurementConfig, attempts: usize) -> Self {
        Self {
            peers: vec![PeerStatistics::default(); config.peer_count()],
            log: AttemptLog::new(config.peers.iter().map(|p| p.mac), attempts),
        }
    }

    /// 计入一次尝试的结果（按请求顺序），返回每个 peer 的派生数据
    pub fn observe(&mut self, responses: &[PeerResponse], attempt_index: usize) -> Vec<ProcessedResult> {
        if responses.len() > self.peers.len() {
            warn!(
                "Got {} responses for {} peers, extra responses ignored",
                responses.len(),
                self.peers.len()
            );
        }

        self.peers
            .iter_mut()
            .zip(responses)
            .enumerate()
            .map(|(index, (stats, response))| {
                self.log.record(index, attempt_index, response);
                stats.record(response);
                ProcessedResult::from_response(response, stats)
            })
            .collect()
    }

    pub fn peers(&self) -> &[PeerStatistics] {
        &self.peers
    }

    pub fn peer(&self, index: usize) -> Option<&PeerStatistics> {
        self.peers.get(index)
    }

    pub fn log(&self) -> &AttemptLog {
        &self.log
    }

    pub fn into_log(self) -> AttemptLog {
        self.log
    }
}
