//! 终端输出
//!
//! 每次尝试输出一个结果块（原始字段 + 派生数据）。新块输出前，
//! 上一块按行擦除，终端上始终只保留最近一次尝试的结果。

use ftm_sdk::protocol::{FTM_RESPONSE_FIELDS, MeasurementConfig, PeerResponse};
use ftm_tools::ProcessedResult;
use std::fmt;
use std::io::{self, Write};

/// 光标上移一行并清除该行
const ERASE_LINE: &str = "\x1b[A\x1b[2K";

/// 字段名列宽
const NAME_WIDTH: usize = 19;

fn field_line(name: &str, value: impl fmt::Display) -> String {
    format!("{:<width$}{}", name, value, width = NAME_WIDTH)
}

fn optional<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// 配置概要
pub fn render_config(config: &MeasurementConfig) -> Vec<String> {
    let mut lines = vec![format!(
        "FTM configuration: {} peer(s), ifindex {}",
        config.peer_count(),
        config.ifindex
    )];
    for (index, peer) in config.peers.iter().enumerate() {
        lines.push(format!("PEER #{}", index));
        lines.push(field_line("mac", peer.mac));
        lines.push(field_line("center_freq", peer.center_freq));
        lines.push(field_line("chan_width", peer.chan_width));
        lines.push(field_line("preamble", peer.preamble));
        lines.push(field_line("asap", peer.asap));
        lines.push(field_line("num_bursts_exp", peer.num_bursts_exp));
        lines.push(field_line("burst_period", peer.burst_period));
        lines.push(field_line("burst_duration", peer.burst_duration));
        lines.push(field_line("ftms_per_burst", peer.ftms_per_burst));
        lines.push(field_line("num_ftmr_retries", peer.num_ftmr_retries));
        lines.push(field_line("rtt_correction", optional(peer.rtt_correction)));
        lines.push(field_line("dist_truth", optional(peer.dist_truth)));
    }
    lines
}

/// 一次尝试的结果块，每个元素为终端上的一行
pub fn render_attempt(responses: &[PeerResponse], processed: &[ProcessedResult]) -> Vec<String> {
    let mut lines = Vec::new();

    for (index, (response, derived)) in responses.iter().zip(processed).enumerate() {
        lines.push(String::new());
        lines.push(format!("MEASUREMENT RESULT FOR TARGET #{}", index));
        lines.push(field_line("addr", response.mac));
        lines.push(field_line("status", optional(response.pmsr_status().map(|s| format!("{:?}", s)))));
        for field in FTM_RESPONSE_FIELDS.iter() {
            lines.push(field_line(field.name, optional((field.get)(response))));
        }

        lines.push(String::new());
        lines.push("----Processed data----".to_string());
        lines.push(field_line("dist", optional(derived.distance.map(|d| format!("{:.3}", d)))));
        if let (Some(rtt), Some(dist)) = (derived.rtt_running_avg, derived.distance_running_avg) {
            lines.push(field_line("rtt_avg", rtt));
            lines.push(field_line("dist_avg", format!("{:.3}", dist)));
        }
        if let Some(dist) = derived.corrected_distance {
            lines.push(field_line("corrected_dist", format!("{:.3}", dist)));
        }
        if let (Some(rtt), Some(dist)) = (
            derived.corrected_rtt_running_avg,
            derived.corrected_distance_running_avg,
        ) {
            lines.push(field_line("corrected_rtt_avg", rtt));
            lines.push(field_line("corrected_dist_avg", format!("{:.3}", dist)));
        }
        if let Some(value) = derived.rtt_correction_value {
            lines.push(field_line("rtt_corrected_val", value));
        }
        if let Some(deviation) = derived.deviation {
            lines.push(field_line("deviation", format!("{:.3}", deviation)));
        }
    }

    lines
}

/// 逐次刷新的结果区域
#[derive(Debug, Default)]
pub struct AttemptScreen {
    printed: usize,
}

impl AttemptScreen {
    /// 擦除上一块并输出新块
    pub fn show<W: Write>(&mut self, out: &mut W, lines: &[String]) -> io::Result<()> {
        for _ in 0..self.printed {
            out.write_all(ERASE_LINE.as_bytes())?;
        }
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        self.printed = lines.len();
        Ok(())
    }
}
