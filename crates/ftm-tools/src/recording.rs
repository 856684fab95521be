//! # 尝试记录
//!
//! 每个 peer 每次尝试保存一条 [`AttemptRecord`]，会话结束后写入日志文件。
//!
//! 日志文件格式（每个 peer 一个文件，每行一次尝试）：
//!
//! ```text
//! 文件名：<YYYY-MM-DD-HH:MM:SS>-<mac>-log.txt
//! 内容：  <rtt_avg> <rtt_variance> <rtt_spread> <rssi_avg>
//! ```
//!
//! 缺失字段记为 0；失败后未执行的尝试保持全 0 记录。

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use ftm_protocol::{MacAddr, PeerResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 单次尝试的快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub rtt_avg: i64,
    pub rtt_variance: u64,
    pub rtt_spread: u64,
    pub rssi_avg: i32,
}

impl AttemptRecord {
    pub fn from_response(response: &PeerResponse) -> Self {
        Self {
            rtt_avg: response.rtt_avg.unwrap_or(0),
            rtt_variance: response.rtt_variance.unwrap_or(0),
            rtt_spread: response.rtt_spread.unwrap_or(0),
            rssi_avg: response.rssi_avg.unwrap_or(0),
        }
    }
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.rtt_avg, self.rtt_variance, self.rtt_spread, self.rssi_avg
        )
    }
}

/// 单个 peer 的全部尝试记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerLog {
    pub mac: MacAddr,
    records: Vec<AttemptRecord>,
}

impl PeerLog {
    pub fn records(&self) -> &[AttemptRecord] {
        &self.records
    }
}

/// 所有 peer 的尝试记录
///
/// 长度在创建时按尝试次数分配，之后不再改变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptLog {
    peers: Vec<PeerLog>,
    attempts: usize,
}

impl AttemptLog {
    pub fn new<I: IntoIterator<Item = MacAddr>>(macs: I, attempts: usize) -> Self {
        Self {
            peers: macs
                .into_iter()
                .map(|mac| PeerLog {
                    mac,
                    records: vec![AttemptRecord::default(); attempts],
                })
                .collect(),
            attempts,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn peers(&self) -> &[PeerLog] {
        &self.peers
    }

    pub fn records(&self, peer: usize) -> Option<&[AttemptRecord]> {
        self.peers.get(peer).map(PeerLog::records)
    }

    /// 写入一条记录，下标越界时返回 `false`
    pub fn record(&mut self, peer: usize, attempt: usize, response: &PeerResponse) -> bool {
        let Some(slot) = self
            .peers
            .get_mut(peer)
            .and_then(|log| log.records.get_mut(attempt))
        else {
            warn!("No record slot for peer {} attempt {}", peer, attempt);
            return false;
        };
        *slot = AttemptRecord::from_response(response);
        true
    }

    /// 把每个 peer 的记录写入 `dir` 下的日志文件，返回写入的文件路径
    pub fn write_logs<P: AsRef<Path>>(&self, dir: P, timestamp: DateTime<Local>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let mut written = Vec::with_capacity(self.peers.len());

        for peer in &self.peers {
            let path = dir.join(log_file_name(timestamp, &peer.mac));
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            for record in &peer.records {
                writeln!(writer, "{}", record)
                    .with_context(|| format!("Failed to write log file {}", path.display()))?;
            }
            writer
                .flush()
                .with_context(|| format!("Failed to flush log file {}", path.display()))?;

            debug!("Wrote {} records to {}", peer.records.len(), path.display());
            written.push(path);
        }

        Ok(written)
    }
}

/// 日志文件名：`<YYYY-MM-DD-HH:MM:SS>-<mac>-log.txt`
pub fn log_file_name(timestamp: DateTime<Local>, mac: &MacAddr) -> String {
    format!("{}-{}-log.txt", timestamp.format("%Y-%m-%d-%H:%M:%S"), mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn mac() -> MacAddr {
        MacAddr::new([0x0a, 0x83, 0xa1, 0x15, 0xbf, 0x50])
    }

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).single().unwrap()
    }

    #[test]
    fn test_record_absent_fields_as_zero() {
        let response = PeerResponse {
            rtt_avg: Some(-12),
            rssi_avg: Some(-60),
            ..Default::default()
        };
        let record = AttemptRecord::from_response(&response);
        assert_eq!(record.rtt_variance, 0);
        assert_eq!(record.to_string(), "-12 0 0 -60");
    }

    #[test]
    fn test_log_is_preallocated() {
        let mut log = AttemptLog::new([mac()], 3);
        assert_eq!(log.records(0).unwrap().len(), 3);
        assert!(log.record(0, 1, &PeerResponse {
            rtt_avg: Some(500),
            ..Default::default()
        }));
        assert!(!log.record(0, 3, &PeerResponse::default()));
        assert!(!log.record(1, 0, &PeerResponse::default()));

        let records = log.records(0).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], AttemptRecord::default());
        assert_eq!(records[1].rtt_avg, 500);
    }

    #[test]
    fn test_log_file_name() {
        assert_eq!(
            log_file_name(timestamp(), &mac()),
            "2024-03-09-14:05:07-0a:83:a1:15:bf:50-log.txt"
        );
    }

    #[test]
    fn test_write_logs() {
        let dir = TempDir::new().unwrap();
        let mut log = AttemptLog::new([mac()], 2);
        log.record(0, 0, &PeerResponse {
            rtt_avg: Some(500),
            rtt_variance: Some(4),
            rtt_spread: Some(9),
            rssi_avg: Some(-55),
            ..Default::default()
        });

        let paths = log.write_logs(dir.path(), timestamp()).unwrap();
        assert_eq!(paths.len(), 1);
        let content = std::fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(content, "500 4 9 -55\n0 0 0 0\n");
    }

    #[test]
    fn test_write_logs_missing_dir() {
        let dir = TempDir::new().unwrap();
        let log = AttemptLog::new([mac()], 1);
        let err = log.write_logs(dir.path().join("missing"), timestamp()).unwrap_err();
        assert!(err.to_string().contains("Failed to create log file"));
    }
}
