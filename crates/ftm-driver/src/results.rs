//! 单次尝试的结果收集
//!
//! 内核按 peer 枚举顺序推送结果，收集器逐条核对：
//!
//! - 第 i 份报告的 MAC 必须与请求中第 i 个 peer 一致
//! - 同一 peer 的非最终报告会被其后续报告覆盖，不占用新的槽位
//! - 报告多于 peer 数、MAC 不符、`COMPLETE` 时仍有空槽位，均为 [`DriverError::Correlation`]
//!
//! 覆盖只比较 MAC，因此请求中不能出现重复的 peer（配置加载时已拒绝）。

use crate::DriverError;
use ftm_protocol::{MeasurementConfig, PeerResponse, ResultReport};
use tracing::{trace, warn};

/// 一次测量尝试的全部结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultsWrap {
    responses: Vec<PeerResponse>,
    expected: usize,
    cookie: Option<u64>,
    complete: bool,
}

impl ResultsWrap {
    pub fn new(expected: usize) -> Self {
        Self {
            responses: Vec::with_capacity(expected),
            expected,
            cookie: None,
            complete: false,
        }
    }

    /// 已填充的结果（按请求顺序）
    pub fn responses(&self) -> &[PeerResponse] {
        &self.responses
    }

    pub fn get(&self, index: usize) -> Option<&PeerResponse> {
        self.responses.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerResponse> {
        self.responses.iter()
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// 请求中的 peer 数
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// 本次测量的 cookie
    pub fn cookie(&self) -> Option<u64> {
        self.cookie
    }

    /// 是否已收到 `PEER_MEASUREMENT_COMPLETE`
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// 按请求顺序核对并收集结果
#[derive(Debug)]
pub struct ResultCollector<'a> {
    config: &'a MeasurementConfig,
    results: ResultsWrap,
}

impl<'a> ResultCollector<'a> {
    pub fn new(config: &'a MeasurementConfig) -> Self {
        Self {
            config,
            results: ResultsWrap::new(config.peer_count()),
        }
    }

    /// 设置期望的 cookie（来自 START 请求的扩展 ACK）
    pub fn expect_cookie(&mut self, cookie: u64) {
        self.results.cookie = Some(cookie);
    }

    pub fn cookie(&self) -> Option<u64> {
        self.results.cookie
    }

    /// 接收一条结果报文
    pub fn accept(&mut self, report: ResultReport) -> Result<(), DriverError> {
        match self.results.cookie {
            Some(expected) if expected != report.cookie => {
                return Err(DriverError::Correlation(format!(
                    "result cookie {:#x} does not match request cookie {:#x}",
                    report.cookie, expected
                )));
            },
            Some(_) => {},
            None => self.results.cookie = Some(report.cookie),
        }

        for response in report.peers {
            self.accept_peer(response)?;
        }
        Ok(())
    }

    fn accept_peer(&mut self, mut response: PeerResponse) -> Result<(), DriverError> {
        // 同一 peer 的后续报告覆盖未完成的上一份
        if let Some(last) = self.results.responses.last_mut()
            && last.mac == response.mac
            && !last.final_report
        {
            trace!("Replacing interim report for {}", response.mac);
            response.rtt_correction = last.rtt_correction;
            response.dist_truth = last.dist_truth;
            *last = response;
            return Ok(());
        }

        let index = self.results.responses.len();
        let Some(request) = self.config.peers.get(index) else {
            return Err(DriverError::Correlation(format!(
                "unexpected report for {}: all {} peer slots are filled",
                response.mac, self.results.expected
            )));
        };
        if request.mac != response.mac {
            return Err(DriverError::Correlation(format!(
                "peer slot {} expected {}, got report for {}",
                index, request.mac, response.mac
            )));
        }

        response.rtt_correction = request.rtt_correction;
        response.dist_truth = request.dist_truth;
        trace!("Peer slot {} filled by {}", index, response.mac);
        self.results.responses.push(response);
        Ok(())
    }

    /// 收到 `COMPLETE`：所有槽位必须已填充
    pub fn complete(&mut self) -> Result<(), DriverError> {
        let filled = self.results.responses.len();
        if filled < self.results.expected {
            warn!(
                "Measurement completed with {} of {} peers reported",
                filled, self.results.expected
            );
            return Err(DriverError::Correlation(format!(
                "measurement completed with {} of {} peers reported",
                filled, self.results.expected
            )));
        }
        self.results.complete = true;
        Ok(())
    }

    pub fn results(&self) -> &ResultsWrap {
        &self.results
    }

    pub fn into_results(self) -> ResultsWrap {
        self.results
    }
}
