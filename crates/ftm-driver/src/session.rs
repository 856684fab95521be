//! 多次测量会话控制
//!
//! 每次尝试依次经过：
//!
//! ```text
//! Idle ──send──> Sent ──ACK──> Collecting ──COMPLETE──> Completed
//!   └──────────────┴──────────────┴────────> Failed
//! ```
//!
//! ACK 阶段对序列号做校验；结果阶段的报文由内核主动推送（序列号为 0），
//! 不做校验。ACK 阶段中提前到达的结果报文会先缓存，再交给结果阶段处理。
//!
//! 任一尝试失败即终止整个会话，已交给回调的数据由调用方保留。

use crate::results::{ResultCollector, ResultsWrap};
use crate::DriverError;
use ftm_netlink::{Control, Dispatcher, NetlinkTransport, ReplyHandler};
use ftm_protocol::ids::{
    NL80211_ATTR_COOKIE, NL80211_CMD_PEER_MEASUREMENT_COMPLETE,
    NL80211_CMD_PEER_MEASUREMENT_RESULT,
};
use ftm_protocol::{ErrorMessage, GenlMessage, MeasurementConfig, decode_result, encode_start_request};
use tracing::{debug, info, trace, warn};

/// 处理器内部失败时使用的错误码（EPROTO）
const EPROTO: i32 = -71;

/// 单次尝试的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptState {
    #[default]
    Idle,
    /// 请求已发送，等待 ACK
    Sent,
    /// 已确认，正在接收结果
    Collecting,
    Completed,
    Failed,
}

/// 会话运行结果
#[derive(Debug)]
pub struct RunReport {
    /// 成功完成（并已交给回调）的尝试数
    pub completed: usize,
    /// 终止会话的错误
    pub error: Option<DriverError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<usize, DriverError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.completed),
        }
    }
}

/// 会话控制器
///
/// 持有传输层，按顺序执行多次测量尝试。同一时间只有一个未完成的请求。
#[derive(Debug)]
pub struct SessionController<T: NetlinkTransport> {
    transport: T,
    state: AttemptState,
}

impl<T: NetlinkTransport> SessionController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: AttemptState::Idle,
        }
    }

    /// 当前（或最近一次）尝试的状态
    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn transition(&mut self, next: AttemptState) {
        debug!("Attempt state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// 执行 `attempts` 次测量
    ///
    /// 每次尝试完成后调用 `on_attempt(results, attempts, index)`。
    /// 第 k 次尝试失败时返回 `completed = k`，错误包装为
    /// [`DriverError::AttemptFailure`]。
    pub fn run<F>(&mut self, config: &MeasurementConfig, attempts: usize, mut on_attempt: F) -> RunReport
    where
        F: FnMut(&ResultsWrap, usize, usize),
    {
        if attempts == 0 {
            return RunReport {
                completed: 0,
                error: Some(DriverError::InvalidInput(
                    "attempts must be at least 1".to_string(),
                )),
            };
        }

        info!(
            "Starting {} measurement attempt(s) with {} peer(s) on ifindex {}",
            attempts,
            config.peer_count(),
            config.ifindex
        );

        for attempt in 0..attempts {
            match self.run_attempt(config) {
                Ok(results) => {
                    on_attempt(&results, attempts, attempt);
                },
                Err(err) => {
                    warn!("Attempt {} failed: {}", attempt, err);
                    self.transition(AttemptState::Failed);
                    return RunReport {
                        completed: attempt,
                        error: Some(DriverError::AttemptFailure {
                            attempt,
                            source: Box::new(err),
                        }),
                    };
                },
            }
        }

        RunReport {
            completed: attempts,
            error: None,
        }
    }

    /// 执行一次测量尝试，返回完整的结果集
    pub fn run_attempt(&mut self, config: &MeasurementConfig) -> Result<ResultsWrap, DriverError> {
        self.transition(AttemptState::Idle);
        let family_id = self.transport.family_id();
        let seq = self.transport.next_sequence();

        let request = encode_start_request(config, family_id, seq)?;
        self.transport.send(&request)?;
        self.transition(AttemptState::Sent);

        let mut ack = AckPhase::new(family_id);
        Dispatcher::with_sequence(seq).run(&mut self.transport, &mut ack)?;
        self.transition(AttemptState::Collecting);

        let mut collector = ResultCollector::new(config);
        if let Some(cookie) = ack.cookie {
            trace!("Measurement cookie {:#x}", cookie);
            collector.expect_cookie(cookie);
        }
        let mut handler = ResultHandler {
            family_id,
            collector,
            error: None,
        };

        let mut dispatcher = Dispatcher::unchecked();
        for msg in ack.queued {
            if !dispatcher.status().is_pending() {
                break;
            }
            dispatcher.deliver(msg, &mut handler);
        }
        let outcome = dispatcher.run(&mut self.transport, &mut handler);

        if let Some(err) = handler.error.take() {
            return Err(err);
        }
        outcome?;

        let results = handler.collector.into_results();
        if !results.is_complete() {
            return Err(DriverError::Correlation(
                "result stream ended before measurement completed".to_string(),
            ));
        }
        self.transition(AttemptState::Completed);
        Ok(results)
    }
}

/// ACK 阶段：记录 cookie，缓存提前到达的结果报文
struct AckPhase {
    family_id: u16,
    cookie: Option<u64>,
    queued: Vec<GenlMessage>,
}

impl AckPhase {
    fn new(family_id: u16) -> Self {
        Self {
            family_id,
            cookie: None,
            queued: Vec::new(),
        }
    }
}

impl ReplyHandler for AckPhase {
    fn on_valid(&mut self, msg: GenlMessage) -> Control {
        if msg.header.msg_type != self.family_id {
            return Control::Ignored;
        }
        trace!("Queueing cmd {} received before ACK", msg.cmd);
        self.queued.push(msg);
        Control::Continue
    }

    fn on_ack(&mut self, ack: &ErrorMessage) -> Control {
        self.cookie = ack.cookie();
        Control::Stop
    }
}

/// 结果阶段
struct ResultHandler<'a> {
    family_id: u16,
    collector: ResultCollector<'a>,
    error: Option<DriverError>,
}

impl ResultHandler<'_> {
    fn fail(&mut self, err: DriverError) -> Control {
        self.error = Some(err);
        Control::Abort(EPROTO)
    }

    fn on_complete(&mut self, msg: &GenlMessage) -> Control {
        let cookie = match msg.table() {
            Ok(table) => match table.get(NL80211_ATTR_COOKIE).map(|a| a.get_u64("cookie")) {
                Some(Ok(cookie)) => Some(cookie),
                Some(Err(err)) => return self.fail(err.into()),
                None => None,
            },
            Err(err) => return self.fail(err.into()),
        };

        // 其他测量请求的 COMPLETE
        if let (Some(expected), Some(cookie)) = (self.collector.cookie(), cookie)
            && expected != cookie
        {
            trace!("Ignoring COMPLETE for cookie {:#x}", cookie);
            return Control::Ignored;
        }

        match self.collector.complete() {
            Ok(()) => Control::Stop,
            Err(err) => self.fail(err),
        }
    }
}

impl ReplyHandler for ResultHandler<'_> {
    fn on_valid(&mut self, msg: GenlMessage) -> Control {
        if msg.header.msg_type != self.family_id {
            return Control::Ignored;
        }
        match msg.cmd {
            NL80211_CMD_PEER_MEASUREMENT_COMPLETE => self.on_complete(&msg),
            NL80211_CMD_PEER_MEASUREMENT_RESULT => {
                let report = match decode_result(&msg) {
                    Ok(report) => report,
                    Err(err) => return self.fail(err.into()),
                };
                match self.collector.accept(report) {
                    Ok(()) => Control::Continue,
                    Err(err) => self.fail(err),
                }
            },
            _ => Control::Ignored,
        }
    }

    // ACK 阶段已结束，迟到的 ACK 与本循环无关
    fn on_ack(&mut self, _ack: &ErrorMessage) -> Control {
        Control::Ignored
    }
}
