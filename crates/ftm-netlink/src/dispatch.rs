//! 回复分发器
//!
//! 每个 datagram 中的报文按类别分发到 [`ReplyHandler`] 的四个槽位：
//!
//! | 报文 | 类别 | 默认处理 |
//! |---|---|---|
//! | `NLMSG_ERROR`，错误码 0 | Ack | `Stop`（立即结束） |
//! | `NLMSG_ERROR`，错误码非 0 | Error | `Abort(code)` |
//! | `NLMSG_DONE` | Finish | `Finish`（本 datagram 剩余报文继续处理） |
//! | `NLMSG_NOOP` | - | 跳过 |
//! | `NLMSG_OVERRUN` | - | 返回 [`NetlinkError::Overrun`] |
//! | 其他 | Valid | `Continue` |
//!
//! 循环状态由 [`LoopStatus`] 显式表示，`Pending` 时继续接收。

use crate::{NetlinkError, NetlinkTransport};
use bytes::Bytes;
use ftm_protocol::ids::{NLMSG_DONE, NLMSG_ERROR, NLMSG_NOOP, NLMSG_OVERRUN};
use ftm_protocol::{ErrorMessage, GenlMessage, MessageIter, NlMsgHdr};
use tracing::{debug, error, trace, warn};

/// 分发循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopStatus {
    /// 仍在等待回复
    #[default]
    Pending,
    /// 正常结束
    Done,
    /// 内核返回错误（负的 errno）
    Failed(i32),
}

impl LoopStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// 转换为调用结果：`Failed(-1)` 为权限不足，其他负值为内核错误
    pub fn into_result(self) -> Result<(), NetlinkError> {
        match self {
            Self::Pending | Self::Done => Ok(()),
            Self::Failed(-1) => Err(NetlinkError::PermissionDenied),
            Self::Failed(code) => Err(NetlinkError::Kernel { code }),
        }
    }
}

/// 处理器对单条报文的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// 继续处理，状态不变
    Continue,
    /// 报文与本循环无关，已忽略
    Ignored,
    /// 状态置为 `Done`，本 datagram 中剩余报文仍继续处理
    Finish,
    /// 状态置为 `Done`，立即结束
    Stop,
    /// 状态置为 `Failed(code)`，立即结束
    Abort(i32),
}

/// 回复处理器
///
/// 所有方法都有默认实现，实现者只需覆盖关心的槽位。
pub trait ReplyHandler {
    /// genl 报文
    fn on_valid(&mut self, _msg: GenlMessage) -> Control {
        Control::Continue
    }

    /// 错误码为 0 的 `NLMSG_ERROR`
    fn on_ack(&mut self, _ack: &ErrorMessage) -> Control {
        Control::Stop
    }

    /// `NLMSG_DONE`
    fn on_finish(&mut self, _header: &NlMsgHdr) -> Control {
        Control::Finish
    }

    /// 内核错误，`code` 已规范化为负值，诊断信息已记录
    fn on_error(&mut self, code: i32, _err: &ErrorMessage) -> Control {
        Control::Abort(code)
    }
}

/// 不做任何处理的处理器（只等待 ACK）
#[derive(Debug, Default, Clone, Copy)]
pub struct AckOnly;

impl ReplyHandler for AckOnly {}

/// 回复分发器
#[derive(Debug, Clone)]
pub struct Dispatcher {
    expected_seq: Option<u32>,
    status: LoopStatus,
}

impl Dispatcher {
    /// 对 Ack / Error / Finish 做序列号校验，序列号不符的报文被跳过
    pub fn with_sequence(seq: u32) -> Self {
        Self {
            expected_seq: Some(seq),
            status: LoopStatus::Pending,
        }
    }

    /// 不校验序列号（内核主动推送的测量结果序列号为 0）
    pub fn unchecked() -> Self {
        Self {
            expected_seq: None,
            status: LoopStatus::Pending,
        }
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    fn sequence_matches(&self, header: &NlMsgHdr) -> bool {
        match self.expected_seq {
            Some(seq) if seq != header.seq => {
                trace!(
                    "Skipping reply with sequence {} (expected {})",
                    header.seq, seq
                );
                false
            },
            _ => true,
        }
    }

    /// 循环接收并分发，直到状态不再是 `Pending`
    pub fn run<T, H>(&mut self, transport: &mut T, handler: &mut H) -> Result<(), NetlinkError>
    where
        T: NetlinkTransport + ?Sized,
        H: ReplyHandler + ?Sized,
    {
        while self.status.is_pending() {
            let datagram = transport.recv()?;
            self.dispatch(datagram, handler)?;
        }
        self.status.into_result()
    }

    /// 分发一个 datagram 中的所有报文
    pub fn dispatch<H>(&mut self, datagram: Bytes, handler: &mut H) -> Result<(), NetlinkError>
    where
        H: ReplyHandler + ?Sized,
    {
        for message in MessageIter::new(datagram) {
            let message = message?;
            let header = message.header;

            let control = match header.msg_type {
                NLMSG_NOOP => {
                    trace!("NOOP seq={}", header.seq);
                    continue;
                },
                NLMSG_OVERRUN => {
                    warn!("Netlink overrun (seq={})", header.seq);
                    return Err(NetlinkError::Overrun);
                },
                NLMSG_DONE => {
                    if !self.sequence_matches(&header) {
                        continue;
                    }
                    trace!("FINISH seq={}", header.seq);
                    handler.on_finish(&header)
                },
                NLMSG_ERROR => {
                    // 先校验序列号，其他请求的错误报文即使格式异常也只跳过
                    if !self.sequence_matches(&header) {
                        continue;
                    }
                    let err = message.as_error()?;
                    if err.is_ack() {
                        trace!("ACK seq={}", header.seq);
                        handler.on_ack(&err)
                    } else {
                        let code = normalize_error_code(err.code);
                        if let Some(diagnostic) = err.diagnostic() {
                            error!("kernel reports: {}", diagnostic);
                        }
                        debug!("ERROR seq={} code={}", header.seq, code);
                        handler.on_error(code, &err)
                    }
                },
                _ => {
                    let msg = message.as_generic()?;
                    trace!(
                        "VALID type=0x{:x} cmd={} seq={}",
                        header.msg_type, msg.cmd, header.seq
                    );
                    handler.on_valid(msg)
                },
            };

            if self.apply(control, header.msg_type) {
                return Ok(());
            }
        }
        Ok(())
    }

    /// 直接交付一条已解析的 genl 报文（例如在 ACK 阶段缓存下来的结果）
    pub fn deliver<H>(&mut self, msg: GenlMessage, handler: &mut H)
    where
        H: ReplyHandler + ?Sized,
    {
        let msg_type = msg.header.msg_type;
        let control = handler.on_valid(msg);
        self.apply(control, msg_type);
    }

    /// 更新循环状态，返回是否立即结束当前 datagram
    fn apply(&mut self, control: Control, msg_type: u16) -> bool {
        match control {
            Control::Continue => false,
            Control::Ignored => {
                trace!("Ignored message type=0x{:x}", msg_type);
                false
            },
            Control::Finish => {
                self.status = LoopStatus::Done;
                false
            },
            Control::Stop => {
                self.status = LoopStatus::Done;
                true
            },
            Control::Abort(code) => {
                self.status = LoopStatus::Failed(code);
                true
            },
        }
    }
}

/// 正的错误码违反 netlink(7)，但仍需容忍：取反后使用
fn normalize_error_code(code: i32) -> i32 {
    if code > 0 {
        warn!("Received positive netlink error code {}", code);
        code.saturating_neg()
    } else {
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use ftm_protocol::fixtures;

    const FAMILY: u16 = 0x1c;

    /// 记录每个槽位被调用的次数
    #[derive(Default)]
    struct Recorder {
        valid: Vec<u8>,
        acks: usize,
        finishes: usize,
        errors: Vec<i32>,
    }

    impl ReplyHandler for Recorder {
        fn on_valid(&mut self, msg: GenlMessage) -> Control {
            self.valid.push(msg.cmd);
            Control::Continue
        }

        fn on_ack(&mut self, _ack: &ErrorMessage) -> Control {
            self.acks += 1;
            Control::Stop
        }

        fn on_finish(&mut self, _header: &NlMsgHdr) -> Control {
            self.finishes += 1;
            Control::Finish
        }

        fn on_error(&mut self, code: i32, _err: &ErrorMessage) -> Control {
            self.errors.push(code);
            Control::Abort(code)
        }
    }

    #[test]
    fn test_ack_stops_immediately() {
        let datagram = fixtures::datagram(&[fixtures::ack(3), fixtures::genl(FAMILY, 0, 132)]);
        let mut dispatcher = Dispatcher::with_sequence(3);
        let mut recorder = Recorder::default();
        dispatcher.dispatch(datagram, &mut recorder).unwrap();

        assert_eq!(dispatcher.status(), LoopStatus::Done);
        assert_eq!(recorder.acks, 1);
        assert!(recorder.valid.is_empty());
    }

    #[test]
    fn test_finish_continues_batch() {
        let datagram = fixtures::datagram(&[fixtures::done(0), fixtures::genl(FAMILY, 0, 132)]);
        let mut dispatcher = Dispatcher::unchecked();
        let mut recorder = Recorder::default();
        dispatcher.dispatch(datagram, &mut recorder).unwrap();

        assert_eq!(dispatcher.status(), LoopStatus::Done);
        assert_eq!(recorder.finishes, 1);
        assert_eq!(recorder.valid, vec![132]);
    }

    #[test]
    fn test_error_with_diagnostic() {
        let datagram = fixtures::error(5, -22, Some("invalid peer address"));
        let mut dispatcher = Dispatcher::with_sequence(5);
        let mut recorder = Recorder::default();
        dispatcher.dispatch(datagram, &mut recorder).unwrap();

        assert_eq!(dispatcher.status(), LoopStatus::Failed(-22));
        assert_eq!(recorder.errors, vec![-22]);
        assert!(matches!(
            dispatcher.status().into_result(),
            Err(NetlinkError::Kernel { code: -22 })
        ));
    }

    #[test]
    fn test_positive_error_code_is_negated() {
        let datagram = fixtures::error(5, 95, None);
        let mut dispatcher = Dispatcher::with_sequence(5);
        dispatcher.dispatch(datagram, &mut AckOnly).unwrap();
        assert_eq!(dispatcher.status(), LoopStatus::Failed(-95));
    }

    #[test]
    fn test_eperm_maps_to_permission_denied() {
        let mut transport = MockTransport::new(FAMILY);
        transport.push(fixtures::error(1, -1, None));
        let result = Dispatcher::with_sequence(1).run(&mut transport, &mut AckOnly);
        assert!(matches!(result, Err(NetlinkError::PermissionDenied)));
    }

    #[test]
    fn test_sequence_mismatch_is_skipped() {
        let mut transport = MockTransport::new(FAMILY);
        transport.push(fixtures::datagram(&[fixtures::ack(7), fixtures::error(7, -16, None)]));
        transport.push(fixtures::ack(8));

        let mut recorder = Recorder::default();
        Dispatcher::with_sequence(8)
            .run(&mut transport, &mut recorder)
            .unwrap();
        assert_eq!(recorder.acks, 1);
        assert!(recorder.errors.is_empty());
        assert_eq!(transport.pending(), 0);
    }

    /// 只有 4 字节错误码、缺少原始报文头的 `NLMSG_ERROR`
    fn short_error(seq: u32) -> Bytes {
        use bytes::BufMut;
        let mut buf = bytes::BytesMut::new();
        NlMsgHdr {
            len: 20,
            msg_type: NLMSG_ERROR,
            seq,
            ..Default::default()
        }
        .write(&mut buf);
        buf.put_i32_ne(-22);
        buf.freeze()
    }

    #[test]
    fn test_malformed_error_for_other_sequence_is_skipped() {
        let datagram = fixtures::datagram(&[short_error(7), fixtures::ack(8)]);
        let mut dispatcher = Dispatcher::with_sequence(8);
        let mut recorder = Recorder::default();
        dispatcher.dispatch(datagram, &mut recorder).unwrap();

        assert_eq!(dispatcher.status(), LoopStatus::Done);
        assert_eq!(recorder.acks, 1);
        assert!(recorder.errors.is_empty());
    }

    #[test]
    fn test_malformed_error_for_own_sequence_fails() {
        let mut dispatcher = Dispatcher::with_sequence(8);
        assert!(matches!(
            dispatcher.dispatch(short_error(8), &mut AckOnly),
            Err(NetlinkError::Protocol(_))
        ));
    }

    #[test]
    fn test_unchecked_accepts_any_sequence() {
        let mut dispatcher = Dispatcher::unchecked();
        dispatcher.dispatch(fixtures::ack(1234), &mut AckOnly).unwrap();
        assert_eq!(dispatcher.status(), LoopStatus::Done);
    }

    #[test]
    fn test_noop_skipped_and_overrun_is_error() {
        let mut dispatcher = Dispatcher::unchecked();
        dispatcher.dispatch(fixtures::noop(0), &mut AckOnly).unwrap();
        assert_eq!(dispatcher.status(), LoopStatus::Pending);

        let mut header = bytes::BytesMut::new();
        NlMsgHdr {
            len: 16,
            msg_type: NLMSG_OVERRUN,
            ..Default::default()
        }
        .write(&mut header);
        assert!(matches!(
            dispatcher.dispatch(header.freeze(), &mut AckOnly),
            Err(NetlinkError::Overrun)
        ));
    }

    #[test]
    fn test_run_receives_until_done() {
        let mut transport = MockTransport::new(FAMILY);
        transport.push(fixtures::genl(FAMILY, 0, 132));
        transport.push(fixtures::genl(FAMILY, 0, 132));
        transport.push(fixtures::ack(2));

        let mut recorder = Recorder::default();
        Dispatcher::with_sequence(2)
            .run(&mut transport, &mut recorder)
            .unwrap();
        assert_eq!(recorder.valid, vec![132, 132]);
    }

    #[test]
    fn test_deliver_updates_status() {
        struct CompleteOn133;
        impl ReplyHandler for CompleteOn133 {
            fn on_valid(&mut self, msg: GenlMessage) -> Control {
                if msg.cmd == 133 { Control::Stop } else { Control::Ignored }
            }
        }

        let msg = ftm_protocol::MessageIter::new(fixtures::complete(FAMILY, 1))
            .next()
            .unwrap()
            .unwrap()
            .as_generic()
            .unwrap();
        let mut dispatcher = Dispatcher::unchecked();
        dispatcher.deliver(msg, &mut CompleteOn133);
        assert_eq!(dispatcher.status(), LoopStatus::Done);

        // 已结束的循环不再接收
        let mut transport = MockTransport::new(FAMILY);
        dispatcher.run(&mut transport, &mut CompleteOn133).unwrap();
    }

    #[test]
    fn test_run_propagates_transport_error() {
        let mut transport = MockTransport::new(FAMILY);
        let result = Dispatcher::unchecked().run(&mut transport, &mut AckOnly);
        assert!(matches!(result, Err(NetlinkError::Closed)));
    }
}
