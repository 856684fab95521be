//! Mock 传输层
//!
//! 按顺序回放预先排好的 datagram，并记录所有发出的报文。
//! 队列耗尽时 `recv` 返回 [`NetlinkError::Closed`]，测试不会阻塞。

use crate::{NetlinkError, NetlinkTransport};
use bytes::Bytes;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct MockTransport {
    family_id: u16,
    seq: u32,
    inbound: VecDeque<Bytes>,
    sent: Vec<Bytes>,
    fail_sends: bool,
}

impl MockTransport {
    /// 序列号从 1 开始分配
    pub fn new(family_id: u16) -> Self {
        Self {
            family_id,
            ..Default::default()
        }
    }

    /// 追加一个待接收的 datagram
    pub fn push(&mut self, datagram: Bytes) {
        self.inbound.push_back(datagram);
    }

    pub fn extend<I: IntoIterator<Item = Bytes>>(&mut self, datagrams: I) {
        self.inbound.extend(datagrams);
    }

    /// 之后的所有 `send` 都失败
    pub fn fail_sends(&mut self) {
        self.fail_sends = true;
    }

    /// 已发送的报文
    pub fn sent(&self) -> &[Bytes] {
        &self.sent
    }

    /// 尚未被接收的 datagram 数量
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }
}

impl NetlinkTransport for MockTransport {
    fn family_id(&self) -> u16 {
        self.family_id
    }

    fn next_sequence(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    fn send(&mut self, message: &[u8]) -> Result<(), NetlinkError> {
        if self.fail_sends {
            return Err(NetlinkError::SendFailure(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        self.sent.push(Bytes::copy_from_slice(message));
        Ok(())
    }

    fn recv(&mut self) -> Result<Bytes, NetlinkError> {
        self.inbound.pop_front().ok_or(NetlinkError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_order_and_exhaustion() {
        let mut mock = MockTransport::new(0x1c);
        mock.extend([Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        assert_eq!(mock.recv().unwrap(), Bytes::from_static(b"a"));
        assert_eq!(mock.recv().unwrap(), Bytes::from_static(b"b"));
        assert!(matches!(mock.recv(), Err(NetlinkError::Closed)));
    }

    #[test]
    fn test_records_sends_and_sequences() {
        let mut mock = MockTransport::new(0x1c);
        assert_eq!(mock.next_sequence(), 1);
        assert_eq!(mock.next_sequence(), 2);
        mock.send(&[1, 2, 3]).unwrap();
        assert_eq!(mock.sent().len(), 1);

        mock.fail_sends();
        assert!(matches!(mock.send(&[4]), Err(NetlinkError::SendFailure(_))));
        assert_eq!(mock.sent().len(), 1);
    }
}
