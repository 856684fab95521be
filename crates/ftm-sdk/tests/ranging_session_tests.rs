//! 端到端测距会话测试
//!
//! 使用 MockTransport 回放内核回复，验证会话、统计与尝试记录的组合行为。

use ftm_driver::{DriverError, SessionController};
use ftm_netlink::MockTransport;
use ftm_protocol::fixtures::{self, ResultBuilder};
use ftm_protocol::{MacAddr, MeasurementConfig, PeerRequest, PeerResponse, ProtocolError};
use ftm_tools::{AttemptRecord, StatisticsAggregator, distance_from_rtt};
use proptest::prelude::*;

const FAMILY: u16 = 0x1c;
const COOKIE: u64 = 0x1000;

fn mac(last: u8) -> MacAddr {
    MacAddr::new([0x0a, 0x83, 0xa1, 0x15, 0xbf, last])
}

fn config(peers: &[(u8, Option<i64>)]) -> MeasurementConfig {
    MeasurementConfig::new(
        5,
        peers
            .iter()
            .map(|&(last, offset)| PeerRequest {
                rtt_correction: offset,
                ..PeerRequest::new(mac(last), 2412).with_asap(true)
            })
            .collect(),
    )
}

fn response(rtt: Option<i64>) -> PeerResponse {
    PeerResponse {
        rtt_avg: rtt,
        rtt_variance: rtt.map(|_| 16),
        rssi_avg: Some(-48),
        final_report: true,
        ..Default::default()
    }
}

/// 单 peer 单次尝试的回复
fn script_attempt(transport: &mut MockTransport, seq: u32, peer: u8, rtt: Option<i64>) {
    transport.push(fixtures::ack_with_cookie(seq, COOKIE));
    transport.push(fixtures::result(FAMILY, COOKIE, mac(peer), response(rtt)));
    transport.push(fixtures::complete(FAMILY, COOKIE));
}

/// 运行会话并把每次尝试交给统计汇总
fn run_with_stats(
    transport: &mut MockTransport,
    config: &MeasurementConfig,
    attempts: usize,
) -> (StatisticsAggregator, ftm_driver::RunReport) {
    let mut stats = StatisticsAggregator::new(config, attempts);
    let report = SessionController::new(transport).run(config, attempts, |results, _, index| {
        stats.observe(results.responses(), index);
    });
    (stats, report)
}

#[test]
fn single_peer_three_attempts_with_absent_rtt() {
    let mut transport = MockTransport::new(FAMILY);
    script_attempt(&mut transport, 1, 0x50, Some(500));
    script_attempt(&mut transport, 2, 0x50, Some(520));
    script_attempt(&mut transport, 3, 0x50, None);

    let config = config(&[(0x50, None)]);
    let (stats, report) = run_with_stats(&mut transport, &config, 3);

    assert!(report.is_success());
    assert_eq!(report.completed, 3);
    let peer = stats.peer(0).unwrap();
    assert_eq!(peer.count, 2);
    assert_eq!(peer.rtt_sum, 1020);
    assert_eq!(peer.running_average(), Some(510));

    let records = stats.log().records(0).unwrap();
    assert_eq!(records[0].rtt_avg, 500);
    assert_eq!(records[1].rtt_avg, 520);
    // 缺失字段记为 0
    assert_eq!(records[2].rtt_avg, 0);
    assert_eq!(records[2].rssi_avg, -48);
}

#[test]
fn correction_offset_applied_at_read_time() {
    let mut transport = MockTransport::new(FAMILY);
    script_attempt(&mut transport, 1, 0x50, Some(500));
    script_attempt(&mut transport, 2, 0x50, Some(520));
    script_attempt(&mut transport, 3, 0x50, None);

    let config = config(&[(0x50, Some(50))]);
    let mut last = None;
    let mut stats = StatisticsAggregator::new(&config, 3);
    let report = SessionController::new(&mut transport).run(&config, 3, |results, _, index| {
        last = stats.observe(results.responses(), index).pop();
    });
    report.into_result().unwrap();

    let processed = last.unwrap();
    assert_eq!(processed.rtt_running_avg, Some(510));
    assert_eq!(processed.corrected_rtt_running_avg, Some(560));
    assert_eq!(
        processed.corrected_distance_running_avg,
        Some(distance_from_rtt(560))
    );
    // 累计值不受校正影响
    let peer = stats.peer(0).unwrap();
    assert_eq!(peer.rtt_sum, 1020);
    assert_eq!(peer.count, 2);
}

#[test]
fn decode_failure_keeps_earlier_records() {
    let mut transport = MockTransport::new(FAMILY);
    script_attempt(&mut transport, 1, 0x50, Some(500));
    script_attempt(&mut transport, 2, 0x50, Some(520));
    transport.push(fixtures::ack_with_cookie(3, COOKIE));
    transport.push(
        ResultBuilder::new(FAMILY, COOKIE)
            .peer(mac(0x50), response(Some(540)))
            .without_cookie()
            .build(),
    );

    let config = config(&[(0x50, None)]);
    let (stats, report) = run_with_stats(&mut transport, &config, 4);

    assert_eq!(report.completed, 2);
    match report.error {
        Some(DriverError::AttemptFailure { attempt: 2, source }) => assert!(matches!(
            *source,
            DriverError::Protocol(ProtocolError::MissingAttribute("NL80211_ATTR_COOKIE"))
        )),
        other => panic!("unexpected outcome: {:?}", other),
    }

    let records = stats.log().records(0).unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].rtt_avg, 500);
    assert_eq!(records[1].rtt_avg, 520);
    assert_eq!(records[2], AttemptRecord::default());
    assert_eq!(records[3], AttemptRecord::default());
    assert_eq!(stats.peer(0).unwrap().count, 2);
}

#[test]
fn running_average_skips_absent_attempt() {
    let mut transport = MockTransport::new(FAMILY);
    script_attempt(&mut transport, 1, 0x50, Some(1000));
    script_attempt(&mut transport, 2, 0x50, None);
    script_attempt(&mut transport, 3, 0x50, Some(2000));

    let config = config(&[(0x50, None)]);
    let (stats, report) = run_with_stats(&mut transport, &config, 3);
    assert!(report.is_success());
    assert_eq!(stats.peer(0).unwrap().running_average(), Some(1500));
}

#[test]
fn two_peers_in_one_result_message() {
    let mut transport = MockTransport::new(FAMILY);
    transport.push(fixtures::ack_with_cookie(1, COOKIE));
    transport.push(
        ResultBuilder::new(FAMILY, COOKIE)
            .peer(mac(0x50), response(Some(700)))
            .peer(mac(0x51), response(Some(900)))
            .build(),
    );
    transport.push(fixtures::complete(FAMILY, COOKIE));

    let config = config(&[(0x50, None), (0x51, Some(-100))]);
    let (stats, report) = run_with_stats(&mut transport, &config, 1);
    assert!(report.is_success());
    assert_eq!(stats.peer(0).unwrap().running_average(), Some(700));
    assert_eq!(stats.peer(1).unwrap().corrected_running_average(-100), Some(800));
}

proptest! {
    /// 结果中缺失的字段不影响统计，只要 rtt_avg 序列相同
    #[test]
    fn absent_fields_do_not_change_statistics(
        rtts in prop::collection::vec(prop::option::of(1i64..100_000), 1..6),
        strip in any::<bool>(),
    ) {
        let attempts = rtts.len();
        let mut transport = MockTransport::new(FAMILY);
        for (index, rtt) in rtts.iter().enumerate() {
            let fields = if strip {
                PeerResponse { rtt_avg: *rtt, final_report: true, ..Default::default() }
            } else {
                response(*rtt)
            };
            transport.push(fixtures::ack_with_cookie(index as u32 + 1, COOKIE));
            transport.push(fixtures::result(FAMILY, COOKIE, mac(0x50), fields));
            transport.push(fixtures::complete(FAMILY, COOKIE));
        }

        let config = config(&[(0x50, None)]);
        let (stats, report) = run_with_stats(&mut transport, &config, attempts);
        prop_assert!(report.is_success());

        let present: Vec<i64> = rtts.iter().flatten().copied().collect();
        let peer = stats.peer(0).unwrap();
        prop_assert_eq!(peer.count as usize, present.len());
        prop_assert_eq!(peer.rtt_sum, present.iter().sum::<i64>());
    }
}
