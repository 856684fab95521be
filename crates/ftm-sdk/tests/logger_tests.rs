//! 日志初始化测试（独立进程，全局 subscriber 只安装一次）

#[test]
fn test_init_logger_is_idempotent() {
    ftm_sdk::init_logger("ftm_sdk=debug").unwrap();
    ftm_sdk::init_logger("ftm_sdk=debug").unwrap();
    assert!(tracing::dispatcher::has_been_set());

    // log 记录经 LogTracer 转发，不会因重复初始化而失败
    log::info!("forwarded from log");
    tracing::info!("emitted by tracing");
    assert!(log::max_level() >= log::LevelFilter::Info);
}
