//! 测距命令
//!
//! 解析网卡与配置，执行多次测量，逐次刷新终端输出，结束后写入日志文件。

use crate::display::{self, AttemptScreen};
use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Args;
use ftm_tools::{StatisticsAggregator, load_config};
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

/// 测距命令参数
#[derive(Args, Debug)]
pub struct StartCommand {
    /// 无线网卡名称（如 wlan0）
    pub if_name: String,

    /// 配置文件路径
    pub config: PathBuf,

    /// 测量次数
    #[arg(default_value_t = 1)]
    pub attempts: usize,

    /// 日志文件目录
    #[arg(long, default_value = ".")]
    pub log_dir: PathBuf,

    /// 不写入日志文件
    #[arg(long)]
    pub no_log: bool,
}

impl StartCommand {
    pub fn execute(&self) -> Result<()> {
        if self.attempts == 0 {
            bail!("attempts must be at least 1");
        }
        self.run()
    }

    #[cfg(target_os = "linux")]
    fn run(&self) -> Result<()> {
        use ftm_sdk::{ChannelSession, SessionController, resolve_ifindex};

        let ifindex = resolve_ifindex(&self.if_name)
            .with_context(|| format!("Failed to resolve interface '{}'", self.if_name))?;
        let config = load_config(&self.config, ifindex)?;
        for line in display::render_config(&config) {
            println!("{}", line);
        }

        let session = ChannelSession::open().context("Failed to open nl80211 session")?;
        let mut controller = SessionController::new(session);
        let mut stats = StatisticsAggregator::new(&config, self.attempts);
        let mut screen = AttemptScreen::default();
        let mut display_error: Option<io::Error> = None;

        let report = {
            let mut stdout = io::stdout().lock();
            controller.run(&config, self.attempts, |results, total, index| {
                let processed = stats.observe(results.responses(), index);
                let lines = display::render_attempt(results.responses(), &processed);
                if let Err(err) = screen.show(&mut stdout, &lines)
                    && display_error.is_none()
                {
                    display_error = Some(err);
                }
                info!("Attempt {}/{} completed", index + 1, total);
            })
        };

        if let Some(err) = display_error {
            warn!("Failed to write results to terminal: {}", err);
        }

        // 失败时已完成的尝试同样写入日志
        if !self.no_log {
            let paths = stats
                .log()
                .write_logs(&self.log_dir, Local::now())
                .context("Failed to write attempt logs")?;
            for path in paths {
                println!("Log written to {}", path.display());
            }
        }

        let completed = report.into_result().context("FTM measurement failed")?;
        info!("{} attempt(s) completed", completed);
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn run(&self) -> Result<()> {
        bail!("FTM ranging requires Linux nl80211 support")
    }
}
