//! # FTM CLI
//!
//! Command-line interface for Wi-Fi FTM ranging.
//!
//! ```bash
//! # 检查配置文件
//! ftm-cli check ftm.toml
//!
//! # 在 wlan0 上执行 10 次测距（需要 CAP_NET_ADMIN）
//! sudo ftm-cli start wlan0 ftm.toml 10
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod display;

use commands::{CheckCommand, StartCommand};

/// FTM CLI - Wi-Fi 精细时间测量命令行工具
#[derive(Parser, Debug)]
#[command(name = "ftm-cli")]
#[command(about = "Command-line interface for Wi-Fi FTM ranging", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 执行测距
    Start {
        #[command(flatten)]
        args: StartCommand,
    },

    /// 解析并打印配置文件
    Check {
        #[command(flatten)]
        args: CheckCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志（`log` 记录一并转发）
    ftm_sdk::init_logger("ftm_cli=info").map_err(|e| anyhow::anyhow!(e))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { args } => args.execute(),
        Commands::Check { args } => args.execute(),
    }
}
