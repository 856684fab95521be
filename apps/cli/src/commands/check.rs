//! 配置检查命令

use crate::display;
use anyhow::Result;
use clap::Args;
use ftm_tools::load_config;
use std::path::PathBuf;

/// 配置检查参数
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// 配置文件路径
    pub config: PathBuf,
}

impl CheckCommand {
    pub fn execute(&self) -> Result<()> {
        // 设备索引在检查时无意义
        let config = load_config(&self.config, 0)?;
        for line in display::render_config(&config) {
            println!("{}", line);
        }
        Ok(())
    }
}
