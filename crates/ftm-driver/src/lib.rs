//! # FTM Driver
//!
//! 测量会话层：在通道层之上执行多次 FTM 测距尝试，并把内核推送的结果
//! 按请求顺序核对、收集。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use ftm_driver::SessionController;
//! use ftm_netlink::ChannelSession;
//!
//! let session = ChannelSession::open()?;
//! let mut controller = SessionController::new(session);
//! let report = controller.run(&config, 10, |results, total, index| {
//!     println!("attempt {}/{}: {} peers", index + 1, total, results.len());
//! });
//! report.into_result()?;
//! ```

pub mod error;
pub mod results;
pub mod session;

pub use error::DriverError;
pub use results::{ResultCollector, ResultsWrap};
pub use session::{AttemptState, RunReport, SessionController};
