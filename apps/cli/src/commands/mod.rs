//! 命令定义和实现

pub mod check;
pub mod start;

pub use check::CheckCommand;
pub use start::StartCommand;
