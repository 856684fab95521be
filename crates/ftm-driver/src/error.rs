//! 驱动层错误类型定义

use ftm_netlink::NetlinkError;
use ftm_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 通道层错误（socket、内核错误码）
    #[error("Netlink error: {0}")]
    Netlink(#[from] NetlinkError),

    /// 编解码错误（请求构建失败、结果缺少必需属性）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 测量结果与请求无法对应（MAC 不符、报告多于 peer 数等）
    #[error("Result correlation failed: {0}")]
    Correlation(String),

    /// 无效输入（如尝试次数为 0）
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 第 `attempt` 次尝试失败，剩余尝试全部取消
    #[error("Attempt {attempt} failed: {source}")]
    AttemptFailure {
        attempt: usize,
        #[source]
        source: Box<DriverError>,
    },
}

impl DriverError {
    /// 去掉 `AttemptFailure` 包装，返回根本原因
    pub fn root(&self) -> &DriverError {
        match self {
            Self::AttemptFailure { source, .. } => source.root(),
            other => other,
        }
    }

    /// 是否为权限不足（通常需要 CAP_NET_ADMIN）
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self.root(),
            Self::Netlink(NetlinkError::PermissionDenied)
        )
    }
}
