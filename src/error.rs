//! Error taxonomy for tool execution
//!
//! Failures are classified structurally, never by runtime type-name
//! matching. The executor converts every tool error into an
//! [`ErrorKind`] + message pair; nothing from a tool callable is allowed
//! to escape past the executor boundary.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Classification of execution failures for reply selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Wall-clock timeout enforced by the executor
    Timeout,
    /// Bad or missing parameters (non-numeric operands etc.)
    Validation,
    /// Domain rule violation, currently only division by zero.
    /// A subtype of Validation for the user, distinguished internally
    /// so the orchestrator can pick the dedicated reply.
    DomainError,
    /// Remote dependency declined the call or is unreachable
    Unavailable,
    /// Anything uncategorized
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Validation => "validation",
            Self::DomainError => "domain_error",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        }
    }
}

/// Error raised by a tool callable or its dispatch path
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("툴 실행 시간 초과 ({0:?})")]
    Timeout(Duration),

    #[error("올바른 숫자를 입력해주세요: {0}")]
    InvalidParameter(String),

    #[error("0으로 나눌 수 없습니다")]
    DivideByZero,

    #[error("MCP 서버를 사용할 수 없습니다")]
    Unavailable,

    #[error("존재하지 않는 로컬 툴: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Other(String),
}

impl ToolError {
    /// Structural classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InvalidParameter(_) => ErrorKind::Validation,
            Self::DivideByZero => ErrorKind::DomainError,
            Self::Unavailable => ErrorKind::Unavailable,
            Self::UnknownTool(_) | Self::Other(_) => ErrorKind::Unknown,
        }
    }
}
