//! Error types shared across the session, toolkit and probes

use crate::config::ConfigError;
use crate::render::ToolkitError;
use thiserror::Error;

/// Errors surfaced by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// A surface operation ran before `initialize` succeeded
    #[error("session is not initialized")]
    NotInitialized,
    /// Malformed shapes, mismatched batch lengths, empty probe lists
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    /// Secondary display resolution differs from the primary one
    #[error("secondary display size {secondary:?} differs from primary size {primary:?}")]
    GeometryMismatch {
        primary: (u32, u32),
        secondary: (u32, u32),
    },
    /// Another session is already initialized in this process
    #[error("a session is already active in this process")]
    AlreadyActive,
    #[error("toolkit error: {0}")]
    Toolkit(#[from] ToolkitError),
    /// The external device tick hook failed
    #[error("tick hook failed: {0}")]
    Hook(String),
}

impl SessionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
