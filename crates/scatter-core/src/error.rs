//! Error taxonomy shared by the gateway and the peer nodes
//!
//! Transport and storage failures live in the daemon crate; the errors here are
//! the ones that can be decided without performing any I/O.

use thiserror::Error;

/// An extension outside the placement allow-list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("unsupported extension {0:?}")]
    UnsupportedExtension(String),
}

/// Input rejected before any I/O is attempted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid file size: {size} bytes (max {max})")]
    InvalidSize { size: u64, max: u32 },

    #[error("path must start with {alias}: {path}")]
    MissingAlias { alias: &'static str, path: String },

    #[error("path traversal attempt blocked: {0}")]
    PathTraversal(String),

    #[error("path is outside {node} storage: {path}")]
    OutsideNode { node: &'static str, path: String },

    #[error("{verb}: {reason}")]
    Usage { verb: &'static str, reason: String },
}

/// A command line that could not be turned into a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("too many tokens: {count} (max {max})")]
    TooManyTokens { count: usize, max: usize },

    #[error("unknown command {0:?}")]
    UnknownVerb(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl CommandError {
    /// Whether the session must end after reporting this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, CommandError::TooManyTokens { .. })
    }
}
