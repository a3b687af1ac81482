//! Scatter Core - placement rules, path model and wire grammar
//!
//! This crate holds everything about the federation that does not touch a socket:
//! which node owns an extension, how a client's logical path maps onto each
//! node's physical tree, the command grammar spoken on both the client and peer
//! legs, and the configuration file format.

pub mod config;
pub mod error;
pub mod path;
pub mod placement;
pub mod protocol;

pub use config::{
    Config, ConfigError, GatewayConfig, NetworkConfig, PeerDirectory, PeerNodeConfig, StorageConfig,
};
pub use error::*;
pub use path::{LogicalPath, PhysicalPath, LOCAL_ALIAS};
pub use placement::{place, route, Extension, NodeId, Route};
pub use protocol::*;

/// Upper bound on bytes moved by a single read or write call
pub const CHUNK_SIZE: usize = 8192;

/// Default system-wide ceiling for any single file or archive (50 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u32 = 50 * 1024 * 1024;

/// Maximum length of a text frame (command line, status, name)
pub const MAX_TEXT_FRAME: usize = 4096;

/// Maximum tokens in one command line, verb included
pub const MAX_TOKENS: usize = 5;

/// Maximum files accepted by one upload command
pub const MAX_UPLOAD_FILES: usize = 3;

/// Maximum paths accepted by one download or remove command
pub const MAX_TRANSFER_PATHS: usize = 2;

/// Maximum path length in bytes
pub const MAX_PATH_LEN: usize = 4096;

/// Maximum filename length in bytes
pub const MAX_FILENAME_LEN: usize = 255;
