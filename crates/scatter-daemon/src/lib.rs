//! Scatter Daemon - gateway, peer storage nodes and client
//!
//! This crate provides:
//! - The gateway server that clients talk to
//! - The peer storage node serving one extension
//! - A programmatic client for the gateway protocol
//!
//! # Architecture
//!
//! ```text
//! client ──► Gateway (S1) ──► session ──► upload / transfer / archive / names
//!                                              │
//!                                   local S1 ◄─┴─► PeerLink ──► PeerNode S2/S3/S4
//! ```
//!
//! Every connection gets its own tokio task; sessions share nothing but a
//! read-only context and the filesystem. Every hop uses the same length-prefixed
//! framing from [`net`], and payloads move in bounded chunks.

pub mod archive;
pub mod client;
pub mod gateway;
pub mod names;
pub mod net;
pub mod peer;
pub mod peer_link;
pub mod session;
pub mod storage;
pub mod transfer;
pub mod upload;

pub use client::{ClientError, GatewayClient, Received, Reply};
pub use gateway::{Gateway, GatewayContext, ServerError};
pub use net::{FrameStream, TransportError};
pub use peer::{PeerContext, PeerNode};
pub use peer_link::{PeerError, PeerLink, PeerResponse};
pub use session::Flow;
pub use storage::{Cleanup, StorageError};
