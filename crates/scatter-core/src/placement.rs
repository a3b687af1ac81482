//! Extension-based placement
//!
//! Every file lives on exactly one node, chosen by its extension alone. The
//! mapping is fixed for the lifetime of the system; there is no rebalancing and
//! nothing is recorded anywhere.

use std::fmt;

use crate::error::RoutingError;
use crate::path::PhysicalPath;

/// One of the four storage nodes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    /// The gateway itself (S1)
    Local,
    Peer2,
    Peer3,
    Peer4,
}

impl NodeId {
    pub const ALL: [NodeId; 4] = [NodeId::Local, NodeId::Peer2, NodeId::Peer3, NodeId::Peer4];

    pub fn number(self) -> u8 {
        match self {
            NodeId::Local => 1,
            NodeId::Peer2 => 2,
            NodeId::Peer3 => 3,
            NodeId::Peer4 => 4,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(NodeId::Local),
            2 => Some(NodeId::Peer2),
            3 => Some(NodeId::Peer3),
            4 => Some(NodeId::Peer4),
            _ => None,
        }
    }

    /// Directory name of this node's tree under the storage root
    pub fn segment(self) -> &'static str {
        match self {
            NodeId::Local => "S1",
            NodeId::Peer2 => "S2",
            NodeId::Peer3 => "S3",
            NodeId::Peer4 => "S4",
        }
    }

    pub fn is_local(self) -> bool {
        self == NodeId::Local
    }

    /// The single extension stored on this node
    pub fn extension(self) -> Extension {
        match self {
            NodeId::Local => Extension::C,
            NodeId::Peer2 => Extension::Pdf,
            NodeId::Peer3 => Extension::Txt,
            NodeId::Peer4 => Extension::Zip,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// The extension allow-list
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Extension {
    C,
    Pdf,
    Txt,
    Zip,
}

impl Extension {
    /// Fixed order used when listings from several nodes are concatenated
    pub const ALL: [Extension; 4] = [Extension::C, Extension::Pdf, Extension::Txt, Extension::Zip];

    pub fn as_str(self) -> &'static str {
        match self {
            Extension::C => ".c",
            Extension::Pdf => ".pdf",
            Extension::Txt => ".txt",
            Extension::Zip => ".zip",
        }
    }

    /// Parse an extension token such as `.pdf` (case-sensitive)
    pub fn parse(token: &str) -> Result<Self, RoutingError> {
        match token {
            ".c" => Ok(Extension::C),
            ".pdf" => Ok(Extension::Pdf),
            ".txt" => Ok(Extension::Txt),
            ".zip" => Ok(Extension::Zip),
            other => Err(RoutingError::UnsupportedExtension(other.to_string())),
        }
    }

    /// Extension of a file name or path, checked against the allow-list
    pub fn of(name: &str) -> Result<Self, RoutingError> {
        Self::parse(extension_of(name))
    }

    /// Whether `name` carries exactly this extension
    pub fn matches(self, name: &str) -> bool {
        extension_of(name) == self.as_str()
    }

    /// Name of the archive built for this extension, if archiving is offered
    pub fn archive_name(self) -> Option<&'static str> {
        match self {
            Extension::C => Some("cfiles.tar"),
            Extension::Pdf => Some("pdf.tar"),
            Extension::Txt => Some("text.tar"),
            Extension::Zip => None,
        }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substring from the last `.` of the final path component
///
/// Empty when there is no dot or the dot is the first character of the name,
/// so hidden files like `.profile` have no extension.
pub fn extension_of(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &base[idx..],
    }
}

/// Owning node of an extension
pub fn place(ext: Extension) -> NodeId {
    match ext {
        Extension::C => NodeId::Local,
        Extension::Pdf => NodeId::Peer2,
        Extension::Txt => NodeId::Peer3,
        Extension::Zip => NodeId::Peer4,
    }
}

/// Routing decision for one file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub node: NodeId,
    pub extension: Extension,
    /// Physical path on `node`
    pub path: PhysicalPath,
}

/// Decide where a gateway-local path really lives
///
/// Pure: no filesystem or network access happens here, so an unsupported
/// extension is rejected before any I/O.
pub fn route(local: &PhysicalPath) -> Result<Route, RoutingError> {
    let name = local.file_name().unwrap_or("");
    let extension = Extension::of(name)?;
    let node = place(extension);
    Ok(Route {
        node,
        extension,
        path: local.with_node(node),
    })
}
