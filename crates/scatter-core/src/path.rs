//! Logical and physical paths
//!
//! Clients address files through a node-neutral alias (`~S1/...`). Each node
//! stores its files under `<root>/S<n>/...`, so moving a path between nodes only
//! swaps the node segment; everything after it is preserved.
//!
//! All relative parts are validated before they are joined to a root, which keeps
//! `..` and absolute components from escaping a node's tree.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::ValidationError;
use crate::placement::NodeId;
use crate::{MAX_FILENAME_LEN, MAX_PATH_LEN};

/// Alias clients use for the root of the gateway's tree
pub const LOCAL_ALIAS: &str = "~S1";

/// Client-supplied path rooted at [`LOCAL_ALIAS`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalPath {
    raw: String,
    relative: PathBuf,
}

impl LogicalPath {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let rest = raw
            .strip_prefix(LOCAL_ALIAS)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .ok_or_else(|| ValidationError::MissingAlias {
                alias: LOCAL_ALIAS,
                path: raw.to_string(),
            })?;

        let relative = safe_relative(rest.trim_start_matches('/'))?;
        Ok(Self {
            raw: raw.to_string(),
            relative,
        })
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Physical location on the gateway itself
    pub fn resolve(&self, root: &Path) -> PhysicalPath {
        PhysicalPath::new(root, NodeId::Local, self.relative.clone())
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Absolute location of a file or directory on one specific node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalPath {
    root: PathBuf,
    node: NodeId,
    relative: PathBuf,
}

impl PhysicalPath {
    pub fn new(root: impl Into<PathBuf>, node: NodeId, relative: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            node,
            relative: relative.into(),
        }
    }

    /// Parse an absolute path received from the wire, as seen by `node`
    ///
    /// The path must sit inside `<root>/<segment>` and may not contain `..`.
    pub fn parse(root: &Path, node: NodeId, raw: &str) -> Result<Self, ValidationError> {
        let node_root = node_root(root, node);
        let relative = Path::new(raw)
            .strip_prefix(&node_root)
            .map_err(|_| ValidationError::OutsideNode {
                node: node.segment(),
                path: raw.to_string(),
            })?;

        let relative = safe_relative(&relative.to_string_lossy())?;
        Ok(Self::new(root, node, relative))
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Same path on another node; only the node segment changes
    pub fn with_node(&self, node: NodeId) -> Self {
        Self {
            root: self.root.clone(),
            node,
            relative: self.relative.clone(),
        }
    }

    pub fn join(&self, name: &str) -> Self {
        Self {
            root: self.root.clone(),
            node: self.node,
            relative: self.relative.join(name),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        self.relative.parent().map(|parent| Self {
            root: self.root.clone(),
            node: self.node,
            relative: parent.to_path_buf(),
        })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.relative.file_name().and_then(|n| n.to_str())
    }

    pub fn node_root(&self) -> PathBuf {
        node_root(&self.root, self.node)
    }

    pub fn to_path_buf(&self) -> PathBuf {
        let mut path = self.node_root();
        if !self.relative.as_os_str().is_empty() {
            path.push(&self.relative);
        }
        path
    }

    /// Text form sent to peers
    pub fn to_wire(&self) -> String {
        self.to_path_buf().to_string_lossy().into_owned()
    }
}

impl fmt::Display for PhysicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path_buf().display())
    }
}

/// Root of one node's tree
pub fn node_root(root: &Path, node: NodeId) -> PathBuf {
    root.join(node.segment())
}

/// Validate a relative path and normalise away `.` components
///
/// Rejects absolute paths, `..`, null bytes and over-long names. Works on paths
/// that do not exist yet, unlike `canonicalize()`.
pub fn safe_relative(relative: &str) -> Result<PathBuf, ValidationError> {
    if relative.contains('\0') {
        return Err(ValidationError::PathTraversal("path contains null byte".into()));
    }

    if relative.len() > MAX_PATH_LEN {
        return Err(ValidationError::PathTraversal(format!(
            "path too long: {} bytes (max {})",
            relative.len(),
            MAX_PATH_LEN
        )));
    }

    let mut result = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => {
                let name_str = name.to_string_lossy();
                if name_str.len() > MAX_FILENAME_LEN {
                    return Err(ValidationError::PathTraversal(format!(
                        "filename too long: {} bytes (max {})",
                        name_str.len(),
                        MAX_FILENAME_LEN
                    )));
                }
                result.push(name);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ValidationError::PathTraversal(
                    "parent directory (..) not allowed".into(),
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ValidationError::PathTraversal(
                    "absolute paths not allowed".into(),
                ));
            }
        }
    }

    Ok(result)
}

/// Validate a single path component
pub fn validate_filename(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::PathTraversal("empty filename".into()));
    }

    if name.contains('\0') {
        return Err(ValidationError::PathTraversal("filename contains null byte".into()));
    }

    if name.len() > MAX_FILENAME_LEN {
        return Err(ValidationError::PathTraversal(format!(
            "filename too long: {} bytes (max {})",
            name.len(),
            MAX_FILENAME_LEN
        )));
    }

    if name == "." || name == ".." {
        return Err(ValidationError::PathTraversal(
            "special directory names not allowed".into(),
        ));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(ValidationError::PathTraversal(
            "filename contains path separator".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/home/user")
    }

    #[test]
    fn test_logical_resolve() {
        let logical = LogicalPath::parse("~S1/folder/sub/a.c").unwrap();
        assert_eq!(logical.relative(), Path::new("folder/sub/a.c"));
        assert_eq!(
            logical.resolve(&root()).to_path_buf(),
            PathBuf::from("/home/user/S1/folder/sub/a.c")
        );
    }

    #[test]
    fn test_logical_alias_only() {
        let logical = LogicalPath::parse("~S1").unwrap();
        assert_eq!(logical.resolve(&root()).to_path_buf(), PathBuf::from("/home/user/S1"));
        let logical = LogicalPath::parse("~S1/").unwrap();
        assert_eq!(logical.resolve(&root()).to_path_buf(), PathBuf::from("/home/user/S1"));
    }

    #[test]
    fn test_logical_requires_alias() {
        assert!(matches!(
            LogicalPath::parse("/home/user/S1/a.c"),
            Err(ValidationError::MissingAlias { .. })
        ));
        assert!(LogicalPath::parse("~S2/a.pdf").is_err());
        assert!(LogicalPath::parse("~S10/a.c").is_err());
        assert!(LogicalPath::parse("a.c").is_err());
    }

    #[test]
    fn test_logical_rejects_traversal() {
        assert!(matches!(
            LogicalPath::parse("~S1/../../etc/passwd"),
            Err(ValidationError::PathTraversal(_))
        ));
        assert!(LogicalPath::parse("~S1/a/../../b.c").is_err());
        assert!(LogicalPath::parse("~S1/a\0.c").is_err());
    }

    #[test]
    fn test_with_node_swaps_segment_only() {
        let local = LogicalPath::parse("~S1/x/y/report.pdf").unwrap().resolve(&root());
        let remote = local.with_node(NodeId::Peer2);
        assert_eq!(remote.to_wire(), "/home/user/S2/x/y/report.pdf");
        assert_eq!(remote.relative(), local.relative());
        assert_eq!(remote.file_name(), Some("report.pdf"));
    }

    #[test]
    fn test_physical_parse_on_peer() {
        let path = PhysicalPath::parse(&root(), NodeId::Peer3, "/home/user/S3/notes/a.txt").unwrap();
        assert_eq!(path.relative(), Path::new("notes/a.txt"));
        assert_eq!(path.node(), NodeId::Peer3);
    }

    #[test]
    fn test_physical_parse_rejects_foreign_tree() {
        assert!(matches!(
            PhysicalPath::parse(&root(), NodeId::Peer3, "/home/user/S2/notes/a.txt"),
            Err(ValidationError::OutsideNode { .. })
        ));
        assert!(PhysicalPath::parse(&root(), NodeId::Peer3, "/etc/passwd").is_err());
        assert!(PhysicalPath::parse(&root(), NodeId::Peer3, "/home/user/S3/../S1/a.c").is_err());
    }

    #[test]
    fn test_parent_and_join() {
        let dir = PhysicalPath::new(root(), NodeId::Local, "d");
        let file = dir.join("a.c");
        assert_eq!(file.to_path_buf(), PathBuf::from("/home/user/S1/d/a.c"));
        assert_eq!(file.parent(), Some(dir));
    }

    #[test]
    fn test_safe_relative_handles_dot() {
        assert_eq!(safe_relative("./a/./b.c").unwrap(), PathBuf::from("a/b.c"));
        assert_eq!(safe_relative("").unwrap(), PathBuf::new());
        assert!(safe_relative("/abs").is_err());
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("file.txt").is_ok());
        assert!(validate_filename("my-file_v2.tar.zip").is_ok());

        assert!(validate_filename("").is_err());
        assert!(validate_filename(".").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("file/name").is_err());
        assert!(validate_filename("file\0name").is_err());
        assert!(validate_filename(&"a".repeat(MAX_FILENAME_LEN + 1)).is_err());
    }
}
