//! Command grammar and status strings
//!
//! A command is one whitespace-tokenized text line whose first token is the verb.
//! The same five verbs are spoken on two legs with different arguments: clients
//! address the gateway with logical paths, the gateway addresses peers with
//! physical paths. Parsing only checks the verb and arity; per-path validation
//! is left to the pipelines so that one bad path never hides its siblings.
//!
//! Responses start with a status line. Failures always start with `Error:`;
//! anything else is success.

use std::fmt;

use crate::error::{CommandError, ValidationError};
use crate::{MAX_TOKENS, MAX_TRANSFER_PATHS, MAX_UPLOAD_FILES};

/// Prefix every failure status starts with
pub const ERROR_PREFIX: &str = "Error:";

pub mod status {
    pub const UPLOADED: &str = "File uploaded successfully to Server";
    pub const REMOVED: &str = "File removed successfully from Server";
    pub const FILE_READY: &str = "Success: File found and ready to transfer";
    pub const PEER_FILE_READY: &str = "Success: File retrieved from target server";
    pub const TAR_READY: &str = "Success: Tar ready";
    pub const NAMES_READY: &str = "Success: Names ready";

    pub const NOT_FOUND: &str = "Error: File does not exist on Server";
    pub const INVALID_EXTENSION: &str = "Error: Invalid extension";
    pub const UNSUPPORTED_EXTENSION: &str = "Error: Unsupported extension";
    pub const NO_FILES: &str = "Error: No files found for extension";
    pub const DIR_CREATE_FAILED: &str = "Error: Failed to create directory on server";
    pub const INVALID_SIZE: &str = "Error: Invalid file size";
}

pub fn is_error_status(status: &str) -> bool {
    status.starts_with(ERROR_PREFIX)
}

pub fn error_status(message: impl fmt::Display) -> String {
    format!("{} {}", ERROR_PREFIX, message)
}

/// Check a declared payload size against the system ceiling
pub fn validate_size(size: u32, max: u32) -> Result<u32, ValidationError> {
    if size == 0 || size > max {
        return Err(ValidationError::InvalidSize {
            size: size as u64,
            max,
        });
    }
    Ok(size)
}

/// Split a command line on whitespace, bounded to [`MAX_TOKENS`]
pub fn tokenize(line: &str) -> Result<Vec<&str>, CommandError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(CommandError::Empty);
    }
    if tokens.len() > MAX_TOKENS {
        return Err(CommandError::TooManyTokens {
            count: tokens.len(),
            max: MAX_TOKENS,
        });
    }
    Ok(tokens)
}

/// Command verbs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Upload,
    Download,
    Remove,
    Archive,
    ListNames,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Upload => "uploadf",
            Verb::Download => "downlf",
            Verb::Remove => "removef",
            Verb::Archive => "downltar",
            Verb::ListNames => "dispfnames",
        }
    }

    pub fn parse(token: &str) -> Result<Self, CommandError> {
        match token {
            "uploadf" => Ok(Verb::Upload),
            "downlf" => Ok(Verb::Download),
            "removef" => Ok(Verb::Remove),
            "downltar" => Ok(Verb::Archive),
            "dispfnames" => Ok(Verb::ListNames),
            other => Err(CommandError::UnknownVerb(other.to_string())),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_arity(verb: Verb, args: &[&str], min: usize, max: usize) -> Result<(), CommandError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("expects {} argument(s)", min)
        } else {
            format!("expects {} to {} arguments", min, max)
        };
        return Err(ValidationError::Usage {
            verb: verb.as_str(),
            reason: format!("{}, got {}", expected, args.len()),
        }
        .into());
    }
    Ok(())
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// A command sent by a client to the gateway
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayRequest {
    /// `uploadf <name1> [name2] [name3] <destPath>`; each name is followed on
    /// the wire by a size and a payload
    Upload { files: Vec<String>, dest: String },
    /// `downlf <path1> [path2]`
    Download { paths: Vec<String> },
    /// `removef <path1> [path2]`
    Remove { paths: Vec<String> },
    /// `downltar <ext>`
    Archive { extension: String },
    /// `dispfnames <path>`
    ListNames { dir: String },
}

impl GatewayRequest {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let tokens = tokenize(line)?;
        let verb = Verb::parse(tokens[0])?;
        let args = &tokens[1..];

        match verb {
            Verb::Upload => {
                check_arity(verb, args, 2, MAX_UPLOAD_FILES + 1)?;
                let Some((dest, files)) = args.split_last() else {
                    return Err(CommandError::Empty);
                };
                Ok(GatewayRequest::Upload {
                    files: owned(files),
                    dest: dest.to_string(),
                })
            }
            Verb::Download => {
                check_arity(verb, args, 1, MAX_TRANSFER_PATHS)?;
                Ok(GatewayRequest::Download { paths: owned(args) })
            }
            Verb::Remove => {
                check_arity(verb, args, 1, MAX_TRANSFER_PATHS)?;
                Ok(GatewayRequest::Remove { paths: owned(args) })
            }
            Verb::Archive => {
                check_arity(verb, args, 1, 1)?;
                Ok(GatewayRequest::Archive {
                    extension: args[0].to_string(),
                })
            }
            Verb::ListNames => {
                check_arity(verb, args, 1, 1)?;
                Ok(GatewayRequest::ListNames {
                    dir: args[0].to_string(),
                })
            }
        }
    }

    pub fn verb(&self) -> Verb {
        match self {
            GatewayRequest::Upload { .. } => Verb::Upload,
            GatewayRequest::Download { .. } => Verb::Download,
            GatewayRequest::Remove { .. } => Verb::Remove,
            GatewayRequest::Archive { .. } => Verb::Archive,
            GatewayRequest::ListNames { .. } => Verb::ListNames,
        }
    }

    pub fn to_line(&self) -> String {
        let verb = self.verb();
        match self {
            GatewayRequest::Upload { files, dest } => {
                format!("{} {} {}", verb, files.join(" "), dest)
            }
            GatewayRequest::Download { paths } | GatewayRequest::Remove { paths } => {
                format!("{} {}", verb, paths.join(" "))
            }
            GatewayRequest::Archive { extension } => format!("{} {}", verb, extension),
            GatewayRequest::ListNames { dir } => format!("{} {}", verb, dir),
        }
    }
}

/// A command sent by the gateway to a peer node
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerRequest {
    /// `uploadf <physicalPath>`, followed by a size and a payload
    Upload { path: String },
    /// `removef <physicalPath>`
    Remove { path: String },
    /// `downlf <physicalPath>`
    Download { path: String },
    /// `downltar <ext>`
    Archive { extension: String },
    /// `dispfnames <physicalDir> <ext>`
    ListNames { dir: String, extension: String },
}

impl PeerRequest {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let tokens = tokenize(line)?;
        let verb = Verb::parse(tokens[0])?;
        let args = &tokens[1..];

        match verb {
            Verb::Upload => {
                check_arity(verb, args, 1, 1)?;
                Ok(PeerRequest::Upload {
                    path: args[0].to_string(),
                })
            }
            Verb::Remove => {
                check_arity(verb, args, 1, 1)?;
                Ok(PeerRequest::Remove {
                    path: args[0].to_string(),
                })
            }
            Verb::Download => {
                check_arity(verb, args, 1, 1)?;
                Ok(PeerRequest::Download {
                    path: args[0].to_string(),
                })
            }
            Verb::Archive => {
                check_arity(verb, args, 1, 1)?;
                Ok(PeerRequest::Archive {
                    extension: args[0].to_string(),
                })
            }
            Verb::ListNames => {
                check_arity(verb, args, 2, 2)?;
                Ok(PeerRequest::ListNames {
                    dir: args[0].to_string(),
                    extension: args[1].to_string(),
                })
            }
        }
    }

    pub fn verb(&self) -> Verb {
        match self {
            PeerRequest::Upload { .. } => Verb::Upload,
            PeerRequest::Remove { .. } => Verb::Remove,
            PeerRequest::Download { .. } => Verb::Download,
            PeerRequest::Archive { .. } => Verb::Archive,
            PeerRequest::ListNames { .. } => Verb::ListNames,
        }
    }

    pub fn to_line(&self) -> String {
        let verb = self.verb();
        match self {
            PeerRequest::Upload { path }
            | PeerRequest::Remove { path }
            | PeerRequest::Download { path } => format!("{} {}", verb, path),
            PeerRequest::Archive { extension } => format!("{} {}", verb, extension),
            PeerRequest::ListNames { dir, extension } => {
                format!("{} {} {}", verb, dir, extension)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("  downlf \t~S1/a.c  ").unwrap(), vec!["downlf", "~S1/a.c"]);
        assert_eq!(tokenize("   "), Err(CommandError::Empty));
        assert_eq!(
            tokenize("a b c d e f"),
            Err(CommandError::TooManyTokens { count: 6, max: 5 })
        );
        assert_eq!(tokenize("a b c d e").unwrap().len(), 5);
    }

    #[test]
    fn test_parse_upload() {
        let req = GatewayRequest::parse("uploadf a.c b.txt c.pdf ~S1/dir").unwrap();
        assert_eq!(
            req,
            GatewayRequest::Upload {
                files: vec!["a.c".into(), "b.txt".into(), "c.pdf".into()],
                dest: "~S1/dir".into(),
            }
        );
        assert_eq!(req.to_line(), "uploadf a.c b.txt c.pdf ~S1/dir");
    }

    #[test]
    fn test_parse_upload_needs_a_file() {
        let err = GatewayRequest::parse("uploadf ~S1/dir").unwrap_err();
        assert!(matches!(err, CommandError::Invalid(ValidationError::Usage { .. })));
    }

    #[test]
    fn test_parse_transfer_arity() {
        assert!(GatewayRequest::parse("downlf ~S1/a.c ~S1/b.pdf").is_ok());
        assert!(GatewayRequest::parse("downlf").is_err());
        assert!(GatewayRequest::parse("removef ~S1/a ~S1/b ~S1/c").is_err());
        assert!(GatewayRequest::parse("downltar .c .pdf").is_err());
        assert!(GatewayRequest::parse("dispfnames").is_err());
    }

    #[test]
    fn test_parse_unknown_verb() {
        assert_eq!(
            GatewayRequest::parse("ls ~S1"),
            Err(CommandError::UnknownVerb("ls".into()))
        );
    }

    #[test]
    fn test_peer_request_round_trip() {
        let reqs = [
            PeerRequest::Upload { path: "/h/S2/a.pdf".into() },
            PeerRequest::Remove { path: "/h/S3/a.txt".into() },
            PeerRequest::Download { path: "/h/S4/a.zip".into() },
            PeerRequest::Archive { extension: ".pdf".into() },
            PeerRequest::ListNames { dir: "/h/S3/d".into(), extension: ".txt".into() },
        ];
        for req in reqs {
            assert_eq!(PeerRequest::parse(&req.to_line()).unwrap(), req);
        }
    }

    #[test]
    fn test_validate_size() {
        assert!(validate_size(0, 100).is_err());
        assert!(validate_size(101, 100).is_err());
        assert_eq!(validate_size(100, 100), Ok(100));
        assert_eq!(validate_size(1, 100), Ok(1));
    }

    #[test]
    fn test_error_status() {
        assert!(is_error_status(status::NOT_FOUND));
        assert!(is_error_status(&error_status("boom")));
        assert!(!is_error_status(status::UPLOADED));
        assert!(!is_error_status(status::REMOVED));
        assert_eq!(error_status("boom"), "Error: boom");
    }
}
