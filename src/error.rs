//! Error types for service access files.

use std::path::PathBuf;
use thiserror::Error;

use crate::permissions::PermissionFault;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ServiceAccessError>;

/// Everything that can go wrong while locating, opening or reading a
/// service access file.
#[derive(Error, Debug)]
pub enum ServiceAccessError {
    /// The file grants more than owner read/write and group read.
    #[error("faulty permissions on {}: {}", .path.display(), format_faults(.faults))]
    Permission {
        path: PathBuf,
        faults: Vec<PermissionFault>,
    },

    /// The requested section is not present in the file.
    #[error("section '{section}' not found in {}", .path.display())]
    SectionNotFound { path: PathBuf, section: String },

    /// The file does not follow the `[section]` / `key = value` grammar.
    #[error("malformed service access file {} (line {line}): {reason}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The file could not be opened or read.
    #[error("unable to read service access file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Neither an explicit section nor a `DES_<TAG>_SECTION` variable was given.
    #[error("faulty section: no section given and none found in the environment")]
    MissingSection,

    /// A template referenced a key the section does not define.
    #[error("unknown key '{key}' in template")]
    UnknownKey { key: String },

    /// `render_section` was given text the file format cannot hold unchanged.
    #[error("cannot write {what}: it {reason}")]
    Unrepresentable { what: String, reason: &'static str },

    /// The YAML configuration could not be loaded or failed validation.
    #[error("invalid configuration {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },
}

impl ServiceAccessError {
    /// Only I/O failures can be transient (automounted home directories).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceAccessError::Io { .. })
    }
}

fn format_faults(faults: &[PermissionFault]) -> String {
    faults
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
