//! Reader for service access files.
//!
//! # Security Guarantees
//!
//! - **Permissions first**: the mode of the opened handle is checked before
//!   a single byte is read; a file with more than `rw-r-----` is rejected
//! - **Scoped handle**: the file is closed as soon as it has been parsed
//! - **No secret logging**: only paths, section names and counts are logged
//! - **Redacted debug output**: [`Credentials`] never prints its values
//!
//! # Example
//!
//! ```no_run
//! use serviceaccess::store::CredentialStore;
//!
//! # fn main() -> serviceaccess::Result<()> {
//! let store = CredentialStore::open("/home/me/.desservices.ini")?;
//! let creds = store.section("db-prod")?;
//! let user = creds.get("user");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, ServiceAccessError};
use crate::ini::{self, SectionMap};
use crate::permissions;

/// Name under which templates can reference the source file.
pub const META_FILE: &str = "meta_file";
/// Name under which templates can reference the section name.
pub const META_SECTION: &str = "meta_section";

/// How often [`CredentialStore::open_with_retry`] tries to open a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, at least 1.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Five attempts, thirty seconds apart, for automounted home directories.
    pub fn automount() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(30),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// A parsed service access file whose permissions have been verified.
#[derive(Clone)]
pub struct CredentialStore {
    path: PathBuf,
    sections: HashMap<String, SectionMap>,
}

impl CredentialStore {
    /// Open, permission-check and parse a service access file.
    ///
    /// # Errors
    ///
    /// - [`ServiceAccessError::Io`] if the file cannot be opened or read
    /// - [`ServiceAccessError::Permission`] if the mode exceeds `rw-r-----`;
    ///   the content is not read in that case
    /// - [`ServiceAccessError::Malformed`] if the content is not valid
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let io_err = |source| ServiceAccessError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let metadata = file.metadata().map_err(io_err)?;

        let faults = permissions::file_faults(&metadata);
        if !faults.is_empty() {
            return Err(ServiceAccessError::Permission {
                path: path.to_path_buf(),
                faults,
            });
        }

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(io_err)?;
        drop(file);

        let content = String::from_utf8(bytes).map_err(|e| ServiceAccessError::Malformed {
            path: path.to_path_buf(),
            line: line_of_offset(e.as_bytes(), e.utf8_error().valid_up_to()),
            reason: "content is not valid UTF-8".to_string(),
        })?;

        let sections = ini::parse(path, &content)?;
        debug!(
            path = %path.display(),
            sections = sections.len(),
            "loaded service access file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            sections,
        })
    }

    /// Like [`CredentialStore::open`], retrying I/O failures per `policy`.
    ///
    /// Permission and parse errors are returned immediately.
    pub fn open_with_retry<P: AsRef<Path>>(path: P, policy: &RetryPolicy) -> Result<Self> {
        let path = path.as_ref();
        let attempts = policy.attempts.max(1);
        let mut attempt = 1;

        loop {
            match Self::open(path) {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(
                        path = %path.display(),
                        attempt,
                        attempts,
                        delay_secs = policy.delay.as_secs(),
                        error = %err,
                        "cannot open service access file, retrying"
                    );
                    // Listing the file is often enough to trigger an automount.
                    let _ = std::fs::symlink_metadata(path);
                    std::thread::sleep(policy.delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Credentials of one section.
    ///
    /// # Errors
    ///
    /// [`ServiceAccessError::SectionNotFound`] if the file has no such section.
    pub fn section(&self, name: &str) -> Result<Credentials> {
        let entries = self
            .sections
            .get(name)
            .ok_or_else(|| ServiceAccessError::SectionNotFound {
                path: self.path.clone(),
                section: name.to_string(),
            })?;

        debug!(section = name, keys = entries.len(), "read section");

        Ok(Credentials {
            source: self.path.clone(),
            section: name.to_string(),
            entries: entries.clone(),
        })
    }

    /// Whether the file defines `name`.
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Section names, sorted.
    pub fn section_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Credentials read from one section of a service access file.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    source: PathBuf,
    section: String,
    entries: SectionMap,
}

impl Credentials {
    /// Value for `key`; keys are case-insensitive.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Shorthand for `get("user")`.
    pub fn user(&self) -> Option<&str> {
        self.get("user")
    }

    /// Shorthand for `get("passwd")`.
    pub fn passwd(&self) -> Option<&str> {
        self.get("passwd")
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries as a read-only map.
    pub fn entries(&self) -> &SectionMap {
        &self.entries
    }

    pub fn into_map(self) -> SectionMap {
        self.entries
    }

    /// Substitute `%(key)s` placeholders.
    ///
    /// `%(meta_file)s` and `%(meta_section)s` expand to the source path and
    /// the section name. `%%` produces a literal `%`.
    ///
    /// # Errors
    ///
    /// [`ServiceAccessError::UnknownKey`] if a placeholder names a key the
    /// section does not define.
    pub fn render_template(&self, template: &str) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('%') {
                out.push('%');
                rest = tail;
                continue;
            }

            let placeholder = after
                .strip_prefix('(')
                .and_then(|inner| inner.find(")s").map(|end| (&inner[..end], &inner[end + 2..])));

            match placeholder {
                Some((key, tail)) => {
                    out.push_str(&self.lookup(key)?);
                    rest = tail;
                }
                None => {
                    out.push('%');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        Ok(out)
    }

    fn lookup(&self, key: &str) -> Result<String> {
        match key {
            META_FILE => Ok(self.source.display().to_string()),
            META_SECTION => Ok(self.section.clone()),
            _ => self
                .get(key)
                .map(str::to_string)
                .ok_or_else(|| ServiceAccessError::UnknownKey {
                    key: key.to_string(),
                }),
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .field("sections", &self.section_names())
            .finish()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("Credentials")
            .field("source", &self.source)
            .field("section", &self.section)
            .field("keys", &keys)
            .finish_non_exhaustive()
    }
}

fn line_of_offset(bytes: &[u8], offset: usize) -> usize {
    bytes[..offset].iter().filter(|&&b| b == b'\n').count() + 1
}
