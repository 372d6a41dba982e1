//! Parser and writer for the service access file format.
//!
//! ```text
//! ; comment
//! [db-prod]
//! user   = username
//! passwd = userPassword   ; trailing comment
//! ```
//!
//! # Rules
//!
//! - Blank lines and lines starting with `;` or `#` are ignored
//! - A `;` preceded by whitespace starts a trailing comment
//! - Keys are case-insensitive and stored lower-cased; values keep their case
//! - The first `=` separates key from value
//! - Repeated keys and repeated sections: the last value wins

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, ServiceAccessError};

/// Key-value pairs of one section.
pub type SectionMap = HashMap<String, String>;

/// Parse a whole file into its sections.
///
/// `path` is only used to label errors.
pub fn parse(path: &Path, content: &str) -> Result<HashMap<String, SectionMap>> {
    let mut sections: HashMap<String, SectionMap> = HashMap::new();
    let mut current: Option<String> = None;
    let content = content.strip_prefix('\u{FEFF}').unwrap_or(content);

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let malformed = |reason: &str| ServiceAccessError::Malformed {
            path: path.to_path_buf(),
            line: line_no,
            reason: reason.to_string(),
        };

        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        let line = strip_trailing_comment(line);

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest
                .strip_suffix(']')
                .ok_or_else(|| malformed("section header is missing ']'"))?
                .trim();
            if name.is_empty() {
                return Err(malformed("empty section name"));
            }
            if name.contains(['[', ']']) {
                return Err(malformed("section name cannot contain '[' or ']'"));
            }
            sections.entry(name.to_string()).or_default();
            current = Some(name.to_string());
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| malformed("expected 'key = value'"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(malformed("empty key"));
        }

        let section = current
            .as_ref()
            .ok_or_else(|| malformed("entry appears before any [section] header"))?;

        sections
            .entry(section.clone())
            .or_default()
            .insert(key.to_lowercase(), value.trim().to_string());
    }

    Ok(sections)
}

/// Cut a `;` comment that follows whitespace. A `;` glued onto a value is
/// kept as part of the value.
fn strip_trailing_comment(line: &str) -> &str {
    let mut prev_is_space = false;
    for (i, c) in line.char_indices() {
        if c == ';' && prev_is_space {
            return line[..i].trim_end();
        }
        prev_is_space = c.is_whitespace();
    }
    line
}

/// Render one section in the service access format, keys sorted.
///
/// Only text the parser reads back unchanged is written; anything else is
/// rejected with [`ServiceAccessError::Unrepresentable`] rather than
/// silently altered.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use serviceaccess::ini::render_section;
///
/// let mut entries = HashMap::new();
/// entries.insert("user".to_string(), "username".to_string());
///
/// assert_eq!(
///     render_section("file-http", &entries).unwrap(),
///     "[file-http]\nuser = username\n"
/// );
/// ```
pub fn render_section(name: &str, entries: &SectionMap) -> Result<String> {
    let unrepresentable = |what: String, reason: &'static str| ServiceAccessError::Unrepresentable {
        what,
        reason,
    };

    if name.is_empty() {
        return Err(unrepresentable("section name".to_string(), "is empty"));
    }
    if name.contains(['[', ']']) {
        return Err(unrepresentable(
            format!("section '{}'", name),
            "contains '[' or ']'",
        ));
    }
    if let Some(reason) = text_fault(name) {
        return Err(unrepresentable(format!("section '{}'", name), reason));
    }

    let mut keys: Vec<&String> = entries.keys().collect();
    keys.sort();

    let mut out = format!("[{}]\n", name);
    for key in keys {
        let value = &entries[key];

        let key_fault = if key.is_empty() {
            Some("is empty")
        } else if key.contains('=') {
            Some("contains '='")
        } else if *key != key.to_lowercase() {
            Some("is not lower-case")
        } else if key.starts_with([';', '#', '[']) {
            Some("starts with a comment or header marker")
        } else {
            text_fault(key)
        };
        if let Some(reason) = key_fault {
            return Err(unrepresentable(format!("key '{}'", key), reason));
        }

        // Values are never echoed back in errors.
        let value_fault = if value.starts_with(';') {
            Some("starts with ';'")
        } else {
            text_fault(value)
        };
        if let Some(reason) = value_fault {
            return Err(unrepresentable(format!("value of key '{}'", key), reason));
        }

        out.push_str(&format!("{} = {}\n", key, value));
    }
    Ok(out)
}

/// Why `text` would not survive a line-based, trimmed, comment-stripped read.
fn text_fault(text: &str) -> Option<&'static str> {
    if text.contains(['\n', '\r']) {
        Some("contains a line break")
    } else if text.trim() != text {
        Some("has leading or trailing whitespace")
    } else if strip_trailing_comment(text) != text {
        Some("contains ';' after whitespace")
    } else {
        None
    }
}
