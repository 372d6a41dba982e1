// Service Access - Permissions Module
//
// A service access file holds plaintext passwords, so it may be readable by
// its owner and group only, and writable by its owner only.

use std::fmt;

/// Bits a service access file may carry: `rw-r-----`.
pub const ALLOWED_MODE: u32 = 0o640;

/// A single permission bit outside [`ALLOWED_MODE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionFault {
    SetUid,
    SetGid,
    Sticky,
    OwnerExecute,
    GroupWrite,
    GroupExecute,
    OtherRead,
    OtherWrite,
    OtherExecute,
}

impl PermissionFault {
    const ALL: [(u32, PermissionFault); 9] = [
        (0o4000, PermissionFault::SetUid),
        (0o2000, PermissionFault::SetGid),
        (0o1000, PermissionFault::Sticky),
        (0o0100, PermissionFault::OwnerExecute),
        (0o0020, PermissionFault::GroupWrite),
        (0o0010, PermissionFault::GroupExecute),
        (0o0004, PermissionFault::OtherRead),
        (0o0002, PermissionFault::OtherWrite),
        (0o0001, PermissionFault::OtherExecute),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionFault::SetUid => "setuid",
            PermissionFault::SetGid => "setgid",
            PermissionFault::Sticky => "sticky",
            PermissionFault::OwnerExecute => "owner_execute",
            PermissionFault::GroupWrite => "group_write",
            PermissionFault::GroupExecute => "group_execute",
            PermissionFault::OtherRead => "other_read",
            PermissionFault::OtherWrite => "other_write",
            PermissionFault::OtherExecute => "other_execute",
        }
    }
}

impl fmt::Display for PermissionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// List every bit of `mode` that a service access file must not carry.
///
/// File-type bits above `0o7777` are ignored. An empty result means the
/// mode is acceptable.
///
/// # Example
///
/// ```
/// use serviceaccess::permissions::{mode_faults, PermissionFault};
///
/// assert!(mode_faults(0o100640).is_empty());
/// assert_eq!(mode_faults(0o644), vec![PermissionFault::OtherRead]);
/// ```
pub fn mode_faults(mode: u32) -> Vec<PermissionFault> {
    PermissionFault::ALL
        .iter()
        .filter(|(bit, _)| mode & bit != 0)
        .map(|(_, fault)| *fault)
        .collect()
}

/// Faults for an already opened file, read from its handle rather than its
/// path so the checked file is the one that gets parsed.
#[cfg(unix)]
pub fn file_faults(metadata: &std::fs::Metadata) -> Vec<PermissionFault> {
    use std::os::unix::fs::PermissionsExt;

    mode_faults(metadata.permissions().mode())
}

#[cfg(not(unix))]
pub fn file_faults(_metadata: &std::fs::Metadata) -> Vec<PermissionFault> {
    tracing::warn!("permission bits are not available on this platform; skipping check");
    Vec::new()
}
