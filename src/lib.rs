//! Service Access - permission-checked credential files.
//!
//! A service access file (by default `$HOME/.desservices.ini`) holds the
//! user names and passwords that pipeline tools need for databases and
//! file transfer, one `[section]` per service. This library refuses to read
//! such a file unless it is limited to `rw-r-----`.

pub mod config;
pub mod error;
pub mod ini;
pub mod permissions;
pub mod store;

pub use config::{Environment, Lookup};
pub use error::{Result, ServiceAccessError};
pub use store::{CredentialStore, Credentials, RetryPolicy};

/// Resolve, open and read one section in a single call.
///
/// # Example
///
/// ```no_run
/// use serviceaccess::{fetch, Environment, Lookup, RetryPolicy};
///
/// # fn main() -> serviceaccess::Result<()> {
/// let lookup = Lookup::new().tag("db");
/// let creds = fetch(&lookup, &Environment::from_process(), &RetryPolicy::none())?;
/// println!("connecting as {:?}", creds.user());
/// # Ok(())
/// # }
/// ```
pub fn fetch(lookup: &Lookup, env: &Environment, retry: &RetryPolicy) -> Result<Credentials> {
    let section = lookup.resolve_section(env)?;
    let file = lookup.resolve_file(env)?;
    CredentialStore::open_with_retry(&file, retry)?.section(&section)
}
