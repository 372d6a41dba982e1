//! Common testing utilities for service access integration tests.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

/// A file with two services, as operators usually write it.
#[allow(dead_code)]
pub const TWO_SECTIONS: &str = "\
;
;  service access file
;
[file-http]
user   = username
passwd = userPassword

[db-prod]
user   = dbuser
passwd = dbPassword
server = db.example.org
";

/// Test context that manages temporary files and directories.
pub struct TestContext {
    /// Path to temporary directory
    pub temp_path: PathBuf,
    /// The temporary directory (kept to prevent early deletion)
    _temp_dir: TempDir,
}

impl TestContext {
    /// Create a new test context with a temporary directory.
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        let temp_path = temp_dir.path().to_path_buf();

        Ok(Self {
            temp_path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a test file with content.
    pub fn create_file(&self, name: &str, content: &str) -> anyhow::Result<PathBuf> {
        let file_path = self.temp_path.join(name);
        let mut file = fs::File::create(&file_path)?;
        file.write_all(content.as_bytes())?;
        Ok(file_path)
    }

    /// Create a service access file with the given permission bits.
    #[cfg(unix)]
    pub fn create_services(&self, name: &str, content: &str, mode: u32) -> anyhow::Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let file_path = self.create_file(name, content)?;
        fs::set_permissions(&file_path, fs::Permissions::from_mode(mode))?;
        Ok(file_path)
    }

    /// Get the path to a file in the temp directory.
    #[allow(dead_code)]
    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_path.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_context_create_file() {
        let ctx = TestContext::new().unwrap();
        let file_path = ctx.create_file("test.txt", "Hello, World!").unwrap();

        assert!(file_path.exists());
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "Hello, World!");
    }

    #[cfg(unix)]
    #[test]
    fn test_create_services_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let ctx = TestContext::new().unwrap();
        let path = ctx.create_services("s.ini", "[s]\n", 0o640).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();

        assert_eq!(mode & 0o7777, 0o640);
    }
}
