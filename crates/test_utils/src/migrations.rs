//! Migration script scaffolding for tests
//!
//! Migration tests need real `.sql` files on disk. [`ScriptDir`] owns a
//! unique directory under the system temp dir, hands out paths to scripts
//! written into it, and removes the directory on drop.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// A temp directory holding migration scripts for one test
pub struct ScriptDir {
    dir: PathBuf,
}

impl ScriptDir {
    /// Creates a fresh, uniquely named script directory.
    pub fn new() -> io::Result<Self> {
        let dir = std::env::temp_dir().join(format!("unitwork-migrations-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Writes a script with the given filename and SQL text, returning its
    /// full path.
    pub fn write(&self, filename: &str, sql: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(filename);
        fs::write(&path, sql)?;
        Ok(path)
    }
}

impl Drop for ScriptDir {
    fn drop(&mut self) {
        // best-effort cleanup
        let _ = fs::remove_dir_all(&self.dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_land_in_the_directory() {
        let scripts = ScriptDir::new().unwrap();
        let path = scripts.write("001_init.sql", "SELECT 1").unwrap();
        assert!(path.starts_with(scripts.path()));
        assert_eq!(fs::read_to_string(&path).unwrap(), "SELECT 1");
    }

    #[test]
    fn directory_is_removed_on_drop() {
        let scripts = ScriptDir::new().unwrap();
        let dir = scripts.path().to_path_buf();
        drop(scripts);
        assert!(!dir.exists());
    }
}
