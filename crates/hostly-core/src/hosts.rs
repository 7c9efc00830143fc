//! System hosts file access
//!
//! Reads the effective hosts file for preview and replaces it atomically when
//! a composition is applied. Writing usually needs elevation; a permission
//! failure is reported once and never retried here.
//!
//! Editing the system file directly (see [`SystemHostsWriter::save_manual`]) is
//! an escape hatch: the next apply caused by any profile change overwrites it.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::HostsSettings;
use crate::error::{HostlyError, Result};

#[cfg(target_os = "windows")]
pub fn default_hosts_path() -> PathBuf {
    PathBuf::from("C:\\Windows\\System32\\drivers\\etc\\hosts")
}

#[cfg(not(target_os = "windows"))]
pub fn default_hosts_path() -> PathBuf {
    PathBuf::from("/etc/hosts")
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn temp_file_beside(path: &Path) -> io::Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix(".hostly-")
        .suffix(".tmp")
        .tempfile_in(parent_dir(path))
}

/// Write `content` to a synced temp file next to `path` without replacing it
///
/// Persisting the returned file onto `path` is an atomic rename; dropping it
/// removes the temp file.
pub(crate) fn stage_atomic(path: &Path, content: &[u8]) -> io::Result<tempfile::NamedTempFile> {
    let mut temp = temp_file_beside(path)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }

    Ok(temp)
}

/// Write `content` next to `path` in a temp file, then rename it into place.
///
/// The temp file lives in the target directory so the rename never crosses a
/// filesystem. On any failure the temp file is removed and `path` keeps its
/// previous content.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    stage_atomic(path, content)?
        .persist(path)
        .map_err(|e| e.error)?;
    Ok(())
}

/// Applies composed text to the system hosts file
#[derive(Debug, Clone)]
pub struct SystemHostsWriter {
    path: PathBuf,
}

impl SystemHostsWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn from_settings(settings: &HostsSettings) -> Self {
        Self::new(settings.path.clone().unwrap_or_else(default_hosts_path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the hosts file with `text`
    pub fn apply(&self, text: &str) -> Result<()> {
        write_atomic(&self.path, text.as_bytes()).map_err(|e| map_write_error(&self.path, e))?;
        log::info!("Wrote {} bytes to {}", text.len(), self.path.display());
        Ok(())
    }

    /// Write operator-supplied text directly, bypassing composition
    pub fn save_manual(&self, text: &str) -> Result<()> {
        self.apply(text)?;
        log::warn!(
            "Manual edit saved to {}; the next profile change will overwrite it",
            self.path.display()
        );
        Ok(())
    }

    /// Read the current hosts content without modifying anything
    pub fn read_effective(&self) -> Result<String> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `apply` could replace the hosts file
    ///
    /// Replacing needs a new file in the hosts directory, so that is what is
    /// tested; the hosts file itself is never opened. The temp file is removed
    /// on drop.
    pub fn check_write_permission(&self) -> bool {
        if self.path.is_dir() {
            return false;
        }
        temp_file_beside(&self.path).is_ok()
    }
}

fn map_write_error(path: &Path, err: io::Error) -> HostlyError {
    if err.kind() == io::ErrorKind::PermissionDenied {
        HostlyError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        HostlyError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hosts");
        fs::write(&path, "127.0.0.1 old\n").unwrap();

        let writer = SystemHostsWriter::new(path.clone());
        writer.apply("127.0.0.1 new\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "127.0.0.1 new\n");
        assert_eq!(writer.read_effective().unwrap(), "127.0.0.1 new\n");
    }

    #[test]
    fn test_apply_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let writer = SystemHostsWriter::new(tmp.path().join("hosts"));
        writer.apply("a").unwrap();
        writer.apply("b").unwrap();

        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["hosts".to_string()]);
    }

    #[test]
    fn test_failed_apply_keeps_previous_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hosts");
        fs::write(&path, "keep me").unwrap();

        // Target is a directory entry below a regular file: the temp file cannot be created.
        let writer = SystemHostsWriter::new(path.join("nested"));
        assert!(writer.apply("lost").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn test_read_missing_is_empty() {
        let tmp = TempDir::new().unwrap();
        let writer = SystemHostsWriter::new(tmp.path().join("absent"));
        assert_eq!(writer.read_effective().unwrap(), "");
    }

    #[test]
    fn test_permission_error_mapping() {
        let path = Path::new("/etc/hosts");
        let err = map_write_error(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, HostlyError::PermissionDenied { .. }));

        let err = map_write_error(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, HostlyError::Io(_)));
    }

    #[test]
    fn test_check_write_permission() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hosts");
        fs::write(&path, "x").unwrap();
        assert!(SystemHostsWriter::new(path.clone()).check_write_permission());
        assert_eq!(fs::read_to_string(&path).unwrap(), "x");
        let names: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(names.len(), 1);

        let missing = SystemHostsWriter::new(tmp.path().join("missing/hosts"));
        assert!(!missing.check_write_permission());

        let dir = tmp.path().join("etc");
        fs::create_dir(&dir).unwrap();
        assert!(!SystemHostsWriter::new(dir).check_write_permission());
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_check_agrees_with_apply() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("etc");
        fs::create_dir(&dir).unwrap();
        let path = dir.join("hosts");
        fs::write(&path, "x").unwrap();
        // A writable file in a read-only directory still cannot be replaced
        fs::set_permissions(&path, fs::Permissions::from_mode(0o666)).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();

        let writer = SystemHostsWriter::new(path);
        let allowed = writer.check_write_permission();
        let applied = writer.apply("y").is_ok();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        // Root bypasses directory modes, so only agreement is asserted
        assert_eq!(allowed, applied);
    }
}
