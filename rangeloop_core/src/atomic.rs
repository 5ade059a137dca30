//! Crash-safe file replacement for exported reports (device settings dumps).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Write `bytes` next to `path`, fsync, then rename over `path`.
/// Readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let staging = staging_path(path);
    let result = (|| {
        let mut f = fs::File::create(&staging)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&staging, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_file_sits_beside_target() {
        assert_eq!(
            staging_path(Path::new("/tmp/out/settings.json")),
            PathBuf::from("/tmp/out/settings.json.partial")
        );
    }

    #[test]
    fn replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("settings.txt");
        write_atomic(&target, b"old").unwrap();
        write_atomic(&target, b"new").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn missing_directory_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("absent").join("settings.txt");
        assert!(write_atomic(&target, b"x").is_err());
        assert!(!staging_path(&target).exists());
    }
}
