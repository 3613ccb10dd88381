//! Artifact file operations: atomic persist and quarantine

use crate::AcquireError;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write a raw artifact atomically
pub async fn persist_atomic(path: &Path, bytes: &[u8]) -> Result<(), AcquireError> {
    quarry_extractor::write_atomic(path, bytes)
        .await
        .map_err(|e| AcquireError::Storage(format!("{}: {}", path.display(), e)))
}

/// Move a file into `dir`, never overwriting; returns the new path
///
/// A name collision gets a numeric suffix: `a.pdf`, `a.1.pdf`, `a.2.pdf`.
pub fn quarantine(path: &Path, dir: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut target = dir.join(file_name);
    let mut n = 1u32;
    while target.exists() {
        let name = match &ext {
            Some(ext) => format!("{}.{}.{}", stem, n, ext),
            None => format!("{}.{}", stem, n),
        };
        target = dir.join(name);
        n += 1;
    }

    if std::fs::rename(path, &target).is_err() {
        // different filesystem
        std::fs::copy(path, &target)?;
        std::fs::remove_file(path)?;
    }

    info!(from = %path.display(), to = %target.display(), "quarantined artifact");
    Ok(target)
}

/// [`quarantine`] on the blocking thread pool
pub async fn quarantine_off_thread(path: &Path, dir: &Path) -> io::Result<PathBuf> {
    let (path, dir) = (path.to_path_buf(), dir.to_path_buf());
    tokio::task::spawn_blocking(move || quarantine(&path, &dir))
        .await
        .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persist_atomic_leaves_no_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("papers").join("a.pdf");
        persist_atomic(&path, b"data").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        assert!(!dir.path().join("papers").join("a.pdf.part").exists());
    }

    #[test]
    fn test_quarantine_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let qdir = dir.path().join("invalid_pdfs");
        let src = dir.path().join("a.pdf");

        std::fs::write(&src, b"one").unwrap();
        let first = quarantine(&src, &qdir).unwrap();
        assert!(!src.exists());
        assert_eq!(first, qdir.join("a.pdf"));

        std::fs::write(&src, b"two").unwrap();
        let second = quarantine(&src, &qdir).unwrap();
        assert_eq!(second, qdir.join("a.1.pdf"));
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_quarantine_off_thread_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("b.pdf");
        std::fs::write(&src, b"junk").unwrap();

        let moved = quarantine_off_thread(&src, &dir.path().join("q")).await.unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(moved).unwrap(), b"junk");
    }
}
