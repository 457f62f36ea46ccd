//! Archive download and extraction.

use crate::error::{DecimerError, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;

/// Retrieves the pretrained weight archive.
pub trait ArchiveFetcher {
    /// Store the archive found at `url` in the file `dest`.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

impl<F: ArchiveFetcher + ?Sized> ArchiveFetcher for Box<F> {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        (**self).fetch(url, dest)
    }
}

/// Connect timeout of [`HttpFetcher::new`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking HTTP(S) download.
///
/// Only connecting is bounded in time. The archive is large, so reading the
/// body may take as long as it needs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    connect_timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default connect timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up connecting after `timeout`.
    pub fn with_connect_timeout(timeout: Duration) -> Self {
        Self {
            connect_timeout: timeout,
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let unavailable = |e: reqwest::Error| DecimerError::AssetUnavailable(format!("{}: {}", url, e));

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(None::<Duration>)
            .build()
            .map_err(unavailable)?;
        let mut response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(unavailable)?;

        let mut file = File::create(dest).map_err(|e| io_unavailable(dest, e))?;
        let bytes = response.copy_to(&mut file).map_err(unavailable)?;
        tracing::info!(url, bytes, "downloaded weight archive");
        Ok(())
    }
}

fn io_unavailable(path: &Path, e: io::Error) -> DecimerError {
    DecimerError::AssetUnavailable(format!("{}: {}", path.display(), e))
}

/// Unpack a zip archive into `dest`.
///
/// Entries whose names would land outside `dest` are skipped. Every failure,
/// including I/O, is reported as [`DecimerError::AssetUnavailable`]; files
/// written before the failure are left in place.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize> {
    let malformed =
        |e: zip::result::ZipError| DecimerError::AssetUnavailable(format!("{}: {}", archive.display(), e));

    let file = File::open(archive).map_err(|e| io_unavailable(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(malformed)?;
    fs::create_dir_all(dest).map_err(|e| io_unavailable(dest, e))?;

    let mut extracted = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(malformed)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "skipping archive entry outside destination");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| io_unavailable(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_unavailable(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| io_unavailable(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| io_unavailable(&target, e))?;
        extracted += 1;
    }

    tracing::debug!(archive = %archive.display(), files = extracted, "extracted archive");
    Ok(extracted)
}

/// Move every top-level entry of `staging` into `root`.
///
/// Entries already present in `root` are kept and the staged copy dropped.
pub(crate) fn install_staged(staging: &Path, root: &Path) -> Result<usize> {
    let mut installed = 0;
    for entry in fs::read_dir(staging).map_err(|e| io_unavailable(staging, e))? {
        let entry = entry.map_err(|e| io_unavailable(staging, e))?;
        let target = root.join(entry.file_name());
        if target.exists() {
            tracing::debug!(path = %target.display(), "keeping existing asset");
            continue;
        }
        fs::rename(entry.path(), &target).map_err(|e| io_unavailable(&target, e))?;
        installed += 1;
    }
    Ok(installed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Write a zip holding `files` (path, contents) at `path`.
    pub(crate) fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, contents) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("models.zip");
        write_zip(
            &archive,
            &[
                ("Canonical/config.json", b"{}"),
                ("Isomeric/config.json", b"{}"),
            ],
        );

        let dest = dir.path().join("Trained_Models");
        assert_eq!(extract_archive(&archive, &dest).unwrap(), 2);
        assert!(dest.join("Canonical/config.json").is_file());
        assert!(dest.join("Isomeric/config.json").is_file());
    }

    #[test]
    fn skips_escaping_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", b"x"), ("ok.txt", b"y")]);

        let dest = dir.path().join("out");
        assert_eq!(extract_archive(&archive, &dest).unwrap(), 1);
        assert!(!dir.path().join("escape.txt").exists());
        assert!(dest.join("ok.txt").is_file());
    }

    #[test]
    fn malformed_archive_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, DecimerError::AssetUnavailable(_)));
    }

    #[test]
    fn write_failure_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("clash.zip");
        write_zip(
            &archive,
            &[("Canonical/blocker", b"x"), ("Canonical/blocker/model.safetensors", b"y")],
        );

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, DecimerError::AssetUnavailable(_)));
    }

    #[test]
    fn install_keeps_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let root = dir.path().join("root");
        fs::create_dir_all(staging.join("Canonical")).unwrap();
        fs::create_dir_all(staging.join("Isomeric")).unwrap();
        fs::write(staging.join("Isomeric/config.json"), b"new").unwrap();
        fs::create_dir_all(root.join("Isomeric")).unwrap();
        fs::write(root.join("Isomeric/config.json"), b"old").unwrap();

        assert_eq!(install_staged(&staging, &root).unwrap(), 1);
        assert!(root.join("Canonical").is_dir());
        assert_eq!(fs::read(root.join("Isomeric/config.json")).unwrap(), b"old");
    }

    #[test]
    fn default_fetcher_only_bounds_connecting() {
        assert_eq!(HttpFetcher::new().connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        let fetcher = HttpFetcher::with_connect_timeout(Duration::from_secs(5));
        assert_eq!(fetcher.connect_timeout, Duration::from_secs(5));
    }
}
