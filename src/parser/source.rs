//! Archive source abstraction for reading archives from the filesystem or memory.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

/// File extensions recognized as archives when scanning a directory.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["bin", "xml", "plist"];

/// Trait for abstracting where archive bytes come from.
pub trait ArchiveSource {
    /// Read the archive at the given logical path.
    fn read_bytes(&mut self, path: &Utf8Path) -> Result<Vec<u8>>;
    /// List archive files below a directory, sorted by path.
    fn list_archives(&mut self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>>;
}

/// Returns `true` if the path carries one of the [`ARCHIVE_EXTENSIONS`].
pub fn is_archive_path(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| ARCHIVE_EXTENSIONS.contains(&ext))
}

/// Reads archives directly from the local filesystem.
pub struct FsSource;

impl ArchiveSource for FsSource {
    fn read_bytes(&mut self, path: &Utf8Path) -> Result<Vec<u8>> {
        std::fs::read(path.as_std_path()).with_context(|| format!("Failed to read {}", path))
    }

    fn list_archives(&mut self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir.as_std_path()) {
            let entry = entry.with_context(|| format!("Walk {}", dir))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let p = Utf8PathBuf::from_path_buf(entry.into_path())
                .map_err(|p| anyhow::anyhow!("Non-UTF8 path {}", p.display()))?;
            if is_archive_path(&p) {
                files.push(p);
            }
        }
        files.sort();
        Ok(files)
    }
}
