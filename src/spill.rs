//! Scratch space for spill files.

use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log;
use tempfile;

/// Scratch directory holding spill files of a single sorter.
/// Files are named `tempfile<N>.<ext>` where `N` is a counter owned by the directory.
pub struct SpillDir {
    dir: tempfile::TempDir,
    next_id: Cell<u64>,
}

impl SpillDir {
    /// Creates a scratch directory inside `tmp_path` or inside the default OS temporary directory.
    pub fn new(tmp_path: Option<&Path>) -> io::Result<Self> {
        let dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }?;

        log::info!("using {} as a temporary directory", dir.path().display());

        return Ok(SpillDir {
            dir,
            next_id: Cell::new(0),
        });
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Allocates a new unique file path.
    pub fn next_path(&self, extension: &str) -> PathBuf {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        self.dir.path().join(format!("tempfile{}.{}", id, extension))
    }
}

/// Spill file handle. The handle owns the file: it is removed once the handle is dropped.
#[derive(Debug)]
pub struct SpillFile {
    path: PathBuf,
    len: u64,
}

impl SpillFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        SpillFile { path, len: 0 }
    }

    pub(crate) fn set_len(&mut self, len: u64) {
        self.len = len;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file size in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for SpillFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                log::warn!("spill file {} not removed: {}", self.path.display(), err);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::*;

    use super::{SpillDir, SpillFile};

    #[fixture]
    fn spill_dir() -> SpillDir {
        SpillDir::new(None).unwrap()
    }

    #[rstest]
    fn test_unique_paths(spill_dir: SpillDir) {
        let first = spill_dir.next_path("txt");
        let second = spill_dir.next_path("txt");

        assert_ne!(first, second);
        assert!(first.starts_with(spill_dir.path()));
        assert_eq!(first.file_name().unwrap(), "tempfile0.txt");
        assert_eq!(second.file_name().unwrap(), "tempfile1.txt");
    }

    #[rstest]
    fn test_counters_are_independent(spill_dir: SpillDir) {
        let other = SpillDir::new(None).unwrap();
        spill_dir.next_path("txt");

        assert_eq!(other.next_path("txt").file_name().unwrap(), "tempfile0.txt");
    }

    #[rstest]
    fn test_file_removed_on_drop(spill_dir: SpillDir) {
        let path = spill_dir.next_path("txt");
        fs::write(&path, b"a b\n").unwrap();

        let file = SpillFile::new(path.clone());
        assert!(path.exists());

        drop(file);
        assert!(!path.exists());
    }
}
