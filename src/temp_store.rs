//! Transient run-file naming, atomic publication, and cleanup
//!
//! Every pipeline run owns one `TempStore`: a unique directory under the
//! configured temp location. Run files are named from a process-wide
//! atomic counter with a kind-tagged extension, so no two live files ever
//! collide even across concurrent stores. Dropping the store removes the
//! directory and everything left in it; `persist` disarms that for
//! cancelled runs and for retained output.

use crate::error::{IoContext, SortResult};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;

/// Process-wide run-file counter (spans all stores in this process)
static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(0);

pub const UNSORTED_EXT: &str = "unsorted";
pub const SORTED_EXT: &str = "sorted";
pub const MERGED_EXT: &str = "merged";

/// Owner of the per-run temp directory
pub struct TempStore {
    path: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

impl TempStore {
    /// Create the store under `parent`, or the system temp dir when unset.
    /// The parent is created if absent.
    pub fn create(parent: Option<&Path>) -> SortResult<Self> {
        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent).temp_context(parent)?;
                tempfile::Builder::new()
                    .prefix("extsort-")
                    .tempdir_in(parent)
                    .temp_context(parent)?
            }
            None => tempfile::Builder::new()
                .prefix("extsort-")
                .tempdir()
                .temp_context(&std::env::temp_dir())?,
        };

        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Mutex::new(Some(dir)),
        })
    }

    /// Directory all run files live under
    pub fn dir(&self) -> &Path {
        &self.path
    }

    fn next_path(&self, ext: &str) -> PathBuf {
        let id = NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed);
        self.path.join(format!("run-{id:06}.{ext}"))
    }

    /// Fresh path for an unsorted chunk cut by the splitter
    pub fn new_unsorted_path(&self) -> PathBuf {
        self.next_path(UNSORTED_EXT)
    }

    /// Fresh path for a sorted counterpart of a chunk
    pub fn new_sorted_path(&self) -> PathBuf {
        self.next_path(SORTED_EXT)
    }

    /// Fresh path for a merge output
    pub fn new_merge_path(&self) -> PathBuf {
        self.next_path(MERGED_EXT)
    }

    /// Atomically move `src` to `dst`. Falls back to copy + delete when the
    /// rename crosses filesystems. With `overwrite` unset an existing
    /// destination is an error.
    pub fn move_atomic(&self, src: &Path, dst: &Path, overwrite: bool) -> io::Result<()> {
        if !overwrite && dst.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", dst.display()),
            ));
        }
        match fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(_) => {
                fs::copy(src, dst)?;
                fs::remove_file(src)?;
                Ok(())
            }
        }
    }

    /// Delete a run file, ignoring absence and races with other deleters
    pub fn delete_best_effort(&self, path: &Path) {
        let _ = fs::remove_file(path);
    }

    /// Disarm drop-time cleanup and leave the directory on disk. Returns
    /// the retained path. Safe to call more than once.
    pub fn persist(&self) -> PathBuf {
        if let Some(dir) = self.dir.lock().take() {
            let _ = dir.into_path();
        }
        self.path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_are_unique_and_tagged() {
        let store = TempStore::create(None).expect("store");

        let a = store.new_unsorted_path();
        let b = store.new_unsorted_path();
        let c = store.new_sorted_path();
        let d = store.new_merge_path();

        assert_ne!(a, b);
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("unsorted"));
        assert_eq!(c.extension().and_then(|e| e.to_str()), Some("sorted"));
        assert_eq!(d.extension().and_then(|e| e.to_str()), Some("merged"));
        assert!(a.starts_with(store.dir()));
    }

    #[test]
    fn test_drop_removes_directory() {
        let store = TempStore::create(None).expect("store");
        let dir = store.dir().to_path_buf();
        fs::write(store.new_unsorted_path(), b"leftover\n").expect("write");

        assert!(dir.exists());
        drop(store);
        assert!(!dir.exists());
    }

    #[test]
    fn test_persist_keeps_directory() {
        let store = TempStore::create(None).expect("store");
        let kept = store.persist();
        let probe = store.new_sorted_path();
        fs::write(&probe, b"data\n").expect("write");

        drop(store);
        assert!(kept.exists());
        assert!(probe.exists());

        fs::remove_dir_all(&kept).expect("cleanup");
    }

    #[test]
    fn test_create_under_configured_parent() {
        let parent = TempDir::new().expect("parent");
        let nested = parent.path().join("spill").join("area");

        let store = TempStore::create(Some(&nested)).expect("store");
        assert!(store.dir().starts_with(&nested));
    }

    #[test]
    fn test_move_atomic_respects_overwrite_flag() {
        let dir = TempDir::new().expect("tempdir");
        let store = TempStore::create(None).expect("store");

        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        fs::write(&src, b"payload").expect("write");
        fs::write(&dst, b"occupied").expect("write");

        assert!(store.move_atomic(&src, &dst, false).is_err());
        assert!(src.exists());

        store.move_atomic(&src, &dst, true).expect("move");
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).expect("read"), b"payload");
    }
}
