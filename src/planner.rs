//! Resume planning: compare what is on disk with a remote entry and decide
//! whether to skip it, continue it or download it from scratch.
//!
//! Disk state is the only input. Nothing is persisted between runs, so an
//! interrupted run is picked up by simply planning again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::catalog::InventoryEntry;
use crate::error::{Result, TransferError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Local file is already at least as large as the remote one.
    Skip,
    /// Append to the existing partial file from `offset`.
    Resume { offset: u64 },
    /// Download from byte 0 into a new (or empty) file.
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub mode: PlanMode,
    pub target: PathBuf,
}

impl TransferPlan {
    /// Byte offset to request from the peer.
    pub fn offset(&self) -> u64 {
        match self.mode {
            PlanMode::Resume { offset } => offset,
            PlanMode::Skip | PlanMode::Fresh => 0,
        }
    }

    pub fn needs_transfer(&self) -> bool {
        self.mode != PlanMode::Skip
    }
}

/// Decide how to fetch `entry` into `dest_dir`.
///
/// The candidate path is `dest_dir/entry.name` as-is: the name is not
/// sanitized, so a name holding path separators lands outside `dest_dir`.
///
/// Anything at the candidate path that is not a regular file (a directory,
/// say) is treated as a collision.
pub fn plan(entry: &InventoryEntry, dest_dir: &Path, resume: bool) -> Result<TransferPlan> {
    if matches!(entry.name.trim(), "" | "." | "..") {
        return Err(TransferError::protocol(format!(
            "entry {} has no usable file name ({:?})",
            entry.index, entry.name
        )));
    }
    let candidate = dest_dir.join(&entry.name);
    let local = match fs::metadata(&candidate) {
        Ok(md) if md.is_file() => Local::File(md.len()),
        Ok(_) => Local::Other,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Local::Missing,
        Err(e) => return Err(e.into()),
    };
    let (mode, target) = match local {
        Local::Missing => (PlanMode::Fresh, candidate),
        Local::Other => (PlanMode::Fresh, unique_path(&candidate)),
        Local::File(len) if len >= entry.size => (PlanMode::Skip, candidate),
        Local::File(len) if resume && len > 0 => (PlanMode::Resume { offset: len }, candidate),
        // Nothing to lose in an empty file
        Local::File(0) if resume => (PlanMode::Fresh, candidate),
        Local::File(_) => (PlanMode::Fresh, unique_path(&candidate)),
    };
    Ok(TransferPlan { mode, target })
}

enum Local {
    Missing,
    File(u64),
    Other,
}

/// First free `stem_N.ext` next to `path`, counting from 1.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter: u64 = 1;
    loop {
        let candidate = parent.join(format!("{stem}_{counter}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntryMeta, MediaKind};
    use tempfile::TempDir;

    fn entry(name: &str, size: u64) -> InventoryEntry {
        InventoryEntry {
            index: 0,
            name: name.to_string(),
            size,
            kind: MediaKind::Video,
            meta: EntryMeta::default(),
        }
    }

    fn write_len(path: &Path, len: usize) {
        fs::write(path, vec![7u8; len]).unwrap();
    }

    #[test]
    fn test_missing_file_is_fresh() {
        let dir = TempDir::new().unwrap();
        let p = plan(&entry("x.mp4", 1000), dir.path(), true).unwrap();
        assert_eq!(p.mode, PlanMode::Fresh);
        assert_eq!(p.target, dir.path().join("x.mp4"));
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_complete_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_len(&dir.path().join("x.mp4"), 1000);
        for resume in [true, false] {
            let p = plan(&entry("x.mp4", 1000), dir.path(), resume).unwrap();
            assert_eq!(p.mode, PlanMode::Skip);
            assert!(!p.needs_transfer());
        }
    }

    #[test]
    fn test_larger_local_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_len(&dir.path().join("x.mp4"), 1200);
        let p = plan(&entry("x.mp4", 1000), dir.path(), true).unwrap();
        assert_eq!(p.mode, PlanMode::Skip);
    }

    #[test]
    fn test_partial_file_resumes_at_its_length() {
        let dir = TempDir::new().unwrap();
        write_len(&dir.path().join("x.mp4"), 400);
        let p = plan(&entry("x.mp4", 1000), dir.path(), true).unwrap();
        assert_eq!(p.mode, PlanMode::Resume { offset: 400 });
        assert_eq!(p.target, dir.path().join("x.mp4"));
        assert_eq!(p.offset(), 400);
    }

    #[test]
    fn test_partial_without_resume_never_clobbers() {
        let dir = TempDir::new().unwrap();
        write_len(&dir.path().join("x.mp4"), 400);
        let p = plan(&entry("x.mp4", 1000), dir.path(), false).unwrap();
        assert_eq!(p.mode, PlanMode::Fresh);
        assert_eq!(p.target, dir.path().join("x_1.mp4"));
        // Partial left untouched
        assert_eq!(fs::metadata(dir.path().join("x.mp4")).unwrap().len(), 400);
    }

    #[test]
    fn test_empty_local_file_restarts_in_place_with_resume() {
        let dir = TempDir::new().unwrap();
        write_len(&dir.path().join("x.mp4"), 0);
        let p = plan(&entry("x.mp4", 1000), dir.path(), true).unwrap();
        assert_eq!(p.mode, PlanMode::Fresh);
        assert_eq!(p.target, dir.path().join("x.mp4"));
    }

    #[test]
    fn test_collision_counter_skips_taken_names() {
        let dir = TempDir::new().unwrap();
        write_len(&dir.path().join("a.jpg"), 3);
        write_len(&dir.path().join("a_1.jpg"), 3);
        let p = plan(&entry("a.jpg", 10), dir.path(), false).unwrap();
        assert_eq!(p.mode, PlanMode::Fresh);
        assert_eq!(p.target, dir.path().join("a_2.jpg"));
    }

    #[test]
    fn test_directory_in_the_way_is_a_collision() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("x.mp4")).unwrap();
        for resume in [true, false] {
            let p = plan(&entry("x.mp4", 1000), dir.path(), resume).unwrap();
            assert_eq!(p.mode, PlanMode::Fresh);
            assert_eq!(p.target, dir.path().join("x_1.mp4"));
        }
    }

    #[test]
    fn test_nameless_entry_is_refused() {
        let dir = TempDir::new().unwrap();
        for name in ["", ".", ".."] {
            assert!(matches!(
                plan(&entry(name, 10), dir.path(), true),
                Err(TransferError::Protocol(_))
            ));
        }
    }

    #[test]
    fn test_unique_path_without_extension() {
        let dir = TempDir::new().unwrap();
        write_len(&dir.path().join("README"), 1);
        assert_eq!(
            unique_path(&dir.path().join("README")),
            dir.path().join("README_1")
        );
        assert_eq!(
            unique_path(&dir.path().join("free.txt")),
            dir.path().join("free.txt")
        );
    }

    #[test]
    fn test_zero_size_remote_entry() {
        let dir = TempDir::new().unwrap();
        let p = plan(&entry("empty.jpg", 0), dir.path(), true).unwrap();
        assert_eq!(p.mode, PlanMode::Fresh);

        write_len(&dir.path().join("empty.jpg"), 0);
        let p = plan(&entry("empty.jpg", 0), dir.path(), true).unwrap();
        assert_eq!(p.mode, PlanMode::Skip);
    }
}
