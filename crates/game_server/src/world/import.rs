//! One-shot migration of legacy per-dimension world data.
//!
//! Older layouts stored secondary dimensions inside the primary world folder
//! (`world/DIM-1`, `world/DIM1`). The current layout gives each dimension its
//! own folder (`world_nether`, `world_the_end`). Importing copies the legacy
//! tree once; after that the destination exists and the import is a no-op.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of [`import_if_needed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Nothing to do: no legacy data, or the destination already exists.
    Skipped,
    /// Legacy data was copied. `failed` lists entries that could not be copied.
    Imported { copied: usize, failed: Vec<PathBuf> },
}

impl ImportOutcome {
    pub fn is_imported(&self) -> bool {
        matches!(self, ImportOutcome::Imported { .. })
    }
}

/// Copies `container/base/DIM<dimension_id>` to `container/<base><suffix>`
/// when the legacy folder exists and the destination does not.
///
/// Per-file failures are logged and collected; the walk always continues.
pub fn import_if_needed(
    container: &Path,
    base: &str,
    suffix: &str,
    dimension_id: i32,
) -> ImportOutcome {
    let source = container.join(base).join(format!("DIM{dimension_id}"));
    let destination = container.join(format!("{base}{suffix}"));

    if !source.is_dir() || destination.exists() {
        return ImportOutcome::Skipped;
    }

    info!(
        source = %source.display(),
        destination = %destination.display(),
        "Importing legacy dimension data"
    );

    let mut walk = TreeCopy::default();
    walk.copy_dir(&source, &destination);
    walk.copy_file(
        &container.join(base).join("level.dat"),
        &destination.join("level.dat"),
    );

    if walk.failed.is_empty() {
        info!(copied = walk.copied, "Import of {base}{suffix} complete");
    } else {
        warn!(
            copied = walk.copied,
            failed = walk.failed.len(),
            "Import of {base}{suffix} finished with errors"
        );
    }

    ImportOutcome::Imported {
        copied: walk.copied,
        failed: walk.failed,
    }
}

#[derive(Default)]
struct TreeCopy {
    copied: usize,
    failed: Vec<PathBuf>,
}

impl TreeCopy {
    fn copy_dir(&mut self, from: &Path, to: &Path) {
        if let Err(e) = fs::create_dir_all(to) {
            self.fail(from, e);
            return;
        }
        copy_metadata(from, to);

        let entries = match fs::read_dir(from) {
            Ok(entries) => entries,
            Err(e) => {
                self.fail(from, e);
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.fail(from, e);
                    continue;
                }
            };
            let path = entry.path();
            let target = to.join(entry.file_name());
            match entry.file_type() {
                Ok(kind) if kind.is_dir() => self.copy_dir(&path, &target),
                Ok(_) => self.copy_file(&path, &target),
                Err(e) => self.fail(&path, e),
            }
        }
    }

    fn copy_file(&mut self, from: &Path, to: &Path) {
        match fs::copy(from, to) {
            Ok(_) => {
                // fs::copy already carries permissions over
                if let Ok(meta) = fs::metadata(from) {
                    if let Ok(modified) = meta.modified() {
                        set_modified(to, modified);
                    }
                }
                self.copied += 1;
            }
            Err(e) => self.fail(from, e),
        }
    }

    fn fail(&mut self, path: &Path, error: io::Error) {
        warn!(path = %path.display(), "Import failed to copy entry: {error}");
        self.failed.push(path.to_path_buf());
    }
}

fn copy_metadata(from: &Path, to: &Path) {
    if let Ok(meta) = fs::metadata(from) {
        let _ = fs::set_permissions(to, meta.permissions());
        if let Ok(modified) = meta.modified() {
            set_modified(to, modified);
        }
    }
}

fn set_modified(path: &Path, modified: std::time::SystemTime) {
    if let Ok(file) = fs::File::options().write(true).open(path) {
        let _ = file.set_modified(modified);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn legacy_layout() -> TempDir {
        let dir = TempDir::new().unwrap();
        let dim = dir.path().join("world").join("DIM-1");
        fs::create_dir_all(dim.join("region")).unwrap();
        fs::write(dim.join("region").join("r.0.0.mca"), b"region").unwrap();
        fs::write(dim.join("data.dat"), b"data").unwrap();
        fs::write(dir.path().join("world").join("level.dat"), b"level").unwrap();
        dir
    }

    #[test]
    fn test_imports_legacy_tree_and_level_dat() {
        let dir = legacy_layout();
        let outcome = import_if_needed(dir.path(), "world", "_nether", -1);

        assert_eq!(
            outcome,
            ImportOutcome::Imported {
                copied: 3,
                failed: vec![]
            }
        );
        let dest = dir.path().join("world_nether");
        assert_eq!(fs::read(dest.join("region").join("r.0.0.mca")).unwrap(), b"region");
        assert_eq!(fs::read(dest.join("data.dat")).unwrap(), b"data");
        assert_eq!(fs::read(dest.join("level.dat")).unwrap(), b"level");
    }

    #[test]
    fn test_second_import_is_noop() {
        let dir = legacy_layout();
        assert!(import_if_needed(dir.path(), "world", "_nether", -1).is_imported());

        fs::write(dir.path().join("world_nether").join("data.dat"), b"modified").unwrap();
        assert_eq!(
            import_if_needed(dir.path(), "world", "_nether", -1),
            ImportOutcome::Skipped
        );
        assert_eq!(
            fs::read(dir.path().join("world_nether").join("data.dat")).unwrap(),
            b"modified"
        );
    }

    #[test]
    fn test_missing_source_is_noop() {
        let dir = legacy_layout();
        assert_eq!(
            import_if_needed(dir.path(), "world", "_the_end", 1),
            ImportOutcome::Skipped
        );
        assert!(!dir.path().join("world_the_end").exists());
    }

    #[test]
    fn test_missing_level_dat_is_collected() {
        let dir = legacy_layout();
        fs::remove_file(dir.path().join("world").join("level.dat")).unwrap();

        match import_if_needed(dir.path(), "world", "_nether", -1) {
            ImportOutcome::Imported { copied, failed } => {
                assert_eq!(copied, 2);
                assert_eq!(failed, vec![dir.path().join("world").join("level.dat")]);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_preserves_modification_time() {
        let dir = legacy_layout();
        let source = dir.path().join("world").join("DIM-1").join("data.dat");
        let stamp = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(stamp)
            .unwrap();

        import_if_needed(dir.path(), "world", "_nether", -1);
        let copied = fs::metadata(dir.path().join("world_nether").join("data.dat")).unwrap();
        assert_eq!(copied.modified().unwrap(), stamp);
    }
}
