//! File wrapper around the block codec
//!
//! Reads go straight to disk. Writes land in a temporary file beside the
//! artifact and are renamed over it only once fully written and synced.

use rand::Rng;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::block::{parse, ConfigBlock, Markers};
use super::mutate::{mutate, Mutation};
use crate::error::CodecError;

/// The tuning artifact on disk
#[derive(Debug, Clone)]
pub struct Artifact {
    path: PathBuf,
    markers: Markers,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, markers: Markers) -> Self {
        Self {
            path: path.into(),
            markers,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn read_text(&self) -> Result<String, CodecError> {
        std::fs::read_to_string(&self.path).map_err(|source| CodecError::Read {
            path: self.path.clone(),
            source,
        })
    }

    /// Parse the block currently on disk
    pub fn load(&self) -> Result<ConfigBlock, CodecError> {
        let text = self.read_text()?;
        Ok(parse(&text, &self.markers))
    }

    /// Rewrite the block with perturbed values. On any error the artifact is
    /// left exactly as it was.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        mutation_probability: f64,
        rng: &mut R,
    ) -> Result<Mutation, CodecError> {
        let text = self.read_text()?;
        let mutation = mutate(&text, &self.markers, mutation_probability, rng)?;
        self.write_atomic(&mutation.text)?;
        info!(
            "Rewrote {:?}: {} -> {}",
            self.path, mutation.previous, mutation.block
        );
        Ok(mutation)
    }

    /// Replace the artifact contents via temp file + rename
    pub fn write_atomic(&self, contents: &str) -> Result<(), CodecError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let write_err = |source: std::io::Error| CodecError::Write {
            path: self.path.clone(),
            source,
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".reforge-artifact")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(write_err)?;

        tmp.write_all(contents.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;

        if let Ok(meta) = std::fs::metadata(&self.path) {
            std::fs::set_permissions(tmp.path(), meta.permissions()).map_err(write_err)?;
        }

        // A failed persist hands the temp file back; dropping it removes it.
        tmp.persist(&self.path).map_err(|err| CodecError::Rename {
            path: self.path.clone(),
            source: err.error,
        })?;

        debug!("Artifact {:?} replaced ({} bytes)", self.path, contents.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    const ARTIFACT: &str = "\
header
# BEGIN CONFIG
LEARNING_RATE=0.050000
MUTATION_PROB=0.500000
RECOMPILE_INTERVAL=10
# END CONFIG
footer
";

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_load_reads_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tuning.cfg");
        std::fs::write(&path, ARTIFACT).unwrap();

        let artifact = Artifact::new(&path, Markers::default());
        assert_eq!(artifact.load().unwrap(), ConfigBlock::default());
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let artifact = Artifact::new(dir.path().join("absent.cfg"), Markers::default());
        assert!(matches!(artifact.load(), Err(CodecError::Read { .. })));
    }

    #[test]
    fn test_mutate_rewrites_file_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tuning.cfg");
        std::fs::write(&path, ARTIFACT).unwrap();

        let artifact = Artifact::new(&path, Markers::default());
        let mut rng = StdRng::seed_from_u64(21);
        let mutation = artifact.mutate(1.0, &mut rng).unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, mutation.text);
        assert!(on_disk.starts_with("header\n# BEGIN CONFIG\n"));
        assert!(on_disk.ends_with("# END CONFIG\nfooter\n"));
        assert_eq!(artifact.load().unwrap(), mutation.block);
        assert_eq!(dir_entries(dir.path()), vec!["tuning.cfg".to_string()]);
    }

    #[test]
    fn test_failed_mutation_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tuning.cfg");
        let original = "no markers in here\nLEARNING_RATE=0.2\n";
        std::fs::write(&path, original).unwrap();

        let artifact = Artifact::new(&path, Markers::default());
        let mut rng = StdRng::seed_from_u64(0);
        let err = artifact.mutate(0.5, &mut rng).unwrap_err();

        assert!(matches!(err, CodecError::MissingBeginMarker { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
        assert_eq!(dir_entries(dir.path()), vec!["tuning.cfg".to_string()]);
    }

    #[test]
    fn test_rename_failure_removes_temp_file() {
        let dir = tempdir().unwrap();
        // The target is a non-empty directory, so the rename cannot succeed
        let target = dir.path().join("tuning.cfg");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("occupied"), "x").unwrap();

        let artifact = Artifact::new(&target, Markers::default());
        let err = artifact.write_atomic(ARTIFACT).unwrap_err();

        assert!(matches!(err, CodecError::Rename { .. }));
        assert_eq!(dir_entries(dir.path()), vec!["tuning.cfg".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("tuning.cfg");
        std::fs::write(&path, ARTIFACT).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        Artifact::new(&path, Markers::default()).write_atomic(ARTIFACT).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
