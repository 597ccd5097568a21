//! Artifact Store: persists files tools produce, under a run-scoped
//! directory, with collision-safe naming.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::protocol::{Artifact, RunId};

/// Filesystem-backed artifact store. Each run gets its own subdirectory
/// under `base_dir`.
#[derive(Clone)]
pub struct ArtifactStore {
    base_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// Writes `bytes` under the run's directory as `file_name`, resolving
    /// a name collision by suffixing the content hash rather than
    /// overwriting or failing.
    pub fn save(
        &self,
        run_id: RunId,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<Artifact> {
        let run_dir = self.base_dir.join(run_id.to_string());
        std::fs::create_dir_all(&run_dir)
            .with_context(|| format!("creating artifact dir {}", run_dir.display()))?;

        let path = self.resolve_collision(&run_dir, file_name, bytes);
        std::fs::write(&path, bytes)
            .with_context(|| format!("writing artifact {}", path.display()))?;

        Ok(Artifact {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_name.to_string()),
            path: path.to_string_lossy().into_owned(),
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
        })
    }

    /// If `run_dir/file_name` already exists, appends an 8-hex-char prefix
    /// of the sha256 of `bytes` before the extension. A further collision
    /// (same name, same hash prefix, different content) is astronomically
    /// unlikely and is left to overwrite.
    fn resolve_collision(&self, run_dir: &Path, file_name: &str, bytes: &[u8]) -> PathBuf {
        let candidate = run_dir.join(file_name);
        if !candidate.exists() {
            return candidate;
        }

        let hash = Sha256::digest(bytes);
        let prefix = hex_prefix(&hash, 8);

        let path = Path::new(file_name);
        let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        let ext = path.extension().map(|e| e.to_string_lossy());

        let renamed = match ext {
            Some(ext) => format!("{stem}-{prefix}.{ext}"),
            None => format!("{stem}-{prefix}"),
        };
        run_dir.join(renamed)
    }

    /// Reads an artifact back and formats it as a `data:` URI, for tools
    /// or CLI output that wants to preview small images inline. Callers
    /// are expected to only do this for artifacts below a reasonable size.
    pub fn preview_data_uri(&self, artifact: &Artifact) -> Result<String> {
        let bytes = std::fs::read(&artifact.path)
            .with_context(|| format!("reading artifact {}", artifact.path))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(format!("data:{};base64,{}", artifact.mime_type, encoded))
    }
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    bytes.iter().take(len / 2).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::new_run_id;

    #[test]
    fn saves_and_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let run_id = new_run_id();

        let artifact = store.save(run_id, "out.txt", "text/plain", b"hello").unwrap();
        assert_eq!(artifact.size, 5);
        assert!(Path::new(&artifact.path).exists());
    }

    #[test]
    fn colliding_file_name_gets_a_hash_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let run_id = new_run_id();

        let first = store.save(run_id, "out.txt", "text/plain", b"one").unwrap();
        let second = store.save(run_id, "out.txt", "text/plain", b"two").unwrap();

        assert_ne!(first.path, second.path);
        assert!(second.file_name.starts_with("out-"));
    }

    #[test]
    fn preview_data_uri_round_trips_base64() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let run_id = new_run_id();

        let artifact = store.save(run_id, "pixel.png", "image/png", &[0, 1, 2, 3]).unwrap();
        let uri = store.preview_data_uri(&artifact).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
    }
}
