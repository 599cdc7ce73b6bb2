//! Persisted artifacts: atomic writes, SHA-256 sidecars, manifests
//!
//! Every artifact is written to a temp file in the target directory and
//! renamed into place, with a `.sha256` sidecar written the same way.
//! Loading verifies the digest and refuses on mismatch, so a truncated
//! or hand-edited artifact never feeds the engine.

use crate::core::digest::{canonical_pretty, sha256_hex};
use crate::core::errors::ArtifactError;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Write bytes atomically: temp file in the same directory, then rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), ArtifactError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let tmp = dir.join(format!(
        ".{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string())
    ));
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Sidecar path for an artifact: `model.json` -> `model.json.sha256`.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".sha256");
    path.with_file_name(name)
}

/// Atomically write an artifact plus its `.sha256` sidecar. Returns the
/// content digest.
pub fn write_with_sidecar(path: &Path, content: &[u8]) -> Result<String, ArtifactError> {
    let digest = sha256_hex(content);
    atomic_write(path, content)?;
    atomic_write(&sidecar_path(path), format!("{digest}\n").as_bytes())?;
    Ok(digest)
}

/// Verify an artifact against its sidecar digest.
pub fn verify_sidecar(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    let content = fs::read(path)?;
    let expected = fs::read_to_string(sidecar_path(path))?;
    let expected = expected.trim();
    let actual = sha256_hex(&content);
    if actual != expected {
        return Err(ArtifactError::ShaMismatch {
            path: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(content)
}

/// `manifest.json` contents for an artifact directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub schema_version: String,
    pub created_at_utc: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    /// file name -> sha256 hex
    pub sha256: Map<String, Value>,
}

impl Manifest {
    pub fn new(schema_version: impl Into<String>, created_at_utc: impl Into<String>) -> Self {
        Self {
            schema_version: schema_version.into(),
            created_at_utc: created_at_utc.into(),
            row_count: 0,
            columns: Vec::new(),
            sha256: Map::new(),
        }
    }

    /// RFC3339 timestamp for `created_at_utc`, overridable for
    /// deterministic builds.
    pub fn now_utc() -> String {
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    pub fn record_file(&mut self, name: impl Into<String>, digest: impl Into<String>) {
        self.sha256.insert(name.into(), Value::String(digest.into()));
    }

    pub fn to_value(&self) -> Value {
        json!({
            "schema_version": self.schema_version,
            "created_at_utc": self.created_at_utc,
            "row_count": self.row_count,
            "columns": self.columns,
            "sha256": Value::Object(self.sha256.clone()),
        })
    }

    /// Write `manifest.json` into `dir` with canonical formatting.
    pub fn write(&self, dir: &Path) -> Result<(), ArtifactError> {
        let text = canonical_pretty(&self.to_value());
        atomic_write(&dir.join("manifest.json"), text.as_bytes())
    }

    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        let path = dir.join("manifest.json");
        let text = fs::read_to_string(&path)?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| ArtifactError::Malformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let malformed = |reason: &str| ArtifactError::Malformed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };
        Ok(Self {
            schema_version: value
                .get("schema_version")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("missing schema_version"))?
                .to_string(),
            created_at_utc: value
                .get("created_at_utc")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            row_count: value
                .get("row_count")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
            columns: value
                .get("columns")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            sha256: value
                .get("sha256")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        })
    }

    /// Verify a file in `dir` against the digest recorded here.
    pub fn verify_file(&self, dir: &Path, name: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = dir.join(name);
        let content = fs::read(&path)?;
        let expected = self
            .sha256
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ArtifactError::Malformed {
                path: path.display().to_string(),
                reason: format!("manifest has no sha256 for {name}"),
            })?;
        let actual = sha256_hex(&content);
        if actual != expected {
            return Err(ArtifactError::ShaMismatch {
                path: path.display().to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/file.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn test_sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.json");
        let digest = write_with_sidecar(&path, b"{\"a\":1}\n").unwrap();
        assert_eq!(digest.len(), 64);

        let content = verify_sidecar(&path).unwrap();
        assert_eq!(content, b"{\"a\":1}\n");
    }

    #[test]
    fn test_tampering_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.json");
        write_with_sidecar(&path, b"original").unwrap();
        fs::write(&path, b"tampered").unwrap();

        let err = verify_sidecar(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::ShaMismatch { .. }));
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::new("fill_outcomes_v1", "2024-01-01T00:00:00Z");
        manifest.row_count = 3;
        manifest.columns = vec!["row_id".into(), "symbol".into()];
        manifest.record_file("data.arrow", "ab".repeat(32));
        manifest.write(dir.path()).unwrap();

        let loaded = Manifest::load(dir.path()).unwrap();
        assert_eq!(loaded, manifest);

        // Canonical formatting: byte-identical across writes.
        let first = fs::read(dir.path().join("manifest.json")).unwrap();
        manifest.write(dir.path()).unwrap();
        let second = fs::read(dir.path().join("manifest.json")).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with(b"\n"));
    }

    #[test]
    fn test_manifest_verify_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.arrow"), b"columns").unwrap();
        let mut manifest = Manifest::new("v1", "t");
        manifest.record_file("data.arrow", sha256_hex(b"columns"));

        assert!(manifest.verify_file(dir.path(), "data.arrow").is_ok());

        fs::write(dir.path().join("data.arrow"), b"corrupted").unwrap();
        assert!(matches!(
            manifest.verify_file(dir.path(), "data.arrow"),
            Err(ArtifactError::ShaMismatch { .. })
        ));
    }
}
