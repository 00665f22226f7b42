use crate::error::{Result, VentError};
use crate::pipeline::FileAnalysis;
use crate::recording::RecordingKey;
use std::path::{Path, PathBuf};

/// Persistence of per-recording analyses, keyed by patient, date and hour.
pub trait ResultStore: Send + Sync {
    /// Insert or replace the analysis stored under the analysis' key
    fn upsert(&self, analysis: &FileAnalysis) -> Result<()>;

    /// Previously stored analysis for `key`, if any
    fn fetch(&self, key: &RecordingKey) -> Result<Option<FileAnalysis>>;
}

/// One JSON document per recording under a directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// `<local data dir>/ventmech/results`
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_local_dir().ok_or_else(|| {
            VentError::StoreError("no local data directory on this platform".to_string())
        })?;
        Ok(Self::new(base.join("ventmech").join("results")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &RecordingKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.store_stem()))
    }
}

impl ResultStore for JsonDirStore {
    fn upsert(&self, analysis: &FileAnalysis) -> Result<()> {
        let key = analysis.key.as_ref().ok_or_else(|| {
            VentError::StoreError(format!("{} has no recording key", analysis.source))
        })?;
        let path = self.path_for(key);
        let json = serde_json::to_vec_pretty(analysis)?;

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| VentError::StoreError(format!("{}: {}", self.dir.display(), e)))?;

        // unique temp name so parallel writers never share one
        let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        std::fs::write(&tmp_path, &json)
            .map_err(|e| VentError::StoreError(format!("{}: {}", tmp_path.display(), e)))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| VentError::StoreError(format!("{}: {}", path.display(), e)))?;

        log::debug!("Stored analysis for {} at {}", key, path.display());
        Ok(())
    }

    fn fetch(&self, key: &RecordingKey) -> Result<Option<FileAnalysis>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let data = std::fs::read(&path)?;
        let analysis = serde_json::from_slice(&data)
            .map_err(|e| VentError::StoreError(format!("{}: {}", path.display(), e)))?;
        Ok(Some(analysis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::inference::ModelSet;
    use crate::pipeline::Analyzer;

    const TEXT: &str = "BS, S:1,\n10,5\n10,6\nBE\n";

    #[test]
    fn test_upsert_then_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        let key = RecordingKey::new("P1", "20210314", "08-00-00");

        let analyzer = Analyzer::new(AnalysisConfig::default(), ModelSet::none());
        let analysis = analyzer.analyze_text(TEXT, "ward_P1_20210314_08-00-00.txt", Some(key.clone()));

        assert!(store.fetch(&key).unwrap().is_none());
        store.upsert(&analysis).unwrap();
        store.upsert(&analysis).unwrap();

        let back = store.fetch(&key).unwrap().unwrap();
        assert_eq!(back.id, analysis.id);
        assert_eq!(back.breaths.len(), 1);
        // the short breath was rejected, its NaN mechanics survive the round trip
        assert!(back.breaths[0].mechanics.is_missing());
        assert!(back.breaths[0].magnitude.is_nan());
        assert_eq!(back.debug, analysis.debug);

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_upsert_without_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        let analyzer = Analyzer::new(AnalysisConfig::default(), ModelSet::none());
        let analysis = analyzer.analyze_text(TEXT, "unnamed.txt", None);

        assert!(matches!(store.upsert(&analysis), Err(VentError::StoreError(_))));
    }

    #[test]
    fn test_corrupt_document_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        let key = RecordingKey::new("P1", "20210314", "08-00-00");
        std::fs::write(dir.path().join("P1_20210314_08-00-00.json"), "{ not json").unwrap();

        assert!(matches!(store.fetch(&key), Err(VentError::StoreError(_))));
    }
}
