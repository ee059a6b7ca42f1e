//! Model archive
//!
//! Persists each committed model (record plus fitted estimator) as
//! `<model_id>.json` in a directory, and reads them back at start-up.

use std::path::{Path, PathBuf};

use common::Result;
use estimators::TrainedModel;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::record::ModelRecord;

/// On-disk form of one archived model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedModel {
    pub record: ModelRecord,
    pub model: TrainedModel,
}

/// Directory of archived models
#[derive(Debug, Clone)]
pub struct ModelArchive {
    dir: PathBuf,
}

impl ModelArchive {
    /// Opens the archive, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Archive directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, model_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", model_id))
    }

    /// Writes a model, replacing any earlier version atomically
    pub async fn save(&self, record: &ModelRecord, model: &TrainedModel) -> Result<()> {
        let archived = ArchivedModel {
            record: record.clone(),
            model: model.clone(),
        };
        let bytes = serde_json::to_vec(&archived)?;
        let tmp = self.dir.join(format!(".{}.json.tmp", record.model_id));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, self.path_for(&record.model_id)).await?;
        debug!(model_id = %record.model_id, version = record.version, bytes = bytes.len(), "Model archived");
        Ok(())
    }

    /// Deletes a model's file; a missing file is not an error
    pub async fn remove(&self, model_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(model_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads every archived model, skipping unreadable files
    pub fn load_all(&self) -> Result<Vec<ArchivedModel>> {
        info!("Loading archived models from {:?}", self.dir);
        let mut models = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read(&path)
                .map_err(common::Error::from)
                .and_then(|bytes| serde_json::from_slice::<ArchivedModel>(&bytes).map_err(common::Error::from));
            match parsed {
                Ok(archived) => models.push(archived),
                Err(e) => warn!("Skipping unreadable archive file {:?}: {}", path, e),
            }
        }

        models.sort_by(|a, b| a.record.created_at.cmp(&b.record.created_at));
        Ok(models)
    }
}
