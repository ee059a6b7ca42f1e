//! Dataset store gateway
//!
//! This module provides the [`DatasetStore`] interface and two
//! implementations: [`FsDatasetStore`], a directory of `<id>.csv` /
//! `<id>.json` files, and [`InMemoryDatasetStore`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DataTable, DatasetDescriptor, DatasetFormat};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::table_codec;

/// Access to versioned tabular datasets
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Short name used in logs and health reports
    fn name(&self) -> &str;

    /// Loads a dataset's content
    async fn load(&self, dataset_id: &str) -> GatewayResult<DataTable>;

    /// Describes one dataset without returning its content
    async fn describe(&self, dataset_id: &str) -> GatewayResult<DatasetDescriptor>;

    /// Describes every dataset
    async fn list(&self) -> GatewayResult<Vec<DatasetDescriptor>>;

    /// Stores a dataset, replacing any previous content under the same id
    async fn put(&self, dataset_id: &str, table: &DataTable, format: DatasetFormat) -> GatewayResult<DatasetDescriptor>;

    /// Removes a dataset
    async fn delete(&self, dataset_id: &str) -> GatewayResult<()>;

    /// Checks that the store is reachable
    async fn ping(&self) -> GatewayResult<()>;
}

/// Content version tag: hex sha256 of the stored bytes
pub fn version_tag(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Strips a trailing `.csv` / `.json` so `iris` and `iris.csv` name the same dataset
pub fn normalize_dataset_id(dataset_id: &str) -> GatewayResult<String> {
    let stem = dataset_id
        .strip_suffix(".csv")
        .or_else(|| dataset_id.strip_suffix(".json"))
        .unwrap_or(dataset_id);
    common::utils::validate_identifier("dataset_id", stem)
        .map_err(|e| GatewayError::InvalidData(e.to_string()))?;
    Ok(stem.to_string())
}

/// Dataset store backed by a directory of CSV and JSON files
pub struct FsDatasetStore {
    /// Root directory
    root: PathBuf,
}

impl FsDatasetStore {
    /// Creates a store over `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> GatewayResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!(root = %root.display(), "Filesystem dataset store ready");
        Ok(Self { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, stem: &str, format: DatasetFormat) -> PathBuf {
        let ext = match format {
            DatasetFormat::Json => "json",
            _ => "csv",
        };
        self.root.join(format!("{}.{}", stem, ext))
    }

    /// Finds the file for a dataset, CSV first
    async fn locate(&self, dataset_id: &str) -> GatewayResult<(String, PathBuf, DatasetFormat)> {
        let stem = normalize_dataset_id(dataset_id)?;
        let preferred = if dataset_id.ends_with(".json") {
            [DatasetFormat::Json, DatasetFormat::Csv]
        } else {
            [DatasetFormat::Csv, DatasetFormat::Json]
        };
        for format in preferred {
            let path = self.path_for(&stem, format);
            if tokio::fs::try_exists(&path).await? {
                return Ok((stem, path, format));
            }
        }
        Err(GatewayError::DatasetNotFound(stem))
    }

    async fn read(&self, dataset_id: &str) -> GatewayResult<(DataTable, DatasetDescriptor)> {
        let (stem, path, format) = self.locate(dataset_id).await?;
        let bytes = tokio::fs::read(&path).await?;
        let modified = tokio::fs::metadata(&path).await?.modified()?;

        let table = match format {
            DatasetFormat::Json => table_codec::parse_json(&bytes)?,
            _ => table_codec::parse_csv(&bytes)?,
        };

        let descriptor = DatasetDescriptor {
            dataset_id: stem,
            columns: table.columns.clone(),
            row_count: table.row_count(),
            size_bytes: bytes.len() as u64,
            version: version_tag(&bytes),
            format,
            updated_at: DateTime::<Utc>::from(modified),
        };
        Ok((table, descriptor))
    }
}

#[async_trait]
impl DatasetStore for FsDatasetStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn load(&self, dataset_id: &str) -> GatewayResult<DataTable> {
        let (table, descriptor) = self.read(dataset_id).await?;
        debug!(
            dataset_id = %descriptor.dataset_id,
            rows = descriptor.row_count,
            columns = descriptor.columns.len(),
            version = %descriptor.version,
            "Dataset loaded"
        );
        Ok(table)
    }

    async fn describe(&self, dataset_id: &str) -> GatewayResult<DatasetDescriptor> {
        Ok(self.read(dataset_id).await?.1)
    }

    async fn list(&self) -> GatewayResult<Vec<DatasetDescriptor>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut by_id: BTreeMap<String, DatasetDescriptor> = BTreeMap::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
            ) else {
                continue;
            };
            if ext != "csv" && ext != "json" {
                continue;
            }
            let file_name = format!("{}.{}", stem, ext);
            match self.read(&file_name).await {
                Ok((_, descriptor)) => {
                    if let Some(existing) = by_id.get(&descriptor.dataset_id) {
                        warn!(
                            dataset_id = %descriptor.dataset_id,
                            kept = ?existing.format,
                            "Dataset stored in two formats; listing one"
                        );
                        continue;
                    }
                    by_id.insert(descriptor.dataset_id.clone(), descriptor);
                }
                Err(e) => warn!(file = %path.display(), error = %e, "Skipping unreadable dataset"),
            }
        }

        Ok(by_id.into_values().collect())
    }

    async fn put(&self, dataset_id: &str, table: &DataTable, format: DatasetFormat) -> GatewayResult<DatasetDescriptor> {
        let stem = normalize_dataset_id(dataset_id)?;
        table.validate().map_err(|e| GatewayError::InvalidData(e.to_string()))?;

        let format = match format {
            DatasetFormat::Json => DatasetFormat::Json,
            _ => DatasetFormat::Csv,
        };
        let bytes = match format {
            DatasetFormat::Json => table_codec::write_json(table)?,
            _ => table_codec::write_csv(table)?,
        };

        let path = self.path_for(&stem, format);
        let tmp = self.root.join(format!(".{}.tmp", stem));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        let other = self.path_for(
            &stem,
            if format == DatasetFormat::Json { DatasetFormat::Csv } else { DatasetFormat::Json },
        );
        if tokio::fs::try_exists(&other).await? {
            tokio::fs::remove_file(&other).await?;
        }

        info!(dataset_id = %stem, rows = table.row_count(), format = ?format, "Dataset stored");
        Ok(DatasetDescriptor {
            dataset_id: stem,
            columns: table.columns.clone(),
            row_count: table.row_count(),
            size_bytes: bytes.len() as u64,
            version: version_tag(&bytes),
            format,
            updated_at: Utc::now(),
        })
    }

    async fn delete(&self, dataset_id: &str) -> GatewayResult<()> {
        let (stem, path, _) = self.locate(dataset_id).await?;
        tokio::fs::remove_file(&path).await?;
        info!(dataset_id = %stem, "Dataset deleted");
        Ok(())
    }

    async fn ping(&self) -> GatewayResult<()> {
        let metadata = tokio::fs::metadata(&self.root).await?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(GatewayError::Unavailable(format!(
                "{} is not a directory",
                self.root.display()
            )))
        }
    }
}

/// Dataset store held in process memory
#[derive(Default)]
pub struct InMemoryDatasetStore {
    datasets: RwLock<BTreeMap<String, (DataTable, DatasetDescriptor)>>,
    offline: AtomicBool,
    loads: AtomicUsize,
}

impl InMemoryDatasetStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a dataset directly
    pub fn insert(&self, dataset_id: &str, table: DataTable) -> GatewayResult<DatasetDescriptor> {
        let stem = normalize_dataset_id(dataset_id)?;
        table.validate().map_err(|e| GatewayError::InvalidData(e.to_string()))?;
        let bytes = serde_json::to_vec(&table).map_err(|e| GatewayError::InvalidData(e.to_string()))?;
        let descriptor = DatasetDescriptor {
            dataset_id: stem.clone(),
            columns: table.columns.clone(),
            row_count: table.row_count(),
            size_bytes: bytes.len() as u64,
            version: version_tag(&bytes),
            format: DatasetFormat::Memory,
            updated_at: Utc::now(),
        };
        self.datasets.write().insert(stem, (table, descriptor.clone()));
        Ok(descriptor)
    }

    /// Simulates an outage: every call fails with `Unavailable` while set
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `load` calls served or refused so far
    pub fn load_calls(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> GatewayResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(GatewayError::Unavailable("in-memory dataset store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DatasetStore for InMemoryDatasetStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, dataset_id: &str) -> GatewayResult<DataTable> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let stem = normalize_dataset_id(dataset_id)?;
        self.datasets
            .read()
            .get(&stem)
            .map(|(table, _)| table.clone())
            .ok_or(GatewayError::DatasetNotFound(stem))
    }

    async fn describe(&self, dataset_id: &str) -> GatewayResult<DatasetDescriptor> {
        self.check_online()?;
        let stem = normalize_dataset_id(dataset_id)?;
        self.datasets
            .read()
            .get(&stem)
            .map(|(_, descriptor)| descriptor.clone())
            .ok_or(GatewayError::DatasetNotFound(stem))
    }

    async fn list(&self) -> GatewayResult<Vec<DatasetDescriptor>> {
        self.check_online()?;
        Ok(self.datasets.read().values().map(|(_, d)| d.clone()).collect())
    }

    async fn put(&self, dataset_id: &str, table: &DataTable, _format: DatasetFormat) -> GatewayResult<DatasetDescriptor> {
        self.check_online()?;
        self.insert(dataset_id, table.clone())
    }

    async fn delete(&self, dataset_id: &str) -> GatewayResult<()> {
        self.check_online()?;
        let stem = normalize_dataset_id(dataset_id)?;
        match self.datasets.write().remove(&stem) {
            Some(_) => Ok(()),
            None => Err(GatewayError::DatasetNotFound(stem)),
        }
    }

    async fn ping(&self) -> GatewayResult<()> {
        self.check_online()
    }
}
