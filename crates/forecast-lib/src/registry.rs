//! Persistence of trained models
//!
//! An artifact is a single bincode file: an envelope carrying a magic tag, a
//! format version and the SHA256 of the encoded payload. Each write goes
//! through its own temp file in the target directory and is renamed into
//! place, so a reader never sees a half-written artifact even with
//! concurrent writers.

use crate::error::RegistryError;
use crate::features::FeatureSchema;
use crate::trainer::{FittedPipeline, Metrics, ModelType, TrainedModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MAGIC: [u8; 4] = *b"SFCM";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactEnvelope {
    magic: [u8; 4],
    format_version: u32,
    checksum: String,
    payload: Vec<u8>,
}

/// Every field is optional on disk so that an incomplete artifact decodes
/// and can be rejected by name
#[derive(Debug, Default, Serialize, Deserialize)]
struct ArtifactPayload {
    pipeline: Option<FittedPipeline>,
    feature_schema: Option<FeatureSchema>,
    metrics: Option<Metrics>,
    trained_date: Option<DateTime<Utc>>,
    model_type: Option<ModelType>,
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    path: PathBuf,
}

impl ModelRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn save(&self, model: &TrainedModel) -> Result<(), RegistryError> {
        let payload = ArtifactPayload {
            pipeline: Some(model.pipeline().clone()),
            feature_schema: Some(model.schema().clone()),
            metrics: Some(model.metrics().clone()),
            trained_date: Some(model.trained_date()),
            model_type: Some(model.model_type()),
        };
        self.write_payload(&payload)?;
        info!(
            path = %self.path.display(),
            model_type = %model.model_type(),
            "Model artifact saved"
        );
        Ok(())
    }

    fn write_payload(&self, payload: &ArtifactPayload) -> Result<(), RegistryError> {
        let encoded = bincode::serialize(payload).map_err(|e| RegistryError::Encode(e.to_string()))?;
        let envelope = ArtifactEnvelope {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            checksum: compute_checksum(&encoded),
            payload: encoded,
        };
        let bytes = bincode::serialize(&envelope).map_err(|e| RegistryError::Encode(e.to_string()))?;
        self.write_atomic(&bytes)
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), RegistryError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| RegistryError::Io { path, source }
        };

        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(io_err(parent))?;
                parent
            }
            None => Path::new("."),
        };

        // Unique per write so concurrent saves never share a temp file
        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err(parent))?;
        temp.write_all(bytes).map_err(io_err(temp.path()))?;
        temp.as_file().sync_all().map_err(io_err(temp.path()))?;
        temp.persist(&self.path)
            .map_err(|e| RegistryError::Io {
                path: self.path.clone(),
                source: e.error,
            })?;
        Ok(())
    }

    /// Load the artifact; a missing file is `NotFound`, anything unreadable
    /// or incomplete is `Corrupt`
    pub fn load(&self) -> Result<TrainedModel, RegistryError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(self.path.clone()))
            }
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let corrupt = |reason: String| RegistryError::Corrupt {
            path: self.path.clone(),
            reason,
        };

        let envelope: ArtifactEnvelope =
            bincode::deserialize(&bytes).map_err(|e| corrupt(format!("undecodable envelope: {}", e)))?;
        if envelope.magic != MAGIC {
            return Err(corrupt("bad magic".to_string()));
        }
        if envelope.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                envelope.format_version
            )));
        }
        let checksum = compute_checksum(&envelope.payload);
        if checksum != envelope.checksum {
            return Err(corrupt(format!(
                "checksum mismatch: expected {}, got {}",
                envelope.checksum, checksum
            )));
        }

        let payload: ArtifactPayload = bincode::deserialize(&envelope.payload)
            .map_err(|e| corrupt(format!("undecodable payload: {}", e)))?;

        let missing = |field: &str| corrupt(format!("missing {}", field));
        let pipeline = payload.pipeline.ok_or_else(|| missing("pipeline"))?;
        let schema = payload.feature_schema.ok_or_else(|| missing("feature schema"))?;
        let metrics = payload.metrics.ok_or_else(|| missing("metrics"))?;
        let trained_date = payload.trained_date.ok_or_else(|| missing("trained date"))?;
        let model_type = payload.model_type.unwrap_or_default();

        if pipeline.n_features() != schema.len() {
            return Err(corrupt(format!(
                "pipeline expects {} features but schema has {}",
                pipeline.n_features(),
                schema.len()
            )));
        }

        debug!(path = %self.path.display(), checksum = %checksum, "Model artifact loaded");
        Ok(TrainedModel::from_parts(
            pipeline,
            schema,
            metrics,
            model_type,
            trained_date,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CategoryDomain;
    use crate::models::MonthlyAggregate;
    use crate::trainer::ModelTrainer;
    use tempfile::TempDir;

    fn trained_model() -> TrainedModel {
        let aggs: Vec<MonthlyAggregate> = (0..24)
            .map(|i| MonthlyAggregate {
                product_id: ((i % 2) + 1).to_string(),
                category_id: "1".to_string(),
                supplier_id: ((i % 3) + 1).to_string(),
                year: 2022 + i / 12,
                month: (i % 12) as u32 + 1,
                total_quantity: 20.0 + (i % 5) as f64,
                total_revenue: 200.0 + (i % 5) as f64 * 10.0,
                avg_price: 10.0,
            })
            .collect();
        ModelTrainer::default()
            .train(
                &aggs,
                ModelType::DecisionTree,
                &CategoryDomain::observed(&aggs),
            )
            .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::new(dir.path().join("nested/models/model.bin"));
        let model = trained_model();

        assert!(!registry.exists());
        registry.save(&model).unwrap();
        assert!(registry.exists());

        let loaded = registry.load().unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::new(dir.path().join("absent.bin"));
        assert!(matches!(registry.load(), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_missing_field_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::new(dir.path().join("model.bin"));
        let model = trained_model();
        let payload = ArtifactPayload {
            pipeline: Some(model.pipeline().clone()),
            feature_schema: Some(model.schema().clone()),
            metrics: None,
            trained_date: Some(model.trained_date()),
            model_type: Some(model.model_type()),
        };
        registry.write_payload(&payload).unwrap();

        match registry.load() {
            Err(RegistryError::Corrupt { reason, .. }) => assert!(reason.contains("metrics")),
            other => panic!("expected corrupt artifact, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_model_type_defaults_to_tree() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::new(dir.path().join("model.bin"));
        let model = trained_model();
        let payload = ArtifactPayload {
            pipeline: Some(model.pipeline().clone()),
            feature_schema: Some(model.schema().clone()),
            metrics: Some(model.metrics().clone()),
            trained_date: Some(model.trained_date()),
            model_type: None,
        };
        registry.write_payload(&payload).unwrap();
        assert_eq!(registry.load().unwrap().model_type(), ModelType::DecisionTree);
    }

    #[test]
    fn test_tampered_payload_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::new(dir.path().join("model.bin"));
        registry.save(&trained_model()).unwrap();

        let mut bytes = fs::read(registry.path()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(registry.path(), &bytes).unwrap();

        assert!(matches!(registry.load(), Err(RegistryError::Corrupt { .. })));
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::new(dir.path().join("model.bin"));
        fs::write(registry.path(), b"not a model").unwrap();
        assert!(matches!(registry.load(), Err(RegistryError::Corrupt { .. })));
    }

    #[test]
    fn test_concurrent_saves_never_expose_partial_artifact() {
        use std::sync::Arc;
        use std::thread;

        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ModelRegistry::new(dir.path().join("model.bin")));
        let model = Arc::new(trained_model());
        registry.save(&model).unwrap();

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let model = model.clone();
                thread::spawn(move || {
                    (0..50)
                        .filter(|_| registry.save(&model).is_err())
                        .count()
                })
            })
            .collect();

        let reader = {
            let registry = registry.clone();
            thread::spawn(move || (0..200).filter(|_| registry.load().is_err()).count())
        };

        let save_errors: usize = writers.into_iter().map(|h| h.join().unwrap()).sum();
        let load_errors = reader.join().unwrap();
        assert_eq!(save_errors, 0);
        assert_eq!(load_errors, 0);
        assert_eq!(registry.load().unwrap(), *model);

        // No temp files left behind
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_checksum_is_hex_sha256() {
        let checksum = compute_checksum(b"model bytes");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum(b"model bytes"));
    }
}
