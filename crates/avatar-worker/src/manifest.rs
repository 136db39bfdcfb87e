//! Persisted per-job stage state.
//!
//! `manifest.json` maps stage keys to `{done, timestamp, ...metadata}` and
//! carries a `fingerprint` of the run inputs. Unknown keys, at the top
//! level or inside a record, are kept verbatim and rewritten untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use avatar_models::PipelineStage;

use crate::error::{WorkerError, WorkerResult};

/// Raw manifest document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(flatten)]
    entries: BTreeMap<String, Value>,
}

impl Manifest {
    /// A stage runs again unless its record says `done: true`.
    pub fn is_done(&self, stage: PipelineStage) -> bool {
        self.entries
            .get(stage.as_str())
            .and_then(|v| v.get("done"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn entry(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn set_done(&mut self, stage: PipelineStage, metadata: Map<String, Value>) {
        let mut record = metadata;
        record.insert("done".to_string(), Value::Bool(true));
        record.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        self.entries
            .insert(stage.as_str().to_string(), Value::Object(record));
    }
}

/// Single read/write boundary for a job's manifest.
#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestStore {
    /// Load the manifest at `path` (empty if absent) and bind it to `fingerprint`.
    ///
    /// A manifest written for a different fingerprint is refused. One
    /// without a fingerprint adopts the current one on its next write.
    pub async fn open(path: impl Into<PathBuf>, fingerprint: &str) -> WorkerResult<Self> {
        let path = path.into();
        let mut manifest = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Manifest>(&bytes).map_err(|e| {
                WorkerError::ManifestCorrupt {
                    path: path.clone(),
                    message: e.to_string(),
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Manifest::default(),
            Err(e) => return Err(e.into()),
        };

        match manifest.fingerprint.as_deref() {
            Some(existing) if existing != fingerprint => {
                return Err(WorkerError::ManifestMismatch {
                    job_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
                    expected: existing.to_string(),
                    actual: fingerprint.to_string(),
                });
            }
            Some(_) => {}
            None => {
                if manifest.keys().next().is_some() {
                    info!("Adopting fingerprint for existing manifest {}", path.display());
                }
                manifest.fingerprint = Some(fingerprint.to_string());
            }
        }

        Ok(Self { path, manifest })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn is_done(&self, stage: PipelineStage) -> bool {
        self.manifest.is_done(stage)
    }

    /// Typed view of a stage record; extra fields are ignored.
    pub fn record<T: DeserializeOwned>(&self, stage: PipelineStage) -> WorkerResult<Option<T>> {
        self.manifest
            .entry(stage.as_str())
            .map(|v| {
                T::deserialize(v).map_err(|e| WorkerError::ManifestCorrupt {
                    path: self.path.clone(),
                    message: format!("{} record: {}", stage, e),
                })
            })
            .transpose()
    }

    /// Mark `stage` done with `metadata` and persist atomically.
    pub async fn mark_done<T: Serialize>(&mut self, stage: PipelineStage, metadata: &T) -> WorkerResult<()> {
        let fields = match serde_json::to_value(metadata) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            Ok(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
            Err(e) => {
                return Err(WorkerError::ManifestCorrupt {
                    path: self.path.clone(),
                    message: format!("unserializable {} metadata: {}", stage, e),
                })
            }
        };
        self.manifest.set_done(stage, fields);
        self.persist().await
    }

    async fn persist(&self) -> WorkerResult<()> {
        let body = serde_json::to_vec_pretty(&self.manifest).map_err(|e| WorkerError::ManifestCorrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!("Wrote {}", self.path.display());
        Ok(())
    }
}

/// SHA-256 over the input bytes and every setting that changes intermediates.
pub async fn fingerprint(input: &Path, style_id: &str, seed: u64, keyframe_interval: usize) -> WorkerResult<String> {
    let mut file = fs::File::open(input).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1 << 16];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    hasher.update(b"\0style_id=");
    hasher.update(style_id.as_bytes());
    hasher.update(b"\0seed=");
    hasher.update(seed.to_le_bytes());
    hasher.update(b"\0keyframe_interval=");
    hasher.update((keyframe_interval as u64).to_le_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
