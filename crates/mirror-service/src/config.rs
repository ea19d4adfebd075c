use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use common::{KeyType, MirrorConfig};
use range_index::RecordSchema;
use serde::Deserialize;

/// Replica deployment description, usually read from a YAML file.
///
/// ```yaml
/// listen: 0.0.0.0:8080
/// advertised_host: replica-0:8080
/// topic: purchases
/// key_type: long
/// partitions:
///   0: replica-0:8080
///   1: replica-1:8080
/// range:
///   field: timestamp
///   schema: purchase.avsc
/// records: purchases.jsonl
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub listen: String,
    /// Address other replicas and clients use for this one. Must match its
    /// entry in `partitions` for the replica to serve those partitions locally.
    pub advertised_host: String,
    pub topic: String,
    #[serde(default)]
    pub key_type: KeyType,
    pub partitions: BTreeMap<u32, String>,
    #[serde(default)]
    pub fallback_address: Option<String>,
    #[serde(default)]
    pub range: Option<RangeConfig>,
    /// JSON lines of `{"key": ..., "value": {...}}` ingested at startup.
    #[serde(default)]
    pub records: Option<PathBuf>,
    #[serde(default)]
    pub mirror: MirrorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RangeConfig {
    pub field: String,
    /// `.avsc` file, or a compiled descriptor set when `message` is given.
    pub schema: PathBuf,
    #[serde(default)]
    pub message: Option<String>,
}

impl ServiceConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("invalid mirror service configuration")
    }

    /// Reads a YAML file. Relative `schema` and `records` paths resolve
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let mut config = Self::from_yaml_str(&text)
            .with_context(|| format!("while parsing {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let Some(range) = self.range.as_mut() {
            if range.schema.is_relative() {
                range.schema = base.join(&range.schema);
            }
        }
        if let Some(records) = self.records.as_mut() {
            if records.is_relative() {
                *records = base.join(&*records);
            }
        }
    }
}

impl RangeConfig {
    pub fn load_schema(&self) -> Result<RecordSchema> {
        let schema = match &self.message {
            Some(message) => {
                let bytes = fs::read(&self.schema)
                    .with_context(|| format!("cannot read {}", self.schema.display()))?;
                RecordSchema::from_descriptor_set(&bytes, message)?
            }
            None => {
                let text = fs::read_to_string(&self.schema)
                    .with_context(|| format!("cannot read {}", self.schema.display()))?;
                RecordSchema::parse_avro(&text)?
            }
        };
        Ok(schema)
    }
}
