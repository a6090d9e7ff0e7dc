use crate::errors::ConfigError;
use crate::model::{FieldDef, ScopeMetadata, Structure};
use serde::de::DeserializeOwned;
use std::env;
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "metadata.yaml";
pub const STRUCTURE_FILE: &str = "structure.yaml";
pub const DDR_FILE: &str = "ddr.yaml";

/// Runtime settings. Environment first, CLI flags override.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub scopes_dir: PathBuf,
    pub workers: usize,
    pub content_cache_bytes: u64,
    pub page_size: usize,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scopes_dir: PathBuf::from("scopes"),
            workers: default_workers(),
            content_cache_bytes: 200 * 1024 * 1024,
            page_size: 1000,
            log_level: "info".to_string(),
        }
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("DDRCHECK_SCOPES_DIR") {
            cfg.scopes_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("DDRCHECK_WORKERS") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.workers = n.max(1);
            }
        }
        if let Ok(v) = env::var("DDRCHECK_CACHE_MB") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.content_cache_bytes = n * 1024 * 1024;
            }
        }
        if let Ok(v) = env::var("DDRCHECK_PAGE_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.page_size = n.max(1);
            }
        }
        if let Ok(v) = env::var("DDRCHECK_LOG") {
            cfg.log_level = v;
        }
        cfg
    }
}

/// Reads a YAML document, warning about keys the target type does not know.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;

    let mut ignored_keys = Vec::new();
    let deserializer = serde_yaml::Deserializer::from_str(&raw);
    let value: T = serde_ignored::deserialize(deserializer, |p| {
        ignored_keys.push(p.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML {}: {}", path.display(), e)))?;

    if !ignored_keys.is_empty() {
        tracing::warn!(
            event = "config_unknown_keys",
            file = %path.display(),
            keys = ?ignored_keys,
            "ignored unknown config fields"
        );
    }
    Ok(value)
}

pub fn load_metadata(path: &Path) -> Result<ScopeMetadata, ConfigError> {
    let meta: ScopeMetadata = load_yaml(path)?;
    if meta.separator.is_empty() {
        return Err(ConfigError(format!(
            "empty Separator in {}",
            path.display()
        )));
    }
    if meta.extension().is_empty() {
        return Err(ConfigError(format!(
            "empty Extension in {}",
            path.display()
        )));
    }
    Ok(meta)
}

pub fn load_structure(path: &Path) -> Result<Structure, ConfigError> {
    let fields: Option<Vec<FieldDef>> = load_yaml(path)?;
    Structure::from_fields(fields.unwrap_or_default())
        .map_err(|e| ConfigError(format!("{} ({})", e, path.display())))
}

pub fn write_yaml<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError(format!("failed to create {}: {}", parent.display(), e)))?;
    }
    let raw = serde_yaml::to_string(value)
        .map_err(|e| ConfigError(format!("failed to serialize {}: {}", path.display(), e)))?;
    std::fs::write(path, raw)
        .map_err(|e| ConfigError(format!("failed to write {}: {}", path.display(), e)))
}

/// Writes a small `demo` scope (one version, two files) under `scopes_dir`.
pub fn write_sample_scope(scopes_dir: &Path) -> Result<PathBuf, ConfigError> {
    let scope_dir = scopes_dir.join("demo");
    let write = |rel: &str, content: &str| -> Result<(), ConfigError> {
        let path = scope_dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(&path, content)
            .map_err(|e| ConfigError(format!("failed to write {}: {}", path.display(), e)))
    };

    write(
        METADATA_FILE,
        r#"Separator: ";"
Extension: csv
Encoding: utf-8
Header: true
Nulable: false
"#,
    )?;
    write(
        "v1/CUSTOMERS/structure.yaml",
        r#"- name: ID
  type: INTEGER
  size: 6
  pk: true
- name: NAME
  type: VARCHAR
  size: 30
- name: BALANCE
  type: DECIMAL
  size: 10
  precision: 2
"#,
    )?;
    write(
        "v1/ORDERS/structure.yaml",
        r#"- name: ORDER_ID
  type: INTEGER
  size: 8
  pk: true
- name: CUSTOMER_ID
  type: INTEGER
  size: 6
- name: CREATED
  type: DATE
  size: 10
"#,
    )?;
    Ok(scope_dir)
}
