use crate::config::{self, METADATA_FILE, STRUCTURE_FILE};
use crate::errors::ConfigError;
use crate::model::{ScopeMetadata, Structure};
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Directory tree of scope definitions:
///
/// ```text
/// <root>/<scope>/metadata.yaml
/// <root>/<scope>/<version>/<file>/structure.yaml
/// ```
#[derive(Debug, Clone)]
pub struct ScopeStore {
    root: PathBuf,
}

impl ScopeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scope_dir(&self, scope: &str) -> PathBuf {
        self.root.join(scope)
    }

    pub fn version_dir(&self, scope: &str, version: &str) -> PathBuf {
        self.root.join(scope).join(version)
    }

    pub fn metadata_path(&self, scope: &str) -> PathBuf {
        self.scope_dir(scope).join(METADATA_FILE)
    }

    pub fn structure_path(&self, scope: &str, version: &str, file: &str) -> PathBuf {
        self.version_dir(scope, version).join(file).join(STRUCTURE_FILE)
    }

    pub fn list_scopes(&self) -> anyhow::Result<Vec<String>> {
        list_dirs(&self.root)
    }

    pub fn list_versions(&self, scope: &str) -> anyhow::Result<Vec<String>> {
        list_dirs(&self.scope_dir(scope))
    }

    /// Logical file names expected for a (scope, version): its subdirectories.
    pub fn expected_files(&self, scope: &str, version: &str) -> anyhow::Result<Vec<String>> {
        list_dirs(&self.version_dir(scope, version))
    }

    pub fn load_metadata(&self, scope: &str) -> Result<ScopeMetadata, ConfigError> {
        config::load_metadata(&self.metadata_path(scope))
    }

    pub fn load_structure(
        &self,
        scope: &str,
        version: &str,
        file: &str,
    ) -> Result<Structure, ConfigError> {
        config::load_structure(&self.structure_path(scope, version, file))
    }

    pub fn save_structure(
        &self,
        scope: &str,
        version: &str,
        file: &str,
        structure: &Structure,
    ) -> Result<(), ConfigError> {
        config::write_yaml(&self.structure_path(scope, version, file), structure)
    }
}

/// Sorted names of the immediate subdirectories of `dir`.
fn list_dirs(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::write_sample_scope;
    use crate::model::{FieldDef, FieldType};
    use tempfile::tempdir;

    #[test]
    fn lists_scopes_versions_and_files_sorted() {
        let dir = tempdir().unwrap();
        write_sample_scope(dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("demo/.hidden")).unwrap();
        std::fs::write(dir.path().join("demo/v1/README"), "not a file def").unwrap();

        let store = ScopeStore::new(dir.path());
        assert_eq!(store.list_scopes().unwrap(), vec!["demo"]);
        assert_eq!(store.list_versions("demo").unwrap(), vec!["v1"]);
        assert_eq!(
            store.expected_files("demo", "v1").unwrap(),
            vec!["CUSTOMERS", "ORDERS"]
        );
    }

    #[test]
    fn missing_version_is_an_error() {
        let dir = tempdir().unwrap();
        let store = ScopeStore::new(dir.path());
        let err = store.expected_files("nope", "v9").unwrap_err();
        assert!(err.to_string().contains("failed to list"));
    }

    #[test]
    fn saved_structure_reloads() {
        let dir = tempdir().unwrap();
        let store = ScopeStore::new(dir.path());
        let s = Structure::from_fields(vec![
            FieldDef::new("a", FieldType::Integer, Some(3)).primary_key(),
            FieldDef::new("b", FieldType::Decimal, Some(8)).with_precision(3),
        ])
        .unwrap();
        store.save_structure("S", "V", "F", &s).unwrap();
        let back = store.load_structure("S", "V", "F").unwrap();
        assert_eq!(back, s);
    }
}
