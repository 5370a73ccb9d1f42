//! Schema catalog: `*.json` files in a directory, offered by name.
//!
//! A schema is opaque text. It is never parsed or validated, only shown to
//! the model as the target shape, so a catalog entry that is not valid JSON
//! still works as an instruction.

use crate::error::ExtractError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Schemas available in one directory, keyed by file stem.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    dir: PathBuf,
    entries: BTreeMap<String, PathBuf>,
}

impl SchemaCatalog {
    /// List `*.json` files in `dir`.
    ///
    /// A missing directory yields an empty catalog; any other listing
    /// failure is an error.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let dir = dir.as_ref().to_path_buf();
        let read = match std::fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Schema directory {} does not exist", dir.display());
                return Ok(Self {
                    dir,
                    entries: BTreeMap::new(),
                });
            }
            Err(source) => {
                return Err(ExtractError::SchemaDirUnreadable { path: dir, source });
            }
        };

        let entries = read
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| {
                let stem = p.file_stem()?.to_string_lossy().into_owned();
                Some((stem, p))
            })
            .collect::<BTreeMap<_, _>>();

        debug!("Loaded {} schemas from {}", entries.len(), dir.display());
        Ok(Self { dir, entries })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Schema names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text of a catalog entry. `name` may carry the `.json` suffix.
    pub fn get(&self, name: &str) -> Result<String, ExtractError> {
        let key = name.strip_suffix(".json").unwrap_or(name);
        let path = self
            .entries
            .get(key)
            .ok_or_else(|| self.not_found(name))?;
        read_schema(path)
    }

    /// A catalog entry, or else a readable file path.
    pub fn resolve(&self, name_or_path: &str) -> Result<String, ExtractError> {
        let key = name_or_path.strip_suffix(".json").unwrap_or(name_or_path);
        if self.entries.contains_key(key) {
            return self.get(key);
        }
        let path = Path::new(name_or_path);
        if path.is_file() {
            return read_schema(path);
        }
        Err(self.not_found(name_or_path))
    }

    fn not_found(&self, name: &str) -> ExtractError {
        let available = if self.entries.is_empty() {
            format!("(none in {})", self.dir.display())
        } else {
            self.names().join(", ")
        };
        ExtractError::SchemaNotFound {
            name: name.to_string(),
            available,
        }
    }
}

fn read_schema(path: &Path) -> Result<String, ExtractError> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("invoice.json"), r#"{"total": "number"}"#).unwrap();
        std::fs::write(dir.path().join("receipt.json"), "not json at all").unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();
        dir
    }

    #[test]
    fn lists_json_stems_sorted() {
        let dir = catalog_dir();
        let catalog = SchemaCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.names(), vec!["invoice", "receipt"]);
    }

    #[test]
    fn content_is_opaque_text() {
        let dir = catalog_dir();
        let catalog = SchemaCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.get("receipt").unwrap(), "not json at all");
        assert_eq!(catalog.get("invoice.json").unwrap(), r#"{"total": "number"}"#);
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = SchemaCatalog::load(dir.path().join("nope")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn unknown_name_lists_available() {
        let dir = catalog_dir();
        let catalog = SchemaCatalog::load(dir.path()).unwrap();
        let err = catalog.get("passport").unwrap_err();
        match err {
            ExtractError::SchemaNotFound { name, available } => {
                assert_eq!(name, "passport");
                assert_eq!(available, "invoice, receipt");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn resolve_falls_back_to_file_path() {
        let dir = catalog_dir();
        let other = tempfile::tempdir().unwrap();
        let custom = other.path().join("custom.json");
        std::fs::write(&custom, "{\"x\": 1}").unwrap();

        let catalog = SchemaCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.resolve("invoice").unwrap(), r#"{"total": "number"}"#);
        assert_eq!(catalog.resolve(custom.to_str().unwrap()).unwrap(), "{\"x\": 1}");
        assert!(catalog.resolve("missing.json").is_err());
    }
}
