//! Schema document loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

/// Error type for document loading and compilation.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("{} is not an OpenAPI 3 document: {reason}", .path.display())]
    Unsupported { path: PathBuf, reason: String },

    #[error("unresolvable reference `{0}`")]
    Reference(String),

    #[error("invalid schema at {pointer}: {message}")]
    Schema { pointer: String, message: String },

    #[error("invalid path template `{template}`: {message}")]
    Route { template: String, message: String },
}

/// A parsed OpenAPI document.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    path: PathBuf,
    root: Value,
}

impl SchemaDocument {
    /// Read and parse the document at `path`.
    ///
    /// `.json` files go through `serde_json`; anything else is read as YAML.
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let root: Value = if is_json {
            serde_json::from_str(&content).map_err(|e| DocumentError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|e| DocumentError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };

        let document = Self::from_value(path, root)?;
        tracing::info!(
            path = %path.display(),
            version = document.version(),
            "Schema document loaded"
        );
        Ok(document)
    }

    /// Wrap an already-parsed document, checking its shape.
    pub fn from_value(path: impl Into<PathBuf>, root: Value) -> Result<Self, DocumentError> {
        let path = path.into();
        let unsupported = |reason: &str| DocumentError::Unsupported {
            path: path.clone(),
            reason: reason.to_string(),
        };

        let object = root
            .as_object()
            .ok_or_else(|| unsupported("top level is not an object"))?;
        let version = object
            .get("openapi")
            .and_then(Value::as_str)
            .ok_or_else(|| unsupported("missing `openapi` version field"))?;
        if !version.starts_with("3.") {
            return Err(unsupported(&format!("version {version} is not 3.x")));
        }
        if !object.get("paths").is_some_and(Value::is_object) {
            return Err(unsupported("missing `paths` object"));
        }

        Ok(Self { path, root })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn version(&self) -> &str {
        self.root
            .get("openapi")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// OpenAPI 3.1 documents use JSON Schema 2020-12 directly.
    pub fn is_openapi_31(&self) -> bool {
        self.version().starts_with("3.1")
    }

    /// Path component of the first server URL, with variables substituted
    /// by their defaults. `None` when there is no usable prefix.
    pub fn server_base_path(&self) -> Option<String> {
        let server = self.root.get("servers")?.as_array()?.first()?;
        let mut url = server.get("url")?.as_str()?.to_string();

        if let Some(variables) = server.get("variables").and_then(Value::as_object) {
            for (name, variable) in variables {
                if let Some(default) = variable.get("default").and_then(Value::as_str) {
                    url = url.replace(&format!("{{{name}}}"), default);
                }
            }
        }

        let path = match url.find("://") {
            Some(scheme_end) => {
                let rest = &url[scheme_end + 3..];
                rest.find('/').map(|i| &rest[i..]).unwrap_or("")
            }
            None => url.as_str(),
        };

        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            None
        } else if trimmed.starts_with('/') {
            Some(trimmed.to_string())
        } else {
            Some(format!("/{trimmed}"))
        }
    }
}
