//! Database configuration.
//!
//! Reads configuration from environment variables:
//! - `NDI_DB_PATH`: session directory holding `ndi_database/` (default: ".")
//! - `NDI_SESSION_REF`: session reference recorded by the backend (default: "")
//! - `NDI_BACKEND_ORDER`: comma-separated backend priority list
//!   (default: "sqlite,indexed-files,directory")

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::registry::BackendKind;

pub const ENV_DB_PATH: &str = "NDI_DB_PATH";
pub const ENV_SESSION_REF: &str = "NDI_SESSION_REF";
pub const ENV_BACKEND_ORDER: &str = "NDI_BACKEND_ORDER";

/// Where and how to open a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub session_reference: String,
    #[serde(default = "BackendKind::default_order")]
    pub backend_order: Vec<BackendKind>,
}

impl DatabaseConfig {
    /// Default configuration rooted at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        DatabaseConfig {
            path: path.as_ref().to_path_buf(),
            session_reference: String::new(),
            backend_order: BackendKind::default_order(),
        }
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StorageError> {
        let path = lookup(ENV_DB_PATH).unwrap_or_else(|| ".".to_string());
        let mut config = DatabaseConfig::new(path);
        if let Some(session) = lookup(ENV_SESSION_REF) {
            config.session_reference = session;
        }
        if let Some(order) = lookup(ENV_BACKEND_ORDER) {
            config.backend_order = BackendKind::parse_list(&order)?;
        }
        Ok(config)
    }

    pub fn with_session_reference(mut self, session_reference: &str) -> Self {
        self.session_reference = session_reference.to_string();
        self
    }

    pub fn with_backend_order(mut self, order: Vec<BackendKind>) -> Self {
        self.backend_order = order;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = DatabaseConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.path, PathBuf::from("."));
        assert_eq!(config.session_reference, "");
        assert_eq!(config.backend_order, BackendKind::default_order());
    }

    #[test]
    fn reads_every_variable() {
        let config = DatabaseConfig::from_lookup(lookup(&[
            (ENV_DB_PATH, "/data/session"),
            (ENV_SESSION_REF, "ref-1"),
            (ENV_BACKEND_ORDER, "directory,sqlite"),
        ]))
        .unwrap();
        assert_eq!(config.path, PathBuf::from("/data/session"));
        assert_eq!(config.session_reference, "ref-1");
        assert_eq!(
            config.backend_order,
            vec![BackendKind::Directory, BackendKind::Sqlite]
        );
    }

    #[test]
    fn bad_backend_name_is_an_error() {
        assert!(DatabaseConfig::from_lookup(lookup(&[(ENV_BACKEND_ORDER, "oracle")])).is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: DatabaseConfig = serde_json::from_str(r#"{"path": "/x"}"#).unwrap();
        assert_eq!(config, DatabaseConfig::new("/x"));
    }
}
