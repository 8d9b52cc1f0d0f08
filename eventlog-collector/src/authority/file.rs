//! File-backed authority.
//!
//! Reads a JSON document on every call so that edits to the file are picked
//! up by the next refresh:
//!
//! ```json
//! {
//!   "process": { "cycleIntervalSeconds": 60 },
//!   "monitors": { "localhost": [ { "id": "host-a", "attributes": {} } ] }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{AuthorityError, RemoteAuthority};
use crate::domain::{AttributeMap, TargetSpec};

#[derive(Debug, Default, Deserialize)]
struct AuthorityDocument {
    #[serde(default)]
    process: AttributeMap,
    #[serde(default)]
    monitors: HashMap<String, Vec<TargetSpec>>,
}

/// Authority backed by a JSON file on local disk.
#[derive(Debug, Clone)]
pub struct FileAuthority {
    path: PathBuf,
}

impl FileAuthority {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<AuthorityDocument, AuthorityError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AuthorityError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| AuthorityError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl RemoteAuthority for FileAuthority {
    async fn get_process_config(&self) -> Result<AttributeMap, AuthorityError> {
        let doc = self.load().await?;
        debug!(path = %self.path.display(), attributes = doc.process.len(), "Loaded process config");
        Ok(doc.process)
    }

    async fn get_target_list(&self, selector: &str) -> Result<Vec<TargetSpec>, AuthorityError> {
        let mut doc = self.load().await?;
        Ok(doc.monitors.remove(selector).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "process": { "cycleIntervalSeconds": 60, "batchSize": "25" },
        "monitors": {
            "localhost": [
                { "id": "host-a", "attributes": { "zWinEventlogMinSeverity": 3 } },
                { "id": "host-b" }
            ],
            "remote": [ { "id": "host-c" } ]
        }
    }"#;

    #[tokio::test]
    async fn test_file_authority_reads_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.json");
        tokio::fs::write(&path, DOC).await.unwrap();

        let authority = FileAuthority::new(&path);
        let process = authority.get_process_config().await.unwrap();
        assert_eq!(process["cycleIntervalSeconds"], serde_json::json!(60));

        let targets = authority.get_target_list("localhost").await.unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id, "host-a");

        let none = authority.get_target_list("elsewhere").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_file_authority_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileAuthority::new(dir.path().join("missing.json"));
        assert!(matches!(
            missing.get_process_config().await,
            Err(AuthorityError::Unavailable(_))
        ));

        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let broken = FileAuthority::new(&path);
        assert!(matches!(
            broken.get_target_list("localhost").await,
            Err(AuthorityError::Malformed(_))
        ));
    }
}
