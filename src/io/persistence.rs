//! Zone state persistence
//!
//! The engine only depends on `PersistenceGateway`. `JsonFileStore` keeps every
//! zone's last committed state in a single JSON document, rewritten atomically
//! (temp file + rename) on each save.

use crate::domain::error::PersistenceError;
use crate::domain::types::{RawZoneDetails, ZoneId, ZoneStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// State restored at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedZone {
    pub name: String,
    pub status: ZoneStatus,
    #[serde(default)]
    pub offline_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Option<RawZoneDetails>,
}

/// State written on every committed transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub zone_id: ZoneId,
    pub status: ZoneStatus,
    pub name: String,
    pub details: Option<RawZoneDetails>,
    pub offline_since: Option<DateTime<Utc>>,
    pub group_name: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn load_all(&self) -> Result<FxHashMap<ZoneId, SavedZone>, PersistenceError>;

    async fn save(&self, record: ZoneRecord) -> Result<(), PersistenceError>;
}

/// Single-file JSON store
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!(path = %path.display(), "json_store_initialized");
        Self { path, lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<BTreeMap<ZoneId, ZoneRecord>, PersistenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(
        &self,
        document: &BTreeMap<ZoneId, ZoneRecord>,
    ) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = %json.len(), "json_store_written");
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for JsonFileStore {
    async fn load_all(&self) -> Result<FxHashMap<ZoneId, SavedZone>, PersistenceError> {
        let _guard = self.lock.lock().await;
        let document = self.read_document().await?;

        Ok(document
            .into_iter()
            .map(|(id, record)| {
                let saved = SavedZone {
                    name: record.name,
                    status: record.status,
                    offline_since: record.offline_since,
                    details: record.details,
                };
                (id, saved)
            })
            .collect())
    }

    async fn save(&self, record: ZoneRecord) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(record.zone_id.clone(), record);
        self.write_document(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record(id: &str, status: ZoneStatus) -> ZoneRecord {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ZoneRecord {
            zone_id: ZoneId::from(id),
            status,
            name: format!("Hotel - {id}"),
            details: Some(RawZoneDetails::healthy()),
            offline_since: (status == ZoneStatus::Offline).then_some(at),
            group_name: "Hotel".to_string(),
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("zones.json"));
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state/zones.json"));

        store.save(record("a", ZoneStatus::Online)).await.unwrap();
        store.save(record("b", ZoneStatus::Offline)).await.unwrap();
        store.save(record("a", ZoneStatus::Expired)).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[&ZoneId::from("a")].status, ZoneStatus::Expired);
        assert!(loaded[&ZoneId::from("b")].offline_since.is_some());
        assert_eq!(loaded[&ZoneId::from("b")].name, "Hotel - b");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zones.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load_all().await, Err(PersistenceError::Encoding(_))));
    }
}
