use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::store::StoredRecord;

/// Timestamp format of files written before timestamps were RFC 3339.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Every VPS in a legacy file was built from this image.
const LEGACY_IMAGE: &str = "ubuntu:22.04";

/// Last observed state of the backing container. Updated opportunistically,
/// the container runtime stays authoritative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VpsStatus {
    #[default]
    Running,
    Stopped,
}

impl fmt::Display for VpsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VpsStatus::Running => f.write_str("running"),
            VpsStatus::Stopped => f.write_str("stopped"),
        }
    }
}

/// Resources requested for a VPS. Memory and disk are in gigabytes; disk is
/// recorded but not enforced by the runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceQuota {
    pub ram: u32,
    pub cpu: u32,
    pub disk: u32,
}

/// Represents one provisioned container and its access credentials.
/// Corresponds to one entry of `vps_data.json`, keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VpsRecord {
    pub id: String,
    pub owner_id: String,
    pub container_id: String,
    pub container_name: String,
    pub image: String,
    #[serde(flatten)]
    pub quota: ResourceQuota,
    pub username: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub status: VpsStatus,
    #[serde(default)]
    pub tmate_session: Option<String>,
}

impl VpsRecord {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

impl StoredRecord for VpsRecord {
    fn key(&self) -> &str {
        &self.id
    }

    /// Legacy files key each record by its owner's user id and lack the
    /// owner, container name and image fields. Their `created_at` is a naive
    /// timestamp, read as UTC.
    fn backfill(key: &str, raw: &mut Map<String, Value>) -> bool {
        let mut changed = false;
        let id = match raw.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                raw.insert("id".to_string(), Value::String(key.to_string()));
                changed = true;
                key.to_string()
            }
        };

        if !raw.contains_key("owner_id") {
            let owner = match raw.get("created_by") {
                Some(created_by) => Some(created_by.clone()),
                None if key != id => Some(Value::String(key.to_string())),
                None => None,
            };
            if let Some(owner) = owner {
                raw.insert("owner_id".to_string(), owner);
                changed = true;
            }
        }
        if !raw.contains_key("container_name") {
            raw.insert("container_name".to_string(), Value::String(format!("vps_{id}")));
            changed = true;
        }
        if !raw.contains_key("image") {
            raw.insert("image".to_string(), Value::String(LEGACY_IMAGE.to_string()));
            changed = true;
        }

        let created_at = raw.get("created_at").and_then(Value::as_str);
        let needs_timestamp = match created_at {
            Some(text) => DateTime::parse_from_rfc3339(text).is_err(),
            None => true,
        };
        if needs_timestamp {
            let parsed = created_at
                .and_then(|text| NaiveDateTime::parse_from_str(text, LEGACY_TIMESTAMP_FORMAT).ok())
                .map(|naive| naive.and_utc())
                .unwrap_or_else(Utc::now);
            raw.insert("created_at".to_string(), Value::String(parsed.to_rfc3339()));
            changed = true;
        }

        if !raw.contains_key("status") {
            raw.insert("status".to_string(), Value::String("running".to_string()));
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_flat_quota_fields() {
        let record = VpsRecord {
            id: "AB12CD34".to_string(),
            owner_id: "1001".to_string(),
            container_id: "c0ffee".to_string(),
            container_name: "vps_AB12CD34".to_string(),
            image: "ubuntu:22.04".to_string(),
            quota: ResourceQuota { ram: 2, cpu: 1, disk: 5 },
            username: "alice".to_string(),
            password: "secret".to_string(),
            created_at: Utc::now(),
            status: VpsStatus::Stopped,
            tmate_session: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["ram"], 2);
        assert_eq!(value["disk"], 5);
        assert_eq!(value["status"], "stopped");
    }

    #[test]
    fn test_backfill_adds_missing_fields_once() {
        let mut raw: Map<String, Value> = serde_json::from_str(
            r#"{"id":"X","created_by":"77","container_id":"c","ram":1,"cpu":1,"disk":1}"#,
        )
        .unwrap();
        assert!(VpsRecord::backfill("X", &mut raw));
        assert_eq!(raw["owner_id"], "77");
        assert_eq!(raw["status"], "running");
        assert_eq!(raw["container_name"], "vps_X");
        assert!(raw.contains_key("created_at"));
        assert!(!VpsRecord::backfill("X", &mut raw));
    }

    #[test]
    fn test_backfill_reads_naive_timestamp_and_owner_key() {
        let mut raw: Map<String, Value> = serde_json::from_str(
            r#"{"id":"ab12cd34","container_id":"c0ffee","ram":6,"cpu":2,"disk":20,
                "username":"@alice","password":"pw","created_at":"2024-01-01 12:00:00",
                "status":"stopped"}"#,
        )
        .unwrap();
        assert!(VpsRecord::backfill("1001", &mut raw));

        let record: VpsRecord = serde_json::from_value(Value::Object(raw)).unwrap();
        assert_eq!(record.owner_id, "1001");
        assert_eq!(record.image, "ubuntu:22.04");
        assert_eq!(record.status, VpsStatus::Stopped);
        assert_eq!(record.created_at.to_rfc3339(), "2024-01-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn test_legacy_store_file_loads() {
        use crate::db::{JsonFileStore, Store};

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("vps_data.json");
        std::fs::write(
            &path,
            r#"{
    "1001": {
        "id": "ab12cd34",
        "container_id": "c0ffee",
        "ram": 6,
        "cpu": 2,
        "disk": 20,
        "username": "@alice",
        "password": "Xy7aB9qWerTy",
        "created_at": "2024-01-01 12:00:00",
        "status": "running",
        "tmate_session": "ssh Xy7aB9@nyc1.tmate.io"
    },
    "2002": {
        "id": "ef56gh78",
        "container_id": "deadbeef",
        "ram": 4,
        "cpu": 1,
        "disk": 10,
        "username": "@bob",
        "password": "Qw3rTy6uIoPa",
        "created_at": "2024-02-03 04:05:06",
        "status": "running"
    }
}"#,
        )
        .unwrap();

        let store = JsonFileStore::<VpsRecord>::open(&path).await.unwrap();
        let alice = store.get("ab12cd34").await.unwrap().unwrap();
        assert_eq!(alice.owner_id, "1001");
        assert_eq!(alice.container_name, "vps_ab12cd34");
        assert_eq!(alice.quota, ResourceQuota { ram: 6, cpu: 2, disk: 20 });
        assert_eq!(alice.tmate_session.as_deref(), Some("ssh Xy7aB9@nyc1.tmate.io"));
        assert_eq!(store.get("ef56gh78").await.unwrap().unwrap().owner_id, "2002");
        assert_eq!(store.get("1001").await.unwrap(), None);

        // The converted file loads again without changes.
        let reopened = JsonFileStore::<VpsRecord>::open(&path).await.unwrap();
        assert_eq!(reopened.get("ab12cd34").await.unwrap(), Some(alice));
        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let stamp = on_disk["ab12cd34"]["created_at"].as_str().unwrap();
        assert!(stamp.starts_with("2024-01-01T12:00:00"));
        assert!(on_disk.get("1001").is_none());
    }
}
