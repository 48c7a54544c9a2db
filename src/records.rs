//! Owned record table shared by the query path and the admin API.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::debug;

/// Address record payload for one owned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Address", alias = "address")]
    pub address: Ipv4Addr,
    #[serde(rename = "TTL", alias = "ttl")]
    pub ttl: u32,
}

/// Creation payload of the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRecord {
    #[serde(flatten)]
    pub record: Record,
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
}

/// Zone-relative name to record mapping. Keys are stored lower-case.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: RwLock<HashMap<String, Record>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: HashMap<String, Record>) -> Self {
        let records = records
            .into_iter()
            .map(|(name, record)| (name.to_lowercase(), record))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn get(&self, name: &str) -> Option<Record> {
        self.records.read().get(&name.to_lowercase()).copied()
    }

    /// Inserts or replaces; returns the previous record.
    pub fn set(&self, name: &str, record: Record) -> Option<Record> {
        let name = name.to_lowercase();
        debug!("Setting record {} -> {} (ttl {})", name, record.address, record.ttl);
        self.records.write().insert(name, record)
    }

    /// Removes the record if present.
    pub fn delete(&self, name: &str) -> Option<Record> {
        let name = name.to_lowercase();
        debug!("Deleting record {}", name);
        self.records.write().remove(&name)
    }

    /// Point-in-time copy of the whole table.
    pub fn snapshot(&self) -> HashMap<String, Record> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

/// Checks that `name` is a usable zone-relative key for `zone` and returns it
/// lower-cased. Rejects empty names, fully-qualified names and names that
/// still carry the zone suffix.
pub fn record_key(name: &str, zone: &str) -> Option<String> {
    let name = name.trim().to_lowercase();
    let zone = zone.trim_end_matches('.').to_lowercase();
    if name.is_empty() || name.ends_with('.') || name.starts_with('.') || name.contains("..") {
        return None;
    }
    if !zone.is_empty() && (name == zone || name.ends_with(&format!(".{}", zone))) {
        return None;
    }
    Some(name)
}
