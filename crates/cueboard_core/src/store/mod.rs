//! Storage gateway contract and in-memory implementation.
//!
//! # Responsibility
//! - Define the key/value persistence contract the core consumes.
//! - Route record ids to logical partitions by prefix convention.
//!
//! # Invariants
//! - Ids with a known card-type prefix route to the cards partition, all
//!   else to the config partition.
//! - `list` results are in deterministic ascending id order.
//! - Deleting an absent id is not an error.

use crate::model::card::{kind_of_id, JsonMap};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod sqlite;

pub use sqlite::{open_store, open_store_in_memory, SqliteStore};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from storage gateway operations.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// Persisted body cannot be read back as a JSON object.
    Corrupt { id: String, message: String },
    /// Schema version in the file is newer than this binary supports.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Corrupt { id, message } => {
                write!(f, "corrupt record `{id}`: {message}")
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Corrupt { .. } => None,
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Logical record partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    /// Card records (`sound-*`, `timer-*`, `notepad-*`).
    Cards,
    /// Everything else: layout, board title, theme.
    Config,
}

impl Partition {
    /// Routes one id by its prefix.
    pub fn for_id(id: &str) -> Self {
        if kind_of_id(id).is_some() {
            Self::Cards
        } else {
            Self::Config
        }
    }

    /// Stable string value stored alongside each record.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cards => "cards",
            Self::Config => "config",
        }
    }
}

/// Key/value persistence contract consumed by the board core.
///
/// Record bodies are plain JSON objects; callers own their meaning.
pub trait StorageGateway {
    /// Loads one record body by id.
    fn get(&self, id: &str) -> StoreResult<Option<JsonMap>>;
    /// Upserts one record body under id.
    fn save(&mut self, id: &str, body: &JsonMap) -> StoreResult<()>;
    /// Removes one record; absent ids are a successful no-op.
    fn delete(&mut self, id: &str) -> StoreResult<()>;
    /// Lists every record body in one partition, ascending id order.
    fn list(&self, partition: Partition) -> StoreResult<Vec<JsonMap>>;
    /// Lists every record body across both partitions, ascending id order.
    fn list_all(&self) -> StoreResult<Vec<JsonMap>>;
    /// Removes every record in both partitions.
    fn clear(&mut self) -> StoreResult<()>;
}

/// `BTreeMap`-backed gateway for tests and lightweight embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, JsonMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl StorageGateway for MemoryStore {
    fn get(&self, id: &str) -> StoreResult<Option<JsonMap>> {
        Ok(self.records.get(id).cloned())
    }

    fn save(&mut self, id: &str, body: &JsonMap) -> StoreResult<()> {
        self.records.insert(id.to_string(), body.clone());
        Ok(())
    }

    fn delete(&mut self, id: &str) -> StoreResult<()> {
        self.records.remove(id);
        Ok(())
    }

    fn list(&self, partition: Partition) -> StoreResult<Vec<JsonMap>> {
        Ok(self
            .records
            .iter()
            .filter(|(id, _)| Partition::for_id(id) == partition)
            .map(|(_, body)| body.clone())
            .collect())
    }

    fn list_all(&self) -> StoreResult<Vec<JsonMap>> {
        Ok(self.records.values().cloned().collect())
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.records.clear();
        Ok(())
    }
}
