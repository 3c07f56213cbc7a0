//! Board export/import file handling.
//!
//! # Responsibility
//! - Export every persisted record as one JSON array document.
//! - Stage, migrate, and validate import files before any mutation.
//!
//! # Invariants
//! - Import parses and validates completely first; a failing file leaves
//!   prior state untouched.
//! - Legacy files (numeric ids) are structurally migrated exactly once,
//!   including layout references.

use crate::card::{registry, Card};
use crate::layout::{LayoutTree, GRID_LAYOUT_RECORD_ID};
use crate::model::card::{kind_of_id, JsonMap};
use crate::store::{StorageGateway, StoreError};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static LEGACY_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+$").expect("valid legacy id regex"));

pub type TransferResult<T> = Result<T, TransferError>;

/// Errors from export/import handling.
#[derive(Debug)]
pub enum TransferError {
    Parse(String),
    /// The document root is not a JSON array of records.
    NotAnArray,
    RecordNotObject(usize),
    MissingId(usize),
    /// A staged card record would not load.
    InvalidCard { id: String, message: String },
    Store(StoreError),
}

impl Display for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "transfer file does not parse: {message}"),
            Self::NotAnArray => write!(f, "transfer file must be a JSON array of records"),
            Self::RecordNotObject(index) => {
                write!(f, "transfer record {index} is not a JSON object")
            }
            Self::MissingId(index) => {
                write!(f, "transfer record {index} is missing a string id")
            }
            Self::InvalidCard { id, message } => {
                write!(f, "transfer card record `{id}` is invalid: {message}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for TransferError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Exports every persisted record as a pretty-printed JSON array.
///
/// Binary audio payloads come out base64-encoded because that is the
/// record-layer serde shape.
pub fn export_json(store: &dyn StorageGateway) -> TransferResult<String> {
    let bodies = store.list_all()?;
    let array = Value::Array(bodies.into_iter().map(Value::Object).collect());
    serde_json::to_string_pretty(&array).map_err(|err| TransferError::Parse(err.to_string()))
}

/// Fully validated import payload, ready to commit.
#[derive(Debug)]
pub struct StagedImport {
    /// `(record id, body)` pairs in file order.
    pub records: Vec<(String, JsonMap)>,
    /// Number of legacy records renamed during migration.
    pub migrated: usize,
}

/// Parses, migrates, and validates one import file without touching storage.
pub fn parse_import(text: &str) -> TransferResult<StagedImport> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| TransferError::Parse(err.to_string()))?;
    let Value::Array(items) = value else {
        return Err(TransferError::NotAnArray);
    };

    let mut bodies = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => bodies.push(map),
            _ => return Err(TransferError::RecordNotObject(index)),
        }
    }

    let migrated = migrate_legacy(&mut bodies);

    let mut records = Vec::with_capacity(bodies.len());
    for (index, body) in bodies.into_iter().enumerate() {
        let Some(id) = body
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
        else {
            return Err(TransferError::MissingId(index));
        };

        match kind_of_id(&id) {
            Some(kind) => {
                let Some(factory) = registry::resolve(kind) else {
                    return Err(TransferError::InvalidCard {
                        id,
                        message: format!("no implementation for kind `{kind}`"),
                    });
                };
                if let Err(err) = Card::from_persisted(factory, &body) {
                    return Err(TransferError::InvalidCard {
                        id,
                        message: err.to_string(),
                    });
                }
            }
            None => {
                if id == GRID_LAYOUT_RECORD_ID
                    && LayoutTree::from_record_map(body.clone()).is_err()
                {
                    // A layout the current generation cannot read is dropped;
                    // the board rebuilds a reconciled default on load.
                    warn!(
                        "event=import_stage module=transfer status=layout_dropped id={id}"
                    );
                    continue;
                }
            }
        }

        records.push((id, body));
    }

    Ok(StagedImport { records, migrated })
}

/// Commits a staged import: clears both partitions, saves every record.
pub fn apply_import(store: &mut dyn StorageGateway, staged: &StagedImport) -> TransferResult<()> {
    store.clear()?;
    for (id, body) in &staged.records {
        store.save(id, body)?;
    }
    Ok(())
}

/// Detects and rewrites the first-generation record shape in place.
///
/// Legacy records carry bare numeric ids (array indices); they become
/// `sound-<id>` records, and layout references are re-pointed.
fn migrate_legacy(bodies: &mut [JsonMap]) -> usize {
    let mut mapping: BTreeMap<String, String> = BTreeMap::new();

    for body in bodies.iter_mut() {
        let legacy_key = match body.get("id") {
            Some(Value::Number(number)) => Some(number.to_string()),
            Some(Value::String(text)) if LEGACY_ID_RE.is_match(text) => Some(text.clone()),
            _ => None,
        };
        let Some(legacy_key) = legacy_key else {
            continue;
        };

        let new_id = format!("sound-{legacy_key}");
        body.insert("id".to_string(), json!(new_id));
        if !body.contains_key("type") {
            body.insert("type".to_string(), json!("sound"));
        }
        mapping.insert(legacy_key, new_id);
    }

    if mapping.is_empty() {
        return 0;
    }

    for body in bodies.iter_mut() {
        if body.get("id").and_then(Value::as_str) == Some(GRID_LAYOUT_RECORD_ID) {
            if let Some(layout) = body.get_mut("layout") {
                rewrite_node_ids(layout, &mapping);
            }
        }
    }

    mapping.len()
}

fn rewrite_node_ids(value: &mut Value, mapping: &BTreeMap<String, String>) {
    let Value::Object(map) = value else {
        return;
    };

    let legacy_key = match map.get("id") {
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::String(text)) => Some(text.clone()),
        _ => None,
    };
    if let Some(new_id) = legacy_key.and_then(|key| mapping.get(&key)) {
        map.insert("id".to_string(), json!(new_id));
        if !map.contains_key("type") {
            map.insert("type".to_string(), json!("sound"));
        }
    }

    if let Some(children) = map.get_mut("children").and_then(Value::as_array_mut) {
        for child in children {
            rewrite_node_ids(child, mapping);
        }
    }
}
