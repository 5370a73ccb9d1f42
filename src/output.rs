//! Result types: per-file extraction results and batch aggregates.
//!
//! A model reply becomes an [`ExtractionResult`]: either a parsed
//! [`ExtractedDocument`] or an `invalid-json` record carrying the raw text.
//! The document is a tagged union (`Single` / `Many`) so that merging a
//! file's result into a batch is an exhaustive `match`, not a runtime type
//! check on a `serde_json::Value`.

use crate::error::FileError;
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Key added to every batch entry to name its originating file.
pub const SOURCE_FILE_KEY: &str = "source_file";

/// Key used when a non-object JSON value has to be wrapped into a mapping.
pub const WRAPPED_VALUE_KEY: &str = "value";

/// Value of the `error` field of an invalid-JSON record.
pub const INVALID_JSON_KIND: &str = "invalid-json";

/// A successfully parsed model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedDocument {
    /// The model returned one JSON object.
    Single(Map<String, Value>),
    /// The model returned a JSON array; every element is a mapping.
    Many(Vec<Map<String, Value>>),
}

impl ExtractedDocument {
    /// Classify a parsed JSON value.
    ///
    /// Scalars (and non-object array elements) are wrapped as
    /// `{"value": <scalar>}` so every document entry is a mapping.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => ExtractedDocument::Single(map),
            Value::Array(items) => {
                ExtractedDocument::Many(items.into_iter().map(into_mapping).collect())
            }
            scalar => ExtractedDocument::Single(into_mapping(scalar)),
        }
    }

    /// Convert back into a plain JSON value (object or array).
    pub fn to_value(&self) -> Value {
        match self {
            ExtractedDocument::Single(map) => Value::Object(map.clone()),
            ExtractedDocument::Many(items) => {
                Value::Array(items.iter().cloned().map(Value::Object).collect())
            }
        }
    }
}

fn into_mapping(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert(WRAPPED_VALUE_KEY.to_string(), other);
            map
        }
    }
}

/// Outcome of parsing one model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    /// The (sanitised) reply parsed as JSON.
    Document(ExtractedDocument),
    /// The reply was not valid JSON after sanitisation; `raw` is the
    /// model's original text.
    InvalidJson { raw: String },
}

impl ExtractionResult {
    /// `true` when the reply could not be parsed.
    pub fn is_invalid(&self) -> bool {
        matches!(self, ExtractionResult::InvalidJson { .. })
    }

    /// JSON representation used for display and download.
    ///
    /// Invalid replies become `{"error": "invalid-json", "raw": "..."}`.
    pub fn to_value(&self) -> Value {
        match self {
            ExtractionResult::Document(doc) => doc.to_value(),
            ExtractionResult::InvalidJson { raw } => Value::Object(invalid_json_fields(raw)),
        }
    }

    /// Split into tagged batch entries, preserving element order.
    pub fn into_entries(self, source_file: &str) -> Vec<BatchEntry> {
        match self {
            ExtractionResult::Document(ExtractedDocument::Single(map)) => {
                vec![BatchEntry::data(source_file, map)]
            }
            ExtractionResult::Document(ExtractedDocument::Many(items)) => items
                .into_iter()
                .map(|map| BatchEntry::data(source_file, map))
                .collect(),
            ExtractionResult::InvalidJson { raw } => vec![BatchEntry {
                source_file: source_file.to_string(),
                record: EntryRecord::InvalidJson { raw },
            }],
        }
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

fn invalid_json_fields(raw: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("error".into(), Value::String(INVALID_JSON_KIND.into()));
    map.insert("raw".into(), Value::String(raw.to_string()));
    map
}

/// Payload of a batch entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryRecord {
    /// Extracted fields.
    Data(Map<String, Value>),
    /// The model reply for this file did not parse.
    InvalidJson { raw: String },
}

/// One element of a batch result, tagged with its source file.
///
/// Serialises as a flat JSON object: the extracted fields (or the
/// invalid-json record) plus `"source_file"`. The tag wins over a
/// model-supplied key of the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub source_file: String,
    pub record: EntryRecord,
}

impl BatchEntry {
    fn data(source_file: &str, map: Map<String, Value>) -> Self {
        Self {
            source_file: source_file.to_string(),
            record: EntryRecord::Data(map),
        }
    }

    /// Flattened JSON object for this entry.
    pub fn to_value(&self) -> Value {
        let mut map = match &self.record {
            EntryRecord::Data(fields) => fields.clone(),
            EntryRecord::InvalidJson { raw } => invalid_json_fields(raw),
        };
        map.insert(
            SOURCE_FILE_KEY.to_string(),
            Value::String(self.source_file.clone()),
        );
        Value::Object(map)
    }
}

impl Serialize for BatchEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Aggregate counters for a batch run.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct BatchStats {
    /// Files submitted.
    pub total_files: usize,
    /// Files whose reply parsed as JSON.
    pub succeeded_files: usize,
    /// Files whose reply did not parse (recorded as invalid-json entries).
    pub invalid_json_files: usize,
    /// Files whose extraction raised an error (see `failures`).
    pub failed_files: usize,
    /// Wall-clock time for the whole batch.
    pub total_duration_ms: u64,
}

/// Result of a batch run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BatchOutput {
    /// Tagged entries in input-file order.
    pub entries: Vec<BatchEntry>,
    /// Per-file failures; these files contributed no entries.
    pub failures: Vec<FileError>,
    pub stats: BatchStats,
    /// Untagged per-file results, in input-file order.
    #[serde(skip)]
    pub documents: Vec<FileOutput>,
}

impl BatchOutput {
    /// The consolidated JSON array of tagged entries.
    pub fn to_json_array(&self) -> Value {
        Value::Array(self.entries.iter().map(BatchEntry::to_value).collect())
    }

    /// The JSON offered for download or written to disk.
    ///
    /// A single-file run yields that file's own document (object, array or
    /// invalid-json record) without a `source_file` tag. Anything else,
    /// including a single file that failed, yields [`Self::to_json_array`].
    pub fn to_download_value(&self) -> Value {
        match self.documents.as_slice() {
            [only] if self.stats.total_files == 1 => only.result.to_value(),
            _ => self.to_json_array(),
        }
    }
}

/// Result of extracting a single file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileOutput {
    pub source_file: String,
    pub result: ExtractionResult,
    pub duration_ms: u64,
}
