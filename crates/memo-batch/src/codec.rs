use std::collections::BTreeMap;

use memo_core::errors::{ErrorInfo, MemoError};
use memo_core::{ResultMap, SchemaVersion, Value};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Persisted outcome of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub schema: SchemaVersion,
    /// Fingerprint of the run.
    pub id: String,
    pub result: ResultMap,
    /// Wall-clock execution time in seconds.
    pub runtime: f64,
    /// Normalized parameters, kept for provenance and result-only filtering.
    pub parameters: Option<BTreeMap<String, Value>>,
    /// RFC 3339 timestamp of the write.
    pub created_at: Option<String>,
}

impl RunRecord {
    /// Builds a record in the current schema, stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        result: ResultMap,
        runtime: f64,
        parameters: Option<BTreeMap<String, Value>>,
    ) -> Self {
        Self {
            schema: SchemaVersion::CURRENT,
            id: id.into(),
            result,
            runtime,
            parameters,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

/// Record decoded from storage, flagged when it was written in an older shape.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub record: RunRecord,
    pub upgraded: bool,
}

/// Shape accepted when reading JSON records. Older writers keyed the result as
/// `res` and stored neither schema, runtime nor parameters.
#[derive(Deserialize)]
struct StoredRecord {
    #[serde(default)]
    schema: Option<SchemaVersion>,
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "res")]
    result: ResultMap,
    #[serde(default)]
    runtime: Option<f64>,
    #[serde(default)]
    parameters: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    created_at: Option<String>,
}

impl StoredRecord {
    fn into_current(self, fingerprint: &str) -> DecodedRecord {
        let upgraded = self.schema.unwrap_or(SchemaVersion::LEGACY).is_outdated()
            || self.id.is_none()
            || self.runtime.is_none();
        DecodedRecord {
            record: RunRecord {
                schema: SchemaVersion::CURRENT,
                id: self.id.unwrap_or_else(|| fingerprint.to_string()),
                result: self.result,
                runtime: self.runtime.unwrap_or(0.0),
                parameters: self.parameters,
                created_at: self.created_at,
            },
            upgraded,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct AggregateFile {
    schema: SchemaVersion,
    records: BTreeMap<String, RunRecord>,
}

#[derive(Deserialize)]
struct StoredAggregate {
    #[serde(default)]
    schema: Option<SchemaVersion>,
    records: BTreeMap<String, StoredRecord>,
}

/// Byte-level encoding used by file stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Pretty printed JSON, tolerant of older record shapes.
    #[default]
    Json,
    /// Compact bincode. Not self-describing: records must match the current schema.
    Bincode,
}

impl Codec {
    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Bincode => "bin",
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, MemoError> {
        match self {
            Codec::Json => {
                serde_json::to_vec_pretty(value).map_err(|err| codec_error("json-encode", err))
            }
            Codec::Bincode => {
                bincode::serialize(value).map_err(|err| codec_error("bincode-encode", err))
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, MemoError> {
        match self {
            Codec::Json => {
                serde_json::from_slice(bytes).map_err(|err| codec_error("json-decode", err))
            }
            Codec::Bincode => {
                bincode::deserialize(bytes).map_err(|err| codec_error("bincode-decode", err))
            }
        }
    }

    /// Decodes a single run record stored under `fingerprint`.
    pub fn decode_record(
        &self,
        bytes: &[u8],
        fingerprint: &str,
    ) -> Result<DecodedRecord, MemoError> {
        match self {
            Codec::Json => {
                let stored: StoredRecord = self.decode(bytes)?;
                Ok(stored.into_current(fingerprint))
            }
            Codec::Bincode => Ok(DecodedRecord {
                record: self.decode(bytes)?,
                upgraded: false,
            }),
        }
    }

    pub(crate) fn encode_aggregate(
        &self,
        records: &BTreeMap<String, RunRecord>,
    ) -> Result<Vec<u8>, MemoError> {
        #[derive(Serialize)]
        struct AggregateRef<'a> {
            schema: SchemaVersion,
            records: &'a BTreeMap<String, RunRecord>,
        }
        self.encode(&AggregateRef {
            schema: SchemaVersion::CURRENT,
            records,
        })
    }

    /// Decodes a whole-batch file. The flag reports whether any record was upgraded.
    pub(crate) fn decode_aggregate(
        &self,
        bytes: &[u8],
    ) -> Result<(BTreeMap<String, RunRecord>, bool), MemoError> {
        match self {
            Codec::Json => {
                let stored: StoredAggregate = self.decode(bytes)?;
                let mut upgraded = stored.schema.unwrap_or(SchemaVersion::LEGACY).is_outdated();
                let mut records = BTreeMap::new();
                for (fingerprint, record) in stored.records {
                    let decoded = record.into_current(&fingerprint);
                    upgraded |= decoded.upgraded;
                    records.insert(fingerprint, decoded.record);
                }
                Ok((records, upgraded))
            }
            Codec::Bincode => {
                let file: AggregateFile = self.decode(bytes)?;
                Ok((file.records, false))
            }
        }
    }
}

fn codec_error(code: &str, err: impl ToString) -> MemoError {
    MemoError::Serde(ErrorInfo::new(code, err.to_string()))
}
