//! Value types flowing between the stream and its caller

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::error::MalformedPayload;

/// A single record read from (or about to be written to) a shard.
///
/// Immutable once constructed. The payload is kept as raw bytes; callers that
/// expect JSON can decode through [`Record::payload_json`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    sequence_number: String,
    partition_key: String,
    approximate_arrival: Option<DateTime<Utc>>,
    data: Bytes,
}

impl Record {
    pub fn new(
        sequence_number: impl Into<String>,
        partition_key: impl Into<String>,
        approximate_arrival: Option<DateTime<Utc>>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            sequence_number: sequence_number.into(),
            partition_key: partition_key.into(),
            approximate_arrival,
            data: data.into(),
        }
    }

    /// Opaque position of this record within its shard. Doubles as the
    /// checkpoint value once the record has been consumed.
    pub fn sequence_number(&self) -> &str {
        &self.sequence_number
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Server-side arrival time, when the backend reported one.
    pub fn approximate_arrival(&self) -> Option<DateTime<Utc>> {
        self.approximate_arrival
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decode the payload as JSON.
    ///
    /// Distinguishes the three payload states explicitly: `Ok(None)` for an
    /// empty payload, `Ok(Some(value))` for a well-formed one, and
    /// `Err(MalformedPayload)` for bytes that do not parse. Decoding never
    /// touches the read loop, so one bad record cannot abort the stream.
    pub fn payload_json<T: DeserializeOwned>(&self) -> Result<Option<T>, MalformedPayload> {
        if self.data.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&self.data)?))
    }
}

/// One entry of a `put_batch` request: a payload paired with the partition
/// key that determines its shard placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PutRecordEntry {
    pub partition_key: String,
    pub data: Bytes,
}

impl PutRecordEntry {
    pub fn new(partition_key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            partition_key: partition_key.into(),
            data: data.into(),
        }
    }
}

/// Per-entry result of a batched publish, in request order.
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcomeEntry {
    Accepted {
        sequence_number: String,
        shard_id: String,
    },
    Rejected {
        code: String,
        message: String,
    },
}

/// Outcome of a `put_batch` call.
///
/// The backend may accept part of a batch; that partial failure is passed
/// through as-is rather than retried, so the caller decides what to do with
/// the rejected entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutRecordsOutcome {
    /// One entry per input record, preserving input order.
    pub entries: Vec<PutOutcomeEntry>,
    /// Number of rejected entries, as reported by the backend.
    pub failed: usize,
}

impl PutRecordsOutcome {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Event {
        id: String,
        body: String,
    }

    fn record_with_data(data: &[u8]) -> Record {
        Record::new("seq-1", "key-1", Some(Utc::now()), data.to_vec())
    }

    #[test]
    fn payload_json_decodes_well_formed_payload() {
        let record = record_with_data(br#"{"id":"1","body":"hello"}"#);
        let event: Option<Event> = record.payload_json().unwrap();
        assert_eq!(
            event,
            Some(Event {
                id: "1".to_string(),
                body: "hello".to_string()
            })
        );
    }

    #[test]
    fn payload_json_reports_missing_payload_as_none() {
        let record = record_with_data(b"");
        let event: Option<Event> = record.payload_json().unwrap();
        assert_eq!(event, None);
    }

    #[test]
    fn payload_json_rejects_malformed_payload() {
        let record = record_with_data(b"this is not JSON");
        let result: Result<Option<Event>, _> = record.payload_json();
        assert!(result.is_err());
    }

    #[test]
    fn outcome_reports_failures() {
        let outcome = PutRecordsOutcome {
            entries: vec![PutOutcomeEntry::Rejected {
                code: "ProvisionedThroughputExceededException".to_string(),
                message: "slow down".to_string(),
            }],
            failed: 1,
        };
        assert!(outcome.has_failures());
        assert!(!PutRecordsOutcome::default().has_failures());
    }
}
