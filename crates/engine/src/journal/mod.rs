//! Execution journal: the persistent record of what already happened on-chain.
//!
//! Every chain-mutating action executes at most once per identifier for the
//! lifetime of a journal. `Completed` records are write-once; overwriting one
//! with a different outcome is an [`JournalError::InconsistentReplay`], which
//! guards against a module being redefined incompatibly between runs.
//! `Failed` records may be replaced, since a later run retries the action
//! from scratch.

mod file;

pub use file::FileJournal;

use std::collections::BTreeMap;

use alloy_core::primitives::B256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JournalError;
use crate::module::{ActionId, ArgValue};

/// Completion status of a journaled action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordStatus {
    Completed,
    Failed,
}

/// Journal entry for a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub status: RecordStatus,
    /// The action's result: an address for deploys and binds, calldata for
    /// encodings, the decoded value for event reads. `None` for plain calls
    /// and for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ArgValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// SHA-256 digest of the action definition that produced this record.
    pub digest: String,
    pub recorded_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn completed(result: Option<ArgValue>, tx_hash: Option<B256>, digest: String) -> Self {
        Self {
            status: RecordStatus::Completed,
            result,
            tx_hash,
            error: None,
            digest,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(error: String, digest: String) -> Self {
        Self {
            status: RecordStatus::Failed,
            result: None,
            tx_hash: None,
            error: Some(error),
            digest,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RecordStatus::Completed
    }

    /// Whether two records describe the same outcome (timestamps ignored).
    pub(crate) fn same_outcome(&self, other: &Self) -> bool {
        self.status == other.status
            && self.result == other.result
            && self.tx_hash == other.tx_hash
            && self.digest == other.digest
    }
}

/// Persistent store of per-action execution state.
///
/// The journal is the sole source of truth for "has this already happened
/// on-chain"; it outlives any single process run and is keyed by stable
/// action identifiers.
pub trait Journal {
    /// All records, keyed by action identifier.
    fn entries(&self) -> &BTreeMap<ActionId, ExecutionRecord>;

    /// Record the outcome of an action. Write-once for `Completed` records.
    fn put(&mut self, id: &ActionId, record: ExecutionRecord) -> Result<(), JournalError>;

    /// Drop the record for `id`, allowing an explicit redeploy.
    fn reset(&mut self, id: &ActionId) -> Result<(), JournalError>;

    /// Drop every record.
    fn reset_all(&mut self) -> Result<(), JournalError>;

    fn get(&self, id: &ActionId) -> Option<&ExecutionRecord> {
        self.entries().get(id)
    }
}

/// Enforce the write-once rule against an existing record set.
///
/// Returns `false` when the put is an identical no-op replay.
pub(crate) fn guard_write_once(
    records: &BTreeMap<ActionId, ExecutionRecord>,
    id: &ActionId,
    record: &ExecutionRecord,
) -> Result<bool, JournalError> {
    match records.get(id) {
        Some(existing) if existing.is_completed() => {
            if existing.same_outcome(record) {
                Ok(false)
            } else {
                Err(JournalError::InconsistentReplay { id: id.clone() })
            }
        }
        _ => Ok(true),
    }
}

/// In-memory journal for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    records: BTreeMap<ActionId, ExecutionRecord>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Journal for MemoryJournal {
    fn entries(&self) -> &BTreeMap<ActionId, ExecutionRecord> {
        &self.records
    }

    fn put(&mut self, id: &ActionId, record: ExecutionRecord) -> Result<(), JournalError> {
        if guard_write_once(&self.records, id, &record)? {
            self.records.insert(id.clone(), record);
        }
        Ok(())
    }

    fn reset(&mut self, id: &ActionId) -> Result<(), JournalError> {
        self.records.remove(id);
        Ok(())
    }

    fn reset_all(&mut self) -> Result<(), JournalError> {
        self.records.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::Address;

    use super::*;

    fn id(s: &str) -> ActionId {
        ActionId::new("M", s)
    }

    fn completed_at(address: &str) -> ExecutionRecord {
        ExecutionRecord::completed(
            Some(ArgValue::Address(address.parse::<Address>().expect("valid address"))),
            None,
            "digest-a".to_string(),
        )
    }

    #[test]
    fn completed_records_are_write_once() {
        let mut journal = MemoryJournal::new();
        let original = completed_at("0x00000000000000000000000000000000000000aa");
        journal.put(&id("Token"), original.clone()).expect("first write");

        let err = journal
            .put(
                &id("Token"),
                completed_at("0x00000000000000000000000000000000000000bb"),
            )
            .expect_err("different result must be rejected");
        assert!(matches!(err, JournalError::InconsistentReplay { .. }));

        // The stored value is unchanged.
        assert_eq!(journal.get(&id("Token")), Some(&original));
    }

    #[test]
    fn identical_replay_is_a_no_op() {
        let mut journal = MemoryJournal::new();
        let record = completed_at("0x00000000000000000000000000000000000000aa");
        journal.put(&id("Token"), record.clone()).expect("first write");
        journal
            .put(&id("Token"), record.clone())
            .expect("same outcome is accepted");
        assert_eq!(journal.entries().len(), 1);
    }

    #[test]
    fn failed_records_may_be_replaced() {
        let mut journal = MemoryJournal::new();
        journal
            .put(
                &id("Token"),
                ExecutionRecord::failed("revert".to_string(), "digest-a".to_string()),
            )
            .expect("failure recorded");
        journal
            .put(
                &id("Token"),
                completed_at("0x00000000000000000000000000000000000000aa"),
            )
            .expect("a retry may complete a previously failed action");
        assert!(journal.get(&id("Token")).expect("record exists").is_completed());
    }

    #[test]
    fn reset_allows_redeployment() {
        let mut journal = MemoryJournal::new();
        journal
            .put(
                &id("Token"),
                completed_at("0x00000000000000000000000000000000000000aa"),
            )
            .expect("recorded");
        journal.reset(&id("Token")).expect("reset");
        journal
            .put(
                &id("Token"),
                completed_at("0x00000000000000000000000000000000000000bb"),
            )
            .expect("post-reset write succeeds");
    }
}
