//! File-backed journal.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::{ExecutionRecord, Journal, guard_write_once};
use crate::error::JournalError;
use crate::module::ActionId;

/// File name of the journal inside a deployment directory.
pub const JOURNAL_FILENAME: &str = "journal.json";
const LOCK_FILENAME: &str = "journal.lock";

/// Journal persisted as pretty JSON inside a deployment directory.
///
/// An advisory lock on a sibling lock file keeps two concurrent runs of the
/// same deployment from interleaving writes; the lock is released when the
/// journal is dropped. Every `put` flushes atomically (temp file + rename),
/// so an interrupted run leaves a valid journal behind and the next run
/// resumes exactly after the last completed action.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    records: BTreeMap<ActionId, ExecutionRecord>,
    _lock: File,
}

impl FileJournal {
    /// Open (or create) the journal in `dir`, taking the deployment lock.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, JournalError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(dir.join(LOCK_FILENAME))?;
        lock.try_lock_exclusive()
            .map_err(|_| JournalError::Locked {
                path: dir.to_path_buf(),
            })?;

        let path = dir.join(JOURNAL_FILENAME);
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|source| JournalError::Corrupt {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), records = records.len(), "Journal opened");

        Ok(Self {
            path,
            records,
            _lock: lock,
        })
    }

    /// Path of the backing journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), JournalError> {
        let json = serde_json::to_string_pretty(&self.records)
            .expect("journal records always serialize");
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Journal for FileJournal {
    fn entries(&self) -> &BTreeMap<ActionId, ExecutionRecord> {
        &self.records
    }

    fn put(&mut self, id: &ActionId, record: ExecutionRecord) -> Result<(), JournalError> {
        if guard_write_once(&self.records, id, &record)? {
            self.records.insert(id.clone(), record);
            self.flush()?;
        }
        Ok(())
    }

    fn reset(&mut self, id: &ActionId) -> Result<(), JournalError> {
        if self.records.remove(id).is_some() {
            self.flush()?;
            tracing::info!(action = %id, "Journal record wiped");
        }
        Ok(())
    }

    fn reset_all(&mut self) -> Result<(), JournalError> {
        self.records.clear();
        self.flush()?;
        tracing::info!(path = %self.path.display(), "Journal wiped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::Address;
    use tempdir::TempDir;

    use super::*;
    use crate::module::ArgValue;

    fn id(s: &str) -> ActionId {
        ActionId::new("M", s)
    }

    fn record() -> ExecutionRecord {
        ExecutionRecord::completed(
            Some(ArgValue::Address(Address::repeat_byte(0xaa))),
            None,
            "digest".to_string(),
        )
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new("embark-journal").expect("temp dir");

        {
            let mut journal = FileJournal::open(dir.path()).expect("open");
            journal.put(&id("Token"), record()).expect("write");
        }

        let journal = FileJournal::open(dir.path()).expect("reopen");
        let loaded = journal.get(&id("Token")).expect("record persisted");
        assert!(loaded.is_completed());
        assert_eq!(
            loaded.result,
            Some(ArgValue::Address(Address::repeat_byte(0xaa)))
        );
    }

    #[test]
    fn second_open_of_a_live_journal_is_refused() {
        let dir = TempDir::new("embark-journal").expect("temp dir");
        let _held = FileJournal::open(dir.path()).expect("open");

        let err = FileJournal::open(dir.path()).expect_err("lock must be exclusive");
        assert!(matches!(err, JournalError::Locked { .. }));
    }

    #[test]
    fn corrupt_journal_is_reported_not_clobbered() {
        let dir = TempDir::new("embark-journal").expect("temp dir");
        std::fs::write(dir.path().join(JOURNAL_FILENAME), "{ not json").expect("write garbage");

        let err = FileJournal::open(dir.path()).expect_err("corrupt journal must not load");
        assert!(matches!(err, JournalError::Corrupt { .. }));
    }

    #[test]
    fn write_once_applies_to_the_file_backend_too() {
        let dir = TempDir::new("embark-journal").expect("temp dir");
        let mut journal = FileJournal::open(dir.path()).expect("open");
        journal.put(&id("Token"), record()).expect("write");

        let conflicting = ExecutionRecord::completed(
            Some(ArgValue::Address(Address::repeat_byte(0xbb))),
            None,
            "digest".to_string(),
        );
        let err = journal
            .put(&id("Token"), conflicting)
            .expect_err("conflicting result rejected");
        assert!(matches!(err, JournalError::InconsistentReplay { .. }));
    }
}
