use super::engine::StorageEngine;
use super::memory::InMemoryStorage;
use super::persistence::{DurabilityMode, Journal, WalEntry, WalManager};
use crate::context::Change;
use crate::core::{EntitySchema, ObjectId, Record, Result, StoreError};
use crate::query::FetchRequest;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use tracing::{Level, event, info_span};

/// File-backed engine: an [`InMemoryStorage`] whose commits are journaled
/// to a write-ahead log and periodically checkpointed into a snapshot.
///
/// Files live in `data_dir` as `<name>.wal` and `<name>.snapshot`. Nothing
/// touches the disk until [`StorageEngine::load`] is called.
pub struct DurableStorage {
    name: String,
    data_dir: PathBuf,
    durability: DurabilityMode,
    checkpoint_threshold: usize,
    journal: Option<Journal>,
    memory: InMemoryStorage,
}

impl DurableStorage {
    pub fn new(name: impl Into<String>, data_dir: impl AsRef<Path>, durability: DurabilityMode) -> Self {
        Self {
            name: name.into(),
            data_dir: data_dir.as_ref().to_path_buf(),
            durability,
            checkpoint_threshold: WalManager::DEFAULT_CHECKPOINT_THRESHOLD,
            journal: None,
            memory: InMemoryStorage::new(),
        }
    }

    pub fn with_checkpoint_threshold(mut self, threshold: usize) -> Self {
        self.checkpoint_threshold = threshold.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn is_loaded(&self) -> bool {
        self.journal.is_some()
    }

    /// Snapshot every table and truncate the WAL.
    pub fn checkpoint(&mut self) -> Result<()> {
        let Self {
            name,
            journal,
            memory,
            ..
        } = self;
        let journal = journal.as_mut().ok_or_else(|| not_loaded(name))?;
        let _span = info_span!("checkpoint", store = %name).entered();
        journal.checkpoint(memory.tables())?;
        event!(Level::INFO, records = memory.record_count(), "checkpoint written");
        Ok(())
    }

    fn replay(&mut self, entries: Vec<WalEntry>) -> Result<()> {
        for entry in entries {
            match entry {
                WalEntry::RegisterEntity(schema) => self.memory.register_entity(schema)?,
                WalEntry::Commit { changes } => self.memory.apply_batch(&changes)?,
            }
        }
        Ok(())
    }
}

impl StorageEngine for DurableStorage {
    fn load(&mut self) -> Result<()> {
        if self.journal.is_some() {
            return Ok(());
        }
        let span = info_span!("recover", store = %self.name, dir = %self.data_dir.display());
        let _guard = span.enter();

        let (mut journal, recovery) = Journal::open(&self.data_dir, &self.name, self.durability)
            .map_err(|e| StoreError::StoreLoad(e.to_string()))?;
        journal.wal_mut().set_checkpoint_threshold(self.checkpoint_threshold);

        let replayed = recovery.entries.len();
        if recovery.skipped > 0 {
            warn!(
                "skipped {} WAL entries already contained in the snapshot of '{}'",
                recovery.skipped, self.name
            );
        }
        self.memory.restore_tables(recovery.tables);
        self.replay(recovery.entries)
            .map_err(|e| StoreError::StoreLoad(format!("WAL replay failed: {}", e)))?;

        event!(
            Level::INFO,
            entities = self.memory.tables().len(),
            records = self.memory.record_count(),
            replayed,
            "store recovered"
        );
        info!(
            "opened store '{}' in {} ({} records, kinds [{}])",
            self.name,
            self.data_dir.display(),
            self.memory.record_count(),
            self.memory.entity_names().join(", ")
        );
        self.journal = Some(journal);
        Ok(())
    }

    fn register_entity(&mut self, schema: EntitySchema) -> Result<()> {
        if self.memory.entity(schema.name()) == Some(&schema) {
            return Ok(());
        }
        let Self {
            name,
            journal,
            memory,
            ..
        } = self;
        let journal = journal.as_mut().ok_or_else(|| not_loaded(name))?;
        memory.register_entity(schema.clone())?;
        if let Err(err) = journal.log(&WalEntry::RegisterEntity(schema.clone())) {
            error!("failed to journal entity '{}': {}", schema.name(), err);
            memory.drop_entity(schema.name());
            return Err(err);
        }
        Ok(())
    }

    fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.memory.entity(name)
    }

    fn entity_names(&self) -> Vec<String> {
        self.memory.entity_names()
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Record>> {
        if self.journal.is_none() {
            return Err(StoreError::Fetch(format!("store '{}' is not loaded", self.name)));
        }
        self.memory.fetch(request)
    }

    fn allocate_id(&mut self, entity: &str) -> Result<ObjectId> {
        self.memory.allocate_id(entity)
    }

    fn commit(&mut self, changes: Vec<Change>) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let Self {
            name,
            journal,
            memory,
            ..
        } = self;
        let journal = journal.as_mut().ok_or_else(|| not_loaded(name))?;

        // apply in memory first so a bad batch never reaches the log
        memory.apply_batch(&changes)?;
        let entry = WalEntry::Commit { changes };
        if let Err(err) = journal.log(&entry) {
            if let WalEntry::Commit { changes } = &entry {
                memory.revert_batch(changes);
            }
            return Err(StoreError::Commit(err.to_string()));
        }
        debug!("journaled commit to '{}'", name);

        if journal.needs_checkpoint() {
            // the batch is already in the WAL; a failed checkpoint only means
            // a longer replay on the next load
            if let Err(err) = self.checkpoint() {
                warn!("checkpoint of '{}' failed: {}", self.name, err);
            }
        }
        Ok(())
    }
}

fn not_loaded(name: &str) -> StoreError {
    StoreError::Unavailable(format!("store '{}' is not loaded", name))
}
