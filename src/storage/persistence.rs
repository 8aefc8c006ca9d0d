//! Write-ahead log and snapshot files backing [`DurableStorage`](super::DurableStorage).

use super::table::EntityTable;
use crate::context::Change;
use crate::core::{EntitySchema, Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

// ============================================================================
// WAL Entry Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    RegisterEntity(EntitySchema),
    Commit { changes: Vec<Change> },
}

/// One framed WAL entry. Sequence numbers grow across checkpoints, so an
/// entry already folded into a snapshot can be recognized and skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    pub seq: u64,
    pub entry: WalEntry,
}

/// Result of scanning the WAL file.
#[derive(Debug, Default)]
pub struct WalReplay {
    pub records: Vec<WalRecord>,
    /// Byte length of the complete entries at the head of the file
    pub valid_len: u64,
    pub file_len: u64,
}

impl WalReplay {
    /// Whether the file ends in a partially written entry.
    pub fn is_torn(&self) -> bool {
        self.valid_len < self.file_len
    }
}

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub tables: HashMap<String, EntityTable>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Unix epoch milliseconds
    pub created_at: i64,
    pub record_count: usize,
    pub entity_count: usize,
    /// Sequence number of the last WAL entry contained in this snapshot
    pub last_seq: u64,
}

impl StoreSnapshot {
    pub const VERSION: u32 = 2;

    pub fn new(tables: HashMap<String, EntityTable>, last_seq: u64) -> Self {
        let record_count = tables.values().map(|t| t.row_count()).sum();
        let entity_count = tables.len();

        Self {
            version: Self::VERSION,
            tables,
            metadata: SnapshotMetadata {
                created_at: chrono::Utc::now().timestamp_millis(),
                record_count,
                entity_count,
                last_seq,
            },
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityMode {
    /// fsync after every WAL append
    Sync,
    /// flush to the OS after every append
    #[default]
    Async,
    /// nothing is written to disk
    None,
}

fn io_error(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Io(format!("{}: {}", context, err))
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    wal_file: Option<BufWriter<File>>,
    durability_mode: DurabilityMode,
    next_seq: u64,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

impl WalManager {
    pub const DEFAULT_CHECKPOINT_THRESHOLD: usize = 1000;

    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode) -> Result<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error("Failed to create WAL directory", e))?;
        }

        let wal_file = if durability_mode != DurabilityMode::None {
            Some(open_append(&wal_path)?)
        } else {
            None
        };

        Ok(Self {
            wal_path,
            wal_file,
            durability_mode,
            next_seq: 1,
            entries_since_checkpoint: 0,
            checkpoint_threshold: Self::DEFAULT_CHECKPOINT_THRESHOLD,
        })
    }

    /// Append one length-prefixed MessagePack record and return its
    /// sequence number.
    pub fn append(&mut self, entry: &WalEntry) -> Result<u64> {
        let seq = self.next_seq;
        if self.durability_mode == DurabilityMode::None {
            self.next_seq += 1;
            return Ok(seq);
        }
        let file = self
            .wal_file
            .as_mut()
            .ok_or_else(|| StoreError::Io("WAL file not initialized".to_string()))?;
        let record = WalRecord {
            seq,
            entry: entry.clone(),
        };
        let serialized =
            rmp_serde::to_vec(&record).map_err(|e| io_error("Failed to serialize WAL entry", e))?;
        let len = serialized.len() as u32;
        file.write_all(&len.to_le_bytes())
            .map_err(|e| io_error("Failed to write WAL", e))?;
        file.write_all(&serialized)
            .map_err(|e| io_error("Failed to write WAL", e))?;
        file.flush().map_err(|e| io_error("Failed to flush WAL", e))?;
        if self.durability_mode == DurabilityMode::Sync {
            file.get_mut()
                .sync_all()
                .map_err(|e| io_error("Failed to sync WAL", e))?;
        }
        self.next_seq += 1;
        self.entries_since_checkpoint += 1;
        Ok(seq)
    }

    /// Read every complete record. A torn final record (crash mid-append)
    /// is left out and reported through [`WalReplay::is_torn`].
    pub fn read_all(&self) -> Result<WalReplay> {
        if !self.wal_path.exists() {
            return Ok(WalReplay::default());
        }
        let file =
            File::open(&self.wal_path).map_err(|e| io_error("Failed to open WAL for reading", e))?;
        let file_len = file
            .metadata()
            .map_err(|e| io_error("Failed to stat WAL", e))?
            .len();
        let mut reader = BufReader::new(file);
        let mut replay = WalReplay {
            file_len,
            ..WalReplay::default()
        };
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(io_error("Failed to read WAL entry length", e)),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(io_error("Failed to read WAL entry data", e)),
            }
            let record: WalRecord = rmp_serde::from_slice(&data)
                .map_err(|e| io_error("Failed to deserialize WAL entry", e))?;
            replay.records.push(record);
            replay.valid_len += 4 + len as u64;
        }
        if replay.is_torn() {
            log::warn!(
                "torn WAL entry at byte {} of {}",
                replay.valid_len,
                self.wal_path.display()
            );
        }
        Ok(replay)
    }

    /// Cut the file back to `len` bytes, dropping a torn tail.
    pub fn truncate_to(&mut self, len: u64) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.wal_file = None;
        let file = OpenOptions::new()
            .write(true)
            .open(&self.wal_path)
            .map_err(|e| io_error("Failed to open WAL for truncation", e))?;
        file.set_len(len)
            .map_err(|e| io_error("Failed to truncate WAL", e))?;
        file.sync_all()
            .map_err(|e| io_error("Failed to sync WAL", e))?;
        self.wal_file = Some(open_append(&self.wal_path)?);
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.wal_file = None;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.wal_path)
            .map_err(|e| io_error("Failed to truncate WAL", e))?;
        self.wal_file = Some(BufWriter::new(file));
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    /// Sequence number of the last appended record (0 if none yet).
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold.max(1);
    }

    pub fn path(&self) -> &Path {
        &self.wal_path
    }
}

fn open_append(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_error("Failed to open WAL file", e))?;
    Ok(BufWriter::new(file))
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    /// Write the snapshot to a temp file in the same directory, then
    /// atomically move it over the previous one.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let dir = match self.snapshot_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| io_error("Failed to create snapshot directory", e))?;

        let serialized =
            rmp_serde::to_vec(snapshot).map_err(|e| io_error("Failed to serialize snapshot", e))?;
        let mut temp =
            NamedTempFile::new_in(&dir).map_err(|e| io_error("Failed to create temp file", e))?;
        temp.write_all(&serialized)
            .map_err(|e| io_error("Failed to write snapshot", e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| io_error("Failed to sync snapshot", e))?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| io_error("Failed to rename snapshot", e))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.snapshot_path).map_err(|e| io_error("Failed to read snapshot", e))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data)
            .map_err(|e| io_error("Failed to deserialize snapshot", e))?;
        if snapshot.version != StoreSnapshot::VERSION {
            return Err(StoreError::Io(format!(
                "Unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

// ============================================================================
// Journal: WAL + snapshot for one named container
// ============================================================================

/// State rebuilt from disk when a journal is opened.
#[derive(Debug, Default)]
pub struct Recovery {
    pub tables: HashMap<String, EntityTable>,
    /// WAL entries newer than the snapshot, oldest first
    pub entries: Vec<WalEntry>,
    /// Records skipped because the snapshot already holds them
    pub skipped: usize,
}

pub struct Journal {
    wal: WalManager,
    snapshot: SnapshotManager,
    durability_mode: DurabilityMode,
}

impl Journal {
    /// Open the files of container `name` and recover their state.
    ///
    /// A torn WAL tail is cut off before anything new is appended, and
    /// sequence numbering resumes after the newest record seen.
    pub fn open<P: AsRef<Path>>(
        data_dir: P,
        name: &str,
        durability_mode: DurabilityMode,
    ) -> Result<(Self, Recovery)> {
        let data_dir = data_dir.as_ref();
        let wal = WalManager::new(data_dir.join(format!("{}.wal", name)), durability_mode)?;
        let snapshot = SnapshotManager::new(data_dir.join(format!("{}.snapshot", name)));
        let mut journal = Self {
            wal,
            snapshot,
            durability_mode,
        };
        let recovery = journal.recover()?;
        Ok((journal, recovery))
    }

    fn recover(&mut self) -> Result<Recovery> {
        let (tables, snapshot_seq) = match self.snapshot.load()? {
            Some(snapshot) => (snapshot.tables, snapshot.metadata.last_seq),
            None => (HashMap::new(), 0),
        };

        let replay = self.wal.read_all()?;
        if replay.is_torn() {
            self.wal.truncate_to(replay.valid_len)?;
        }

        let newest = replay.records.iter().map(|r| r.seq).max().unwrap_or(0);
        self.wal.next_seq = newest.max(snapshot_seq) + 1;
        self.wal.entries_since_checkpoint = replay.records.len();

        let total = replay.records.len();
        let entries: Vec<WalEntry> = replay
            .records
            .into_iter()
            .filter(|r| r.seq > snapshot_seq)
            .map(|r| r.entry)
            .collect();
        Ok(Recovery {
            tables,
            skipped: total - entries.len(),
            entries,
        })
    }

    pub fn log(&mut self, entry: &WalEntry) -> Result<()> {
        self.wal.append(entry).map(|_| ())
    }

    /// Snapshot `tables` as of the last logged entry, then truncate the WAL.
    pub fn checkpoint(&mut self, tables: &HashMap<String, EntityTable>) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let snapshot = StoreSnapshot::new(tables.clone(), self.wal.last_seq());
        self.snapshot.save(&snapshot)?;
        self.wal.clear()?;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint()
    }

    pub fn wal(&self) -> &WalManager {
        &self.wal
    }

    pub fn wal_mut(&mut self) -> &mut WalManager {
        &mut self.wal
    }

    pub fn snapshot(&self) -> &SnapshotManager {
        &self.snapshot
    }
}
