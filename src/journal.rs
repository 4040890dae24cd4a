//! Mutation journal: the durability log a book writes to before it mutates.
//!
//! Engines append under their write lock and only apply the mutation once the append
//! succeeded, so a failed append leaves the book unchanged. [`FileJournal`] keeps one
//! JSON entry per line; [`crate::registry::BookRegistry::recover`] replays it on startup.
//! [`InMemoryJournal`] records entries for tests and can be told to fail.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::order::{
    AuctionCancel, AuctionExecution, AuctionOrderIdPair, LimitCancel, LimitExecution,
    LimitOrderIdPair,
};
use crate::types::{AuctionId, MarketId};

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Append rejected: {0}")]
    Rejected(String),
}

/// Every state change a book accepts, tagged with its market.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookMutation {
    LimitPlace {
        market_id: MarketId,
        order: LimitOrderIdPair,
    },
    LimitCancel {
        market_id: MarketId,
        cancel: LimitCancel,
    },
    LimitExec {
        market_id: MarketId,
        exec: LimitExecution,
    },
    AuctionPlace {
        market_id: MarketId,
        order: AuctionOrderIdPair,
    },
    AuctionCancel {
        market_id: MarketId,
        cancel: AuctionCancel,
    },
    AuctionExec {
        market_id: MarketId,
        exec: AuctionExecution,
    },
    AuctionClose {
        market_id: MarketId,
        auction_id: AuctionId,
    },
}

impl BookMutation {
    pub fn market_id(&self) -> MarketId {
        match self {
            BookMutation::LimitPlace { market_id, .. }
            | BookMutation::LimitCancel { market_id, .. }
            | BookMutation::LimitExec { market_id, .. }
            | BookMutation::AuctionPlace { market_id, .. }
            | BookMutation::AuctionCancel { market_id, .. }
            | BookMutation::AuctionExec { market_id, .. }
            | BookMutation::AuctionClose { market_id, .. } => *market_id,
        }
    }
}

/// One persisted mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub mutation: BookMutation,
}

/// Sink for mutations. Must be durable by the time `append` returns `Ok`.
pub trait MutationJournal: Send + Sync {
    /// Appends and returns the assigned sequence number.
    fn append(&self, mutation: &BookMutation) -> Result<u64, JournalError>;
}

/// Journal that persists nothing. Default for books without durability.
#[derive(Debug, Default)]
pub struct NoopJournal {
    next_sequence: AtomicU64,
}

impl NoopJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MutationJournal for NoopJournal {
    fn append(&self, _mutation: &BookMutation) -> Result<u64, JournalError> {
        Ok(self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// In-memory journal for tests. Clone shares the same backing buffer.
#[derive(Clone, Debug, Default)]
pub struct InMemoryJournal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// While set, every append fails.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl MutationJournal for InMemoryJournal {
    fn append(&self, mutation: &BookMutation) -> Result<u64, JournalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(JournalError::Rejected("journal marked failing".into()));
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = entries.len() as u64 + 1;
        entries.push(JournalEntry {
            sequence,
            mutation: mutation.clone(),
        });
        Ok(sequence)
    }
}

/// Byte sink a journal writer appends to. `truncate_to` discards a partially written line.
trait JournalSink: Write {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl JournalSink for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Sequence numbering and the last good end offset of a journal sink.
#[derive(Debug)]
struct JournalWriter<S> {
    sink: S,
    len: u64,
    next_sequence: u64,
    /// Set when a failed append could not be rolled back; every later append is refused.
    broken: bool,
}

impl<S: JournalSink> JournalWriter<S> {
    fn new(sink: S, len: u64, next_sequence: u64) -> Self {
        Self {
            sink,
            len,
            next_sequence,
            broken: false,
        }
    }

    /// Writes one entry line. On failure the sink is cut back to the last good offset
    /// and the sequence is not consumed.
    fn append(&mut self, mutation: &BookMutation) -> Result<u64, JournalError> {
        if self.broken {
            return Err(JournalError::Rejected(
                "journal has an unrecovered partial write".into(),
            ));
        }
        let entry = JournalEntry {
            sequence: self.next_sequence,
            mutation: mutation.clone(),
        };
        let mut line =
            serde_json::to_vec(&entry).map_err(|e| JournalError::Serialization(e.to_string()))?;
        line.push(b'\n');
        if let Err(e) = self.sink.write_all(&line).and_then(|_| self.sink.flush()) {
            if let Err(rollback) = self.sink.truncate_to(self.len) {
                log::error!(
                    "journal rollback failed offset={} err={}",
                    self.len, rollback
                );
                self.broken = true;
            }
            return Err(e.into());
        }
        self.len += line.len() as u64;
        self.next_sequence += 1;
        Ok(entry.sequence)
    }
}

/// Append-only JSON-lines journal. One [`JournalEntry`] per line, written straight to
/// the file so a failed append leaves nothing behind for the next one.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    inner: Mutex<JournalWriter<File>>,
}

impl FileJournal {
    /// Opens (or creates) the journal. Sequence numbering continues after existing entries.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let existing = Self::load(&path)?;
        let next_sequence = existing.last().map(|e| e.sequence + 1).unwrap_or(1);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            inner: Mutex::new(JournalWriter::new(file, len, next_sequence)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all entries. A missing file is an empty journal.
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<JournalEntry>, JournalError> {
        let file = match File::open(path.as_ref()) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournalEntry = serde_json::from_str(&line).map_err(|e| {
                JournalError::Serialization(format!("line {}: {}", line_no + 1, e))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl MutationJournal for FileJournal {
    fn append(&self, mutation: &BookMutation) -> Result<u64, JournalError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(mutation)
    }
}
