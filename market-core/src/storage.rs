//! Durable event log backed by RocksDB
//!
//! # Layout
//!
//! - `events` column family: big-endian sequence number -> [`StoredRecord`]
//!
//! The log is append-only: records are never modified or deleted. Each
//! record carries a SHA-256 hash chained to its predecessor, so the whole
//! log can be audited with [`Storage::verify_chain`]. Engine state is
//! rebuilt from the log on open (see [`crate::market::Market`]).

use crate::{
    error::{Error, Result},
    events::MarketEvent,
    Config,
};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const CF_EVENTS: &str = "events";

/// Hash of the empty chain
const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// One persisted log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    /// The committed event
    event: MarketEvent,

    /// Hash of the previous record (zeroes for the first)
    prev_hash: [u8; 32],

    /// SHA-256 over `prev_hash || bincode(event)`
    hash: [u8; 32],
}

#[derive(Debug, Clone, Copy)]
struct Head {
    next_sequence: u64,
    hash: [u8; 32],
}

/// Append-only event log
pub struct Storage {
    db: DB,
    head: Mutex<Head>,
}

impl Storage {
    /// Open or create the log
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let mut cf_opts = Options::default();
        cf_opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        let cf_descriptors = vec![ColumnFamilyDescriptor::new(CF_EVENTS, cf_opts)];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let head = Self::read_head(&db)?;
        tracing::info!(
            path = %path.display(),
            next_sequence = head.next_sequence,
            "event log opened"
        );

        Ok(Self {
            db,
            head: Mutex::new(head),
        })
    }

    /// Append one committed event.
    ///
    /// The event's sequence must continue the log exactly; anything else
    /// means engine state and log have diverged.
    pub fn append_event(&self, event: &MarketEvent) -> Result<()> {
        let mut head = self.head.lock();
        if event.sequence != head.next_sequence {
            return Err(Error::InvariantViolation(format!(
                "log append out of order: expected sequence {}, got {}",
                head.next_sequence, event.sequence
            )));
        }

        let event_bytes = bincode::serialize(event)?;
        let hash = record_hash(&head.hash, &event_bytes);
        let record = StoredRecord {
            event: event.clone(),
            prev_hash: head.hash,
            hash,
        };

        let cf = self.cf_events()?;
        self.db
            .put_cf(cf, event.sequence.to_be_bytes(), bincode::serialize(&record)?)?;

        head.next_sequence += 1;
        head.hash = hash;

        tracing::debug!(sequence = event.sequence, kind = event.kind.name(), "event appended");
        Ok(())
    }

    /// All events in commit order
    pub fn read_all(&self) -> Result<Vec<MarketEvent>> {
        let cf = self.cf_events()?;
        let mut events = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let record: StoredRecord = bincode::deserialize(&value)?;
            events.push(record.event);
        }
        Ok(events)
    }

    /// Sequence number of the latest stored event
    pub fn latest_sequence(&self) -> Option<u64> {
        let head = self.head.lock();
        head.next_sequence.checked_sub(1)
    }

    /// Walk the whole log recomputing the hash chain; returns the record
    /// count on success.
    pub fn verify_chain(&self) -> Result<u64> {
        let cf = self.cf_events()?;
        let mut prev_hash = GENESIS_HASH;
        let mut expected_sequence = 0u64;

        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let record: StoredRecord = bincode::deserialize(&value)?;

            if record.event.sequence != expected_sequence {
                return Err(Error::InvariantViolation(format!(
                    "log gap at sequence {}, found {}",
                    expected_sequence, record.event.sequence
                )));
            }
            if record.prev_hash != prev_hash {
                return Err(Error::InvariantViolation(format!(
                    "hash chain broken before sequence {}",
                    record.event.sequence
                )));
            }
            let event_bytes = bincode::serialize(&record.event)?;
            if record.hash != record_hash(&record.prev_hash, &event_bytes) {
                return Err(Error::InvariantViolation(format!(
                    "record hash mismatch at sequence {}",
                    record.event.sequence
                )));
            }

            prev_hash = record.hash;
            expected_sequence += 1;
        }

        Ok(expected_sequence)
    }

    fn read_head(db: &DB) -> Result<Head> {
        let cf = db
            .cf_handle(CF_EVENTS)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", CF_EVENTS)))?;

        let mut iter = db.iterator_cf(cf, IteratorMode::End);
        match iter.next() {
            Some(item) => {
                let (_, value) = item?;
                let record: StoredRecord = bincode::deserialize(&value)?;
                Ok(Head {
                    next_sequence: record.event.sequence + 1,
                    hash: record.hash,
                })
            }
            None => Ok(Head {
                next_sequence: 0,
                hash: GENESIS_HASH,
            }),
        }
    }

    fn cf_events(&self) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(CF_EVENTS)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", CF_EVENTS)))
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("next_sequence", &self.head.lock().next_sequence)
            .finish_non_exhaustive()
    }
}

fn record_hash(prev_hash: &[u8; 32], event_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash);
    hasher.update(event_bytes);
    hasher.finalize().into()
}
