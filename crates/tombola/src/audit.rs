//! audit - append-only hash-chained signed log
//!
//! the coordinator records every loggable protocol message here. each
//! entry carries the sha-256 of the serialized previous entry, so any
//! later tampering breaks the chain, and is signed with the
//! coordinator's session key. the log never shrinks or reorders.

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::crypto::{sha256_hex, verify_hex, SessionKeys};
use crate::error::{Error, Result};
use crate::protocol::{LogEntry, Message};

/// canonical byte string the entry signature covers
fn canonical(sequence: u64, timestamp: u64, prev_hash: &str, text: &str) -> Vec<u8> {
    format!("{sequence}|{timestamp}|{prev_hash}|{text}").into_bytes()
}

fn entry_hash(entry: &LogEntry) -> String {
    // serialization of a LogEntry cannot fail
    let bytes = serde_json::to_vec(entry).expect("log entry serializes");
    sha256_hex(&bytes)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// tamper-evident record owned exclusively by the coordinator
pub struct AuditLog {
    entries: Vec<LogEntry>,
}

impl AuditLog {
    /// create a log holding the fixed genesis entry
    pub fn new(keys: &SessionKeys) -> Self {
        let signature = keys.sign_hex(&canonical(0, 0, "", "genesis"));
        let genesis = LogEntry {
            sequence: 0,
            timestamp: 0,
            prev_hash: String::new(),
            text: "genesis".to_string(),
            signature,
        };
        Self { entries: vec![genesis] }
    }

    /// chain a new entry recording `msg`
    pub fn append(&mut self, keys: &SessionKeys, msg: &Message) -> Result<()> {
        let text = serde_json::to_string(msg)?;
        let last = self.entries.last().expect("genesis always present");

        let sequence = last.sequence + 1;
        let timestamp = unix_now();
        let prev_hash = entry_hash(last);
        let signature = keys.sign_hex(&canonical(sequence, timestamp, &prev_hash, &text));

        self.entries.push(LogEntry { sequence, timestamp, prev_hash, text, signature });
        Ok(())
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// recompute every link and signature
    pub fn verify_chain(&self, coordinator_key: &str) -> Result<()> {
        verify_entries(&self.entries, coordinator_key)
    }
}

/// digest of a full log snapshot, signed on `GETLOG` replies
pub fn entries_digest(entries: &[LogEntry]) -> Vec<u8> {
    let bytes = serde_json::to_vec(entries).expect("log entries serialize");
    Sha256::digest(&bytes).to_vec()
}

/// verify a fetched log against the coordinator's public key: hash
/// chain intact, sequences consecutive, every signature valid. used
/// by `GETLOG` consumers and tests
pub fn verify_entries(entries: &[LogEntry], coordinator_key: &str) -> Result<()> {
    for (i, entry) in entries.iter().enumerate() {
        if entry.sequence != i as u64 {
            return Err(Error::BadFormat(format!(
                "log entry {i} has sequence {}",
                entry.sequence
            )));
        }

        let expected_prev = if i == 0 {
            String::new()
        } else {
            entry_hash(&entries[i - 1])
        };
        if entry.prev_hash != expected_prev {
            return Err(Error::BadFormat(format!("log chain broken at entry {i}")));
        }

        verify_hex(
            coordinator_key,
            &canonical(entry.sequence, entry.timestamp, &entry.prev_hash, &entry.text),
            &entry.signature,
        )?;
    }
    Ok(())
}
