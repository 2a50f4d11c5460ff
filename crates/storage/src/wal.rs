// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only metadata log
//!
//! One JSON entry per line, each carrying a sequence number. An entry is
//! synced to disk before `append` returns. A crash mid-write can leave a
//! final line without its newline; opening the log drops that line.
//! Compaction writes the surviving operations to a temporary file and
//! renames it over the log.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tern_core::Operation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("metadata log io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode metadata log entry: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("corrupt entry at line {line} of {path}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Entry {
    seq: u64,
    op: Operation,
}

/// Open handle on the metadata log
pub struct Wal {
    file: File,
    sequence: u64,
    entries: usize,
}

impl Wal {
    /// Open (or create) the log and return the operations it holds
    pub fn open(path: &Path) -> Result<(Self, Vec<Operation>), WalError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (entries, valid_len) = read_entries(&mut file, path)?;
        if valid_len < file.metadata()?.len() {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                "dropping incomplete trailing entry"
            );
            file.set_len(valid_len)?;
        }

        let sequence = entries.last().map_or(0, |e| e.seq);
        let ops: Vec<Operation> = entries.into_iter().map(|e| e.op).collect();
        let wal = Self {
            file,
            sequence,
            entries: ops.len(),
        };
        Ok((wal, ops))
    }

    /// Durably append an operation, returning its sequence number
    pub fn append(&mut self, op: &Operation) -> Result<u64, WalError> {
        let seq = self.sequence + 1;
        self.file.write_all(&encode(seq, op)?)?;
        self.file.sync_data()?;
        self.sequence = seq;
        self.entries += 1;
        Ok(seq)
    }

    /// Replace the log at `path` with `ops`.
    ///
    /// Sequence numbers keep increasing across the rewrite. A crash before
    /// the rename leaves the old log in place.
    pub fn rewrite(&mut self, path: &Path, ops: &[Operation]) -> Result<(), WalError> {
        let temp_path = path.with_extension("compact.tmp");
        let mut seq = self.sequence;
        {
            let mut file = File::create(&temp_path)?;
            for op in ops {
                seq += 1;
                file.write_all(&encode(seq, op)?)?;
            }
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, path)?;

        self.file = OpenOptions::new().read(true).append(true).open(path)?;
        self.sequence = seq;
        self.entries = ops.len();
        Ok(())
    }

    /// Sequence number of the last entry written
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Number of entries currently in the log
    pub fn entries(&self) -> usize {
        self.entries
    }
}

fn encode(seq: u64, op: &Operation) -> Result<Vec<u8>, WalError> {
    let entry = Entry { seq, op: op.clone() };
    let mut line = serde_json::to_vec(&entry).map_err(WalError::Encode)?;
    line.push(b'\n');
    Ok(line)
}

/// Parse complete lines. Returns the entries and the byte length they cover.
fn read_entries(file: &mut File, path: &Path) -> Result<(Vec<Entry>, u64), WalError> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&*file);
    let mut entries = Vec::new();
    let mut valid_len = 0u64;
    let mut line = String::new();
    let mut line_no = 0;

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        line_no += 1;
        // Torn write from a crash; everything before it is intact
        if !line.ends_with('\n') {
            break;
        }
        let text = line.trim();
        if !text.is_empty() {
            let entry = serde_json::from_str(text).map_err(|source| WalError::Corrupt {
                path: path.to_path_buf(),
                line: line_no,
                source,
            })?;
            entries.push(entry);
        }
        valid_len += read as u64;
    }
    Ok((entries, valid_len))
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
