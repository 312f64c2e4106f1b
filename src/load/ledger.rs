//! Ledger of consumed source offsets.
//!
//! On disk the ledger is a flat list of decimal byte offsets, each followed
//! by a comma (`0,17,342,`). New offsets are appended after every load call,
//! so the file only grows.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::debug;

use super::error::LoadError;

/// Set of source byte offsets whose rows have already been processed.
#[derive(Debug, Default)]
pub struct LoadOffsetLedger {
    offsets: HashSet<u64>,
    /// Recorded but not yet written to `path`.
    pending: Vec<u64>,
    path: Option<PathBuf>,
}

impl LoadOffsetLedger {
    /// A ledger that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a persistent ledger, reading any offsets already in the file.
    ///
    /// A missing file is an empty ledger; it is created on first persist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();
        let mut offsets = HashSet::new();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                for token in contents.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                    let offset = token
                        .parse::<u64>()
                        .map_err(|_| LoadError::LedgerFormat(token.to_string()))?;
                    offsets.insert(offset);
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        debug!("ledger {} holds {} offsets", path.display(), offsets.len());
        Ok(Self {
            offsets,
            pending: Vec::new(),
            path: Some(path),
        })
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.offsets.contains(&offset)
    }

    /// Marks `offset` consumed. Returns false if it already was.
    pub fn record(&mut self, offset: u64) -> bool {
        if !self.offsets.insert(offset) {
            return false;
        }
        if self.path.is_some() {
            self.pending.push(offset);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends offsets recorded since the last persist to the ledger file.
    pub fn persist(&mut self) -> Result<(), LoadError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut out = String::with_capacity(self.pending.len() * 8);
        for offset in &self.pending {
            out.push_str(&offset.to_string());
            out.push(',');
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(out.as_bytes())?;
        debug!("appended {} offsets to {}", self.pending.len(), path.display());
        self.pending.clear();
        Ok(())
    }
}
