// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! `update_status.json` — the two-field mailbox shared with an external
//! consent UI (spec §4.3), plus the additive `failure_count` this project
//! carries to resolve one of spec §9's open questions (the UI can watch
//! for a stuck request rather than guessing whether consent was cleared
//! because of success or failure).
//!
//! Reads and writes are whole-file operations. Writes go to a temp file
//! in the same directory followed by a rename, so a reader never observes
//! a torn write (spec §9 open question, resolved here rather than left as
//! last-writer-wins truncation risk).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn zero() -> i32 {
    0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusRecord {
    #[serde(default = "zero")]
    pub update_available: i32,
    #[serde(default = "zero")]
    pub update_requested: i32,
    #[serde(default = "zero")]
    pub failure_count: i32,
}

impl Default for StatusRecord {
    fn default() -> Self {
        Self {
            update_available: 0,
            update_requested: 0,
            failure_count: 0,
        }
    }
}

impl StatusRecord {
    /// A missing file reads as all-zero. This is correct only for the
    /// initial boot; thereafter the agent always maintains the file
    /// (spec §4.3).
    pub fn read(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(Error::Json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Replaces the entire file, never merges (spec §4.2 stage 10, §4.3).
    pub fn write(&self, path: &Path) -> Result<()> {
        let dir = path.parent().ok_or_else(|| {
            Error::StatusWriteFailed(format!("{path:?} has no parent directory"))
        })?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::StatusWriteFailed(e.to_string()))?;
        serde_json::to_writer(&mut tmp, self).map_err(Error::Json)?;
        tmp.persist(path)
            .map_err(|e| Error::StatusWriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn cleared() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_as_all_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update_status.json");
        let status = StatusRecord::read(&path).unwrap();
        assert_eq!(status, StatusRecord::default());
    }

    #[test]
    fn round_trip_preserves_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update_status.json");
        let status = StatusRecord {
            update_available: 1,
            update_requested: 1,
            failure_count: 2,
        };
        status.write(&path).unwrap();
        let read_back = StatusRecord::read(&path).unwrap();
        assert_eq!(status, read_back);
    }

    #[test]
    fn absent_fields_default_to_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update_status.json");
        std::fs::write(&path, br#"{"update_available": 1}"#).unwrap();
        let status = StatusRecord::read(&path).unwrap();
        assert_eq!(status.update_available, 1);
        assert_eq!(status.update_requested, 0);
        assert_eq!(status.failure_count, 0);
    }

    #[test]
    fn write_replaces_whole_file_not_merge() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update_status.json");
        StatusRecord {
            update_available: 1,
            update_requested: 1,
            failure_count: 3,
        }
        .write(&path)
        .unwrap();

        StatusRecord::cleared().write(&path).unwrap();

        let read_back = StatusRecord::read(&path).unwrap();
        assert_eq!(read_back, StatusRecord::default());
    }
}
