// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The trusted index object: a signed JSON target describing the latest
//! artifact for the managed service.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Hashes {
    pub sha256: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct IndexEntry {
    pub version: String,
    pub release_date: String,
    pub bytes: u64,
    pub path: String,
    pub hashes: Hashes,
}

/// `<service>-index.json`: a mapping from service name to its [`IndexEntry`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct Index(HashMap<String, IndexEntry>);

impl Index {
    pub fn entry_for(&self, service_name: &str) -> Result<&IndexEntry> {
        self.0
            .get(service_name)
            .ok_or_else(|| Error::IndexCorrupt(format!("missing service key {service_name:?}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::IndexCorrupt(format!("index parse error: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

/// `^v\d{4}\.\d{2}\.\d{2}-sha\.[a-fA-F0-9]{7}$` — the version-name format
/// used both as the on-disk install directory name and for startup
/// directory discovery (spec §4.2, §6).
pub fn version_regex() -> &'static regex::Regex {
    static RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"^v\d{4}\.\d{2}\.\d{2}-sha\.[a-fA-F0-9]{7}$").expect("valid regex")
    });
    &RE
}

pub fn is_version_name(name: &str) -> bool {
    version_regex().is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "acme": {
                "version": "v2025.01.15-sha.abc1234",
                "release_date": "2025-01-15T00:00:00Z",
                "bytes": 1024,
                "path": "https://store.example.com/acme.zip",
                "hashes": { "sha256": "deadbeef" }
            }
        }"#
    }

    #[test]
    fn parses_entry_for_known_service() {
        let index = Index::from_bytes(sample_json().as_bytes()).unwrap();
        let entry = index.entry_for("acme").unwrap();
        assert_eq!(entry.version, "v2025.01.15-sha.abc1234");
        assert_eq!(entry.hashes.sha256, "deadbeef");
    }

    #[test]
    fn missing_service_key_is_index_corrupt() {
        let index = Index::from_bytes(sample_json().as_bytes()).unwrap();
        let err = index.entry_for("other").unwrap_err();
        assert!(matches!(err, Error::IndexCorrupt(_)));
    }

    #[test]
    fn malformed_json_is_index_corrupt() {
        let err = Index::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, Error::IndexCorrupt(_)));
    }

    #[test]
    fn version_name_matcher_accepts_and_rejects() {
        assert!(is_version_name("v2025.01.15-sha.abc1234"));
        assert!(!is_version_name("2025.01.15-sha.abc1234"));
        assert!(!is_version_name("v2025.1.15-sha.abc1234"));
        assert!(!is_version_name("v2025.01.15-sha.abc123"));
    }
}
