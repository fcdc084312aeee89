// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Central error taxonomy for the update agent.
//!
//! Each variant corresponds to one of the failure kinds named in the
//! design: a poller iteration or an apply pipeline stage fails with one
//! of these, is logged by the caller, and the surrounding loop continues.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bootstrap failed: {0}")]
    BootstrapFailed(String),

    #[error("metadata refresh failed: {0}")]
    MetadataRefreshFailed(#[from] tough::error::Error),

    #[error("index fetch failed: {0}")]
    IndexFetchFailed(String),

    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("extract failed: {0}")]
    ExtractFailed(String),

    #[error("symlink redirect failed: {0}")]
    SymlinkFailed(String),

    #[error("restart failed: {0}")]
    RestartFailed(String),

    #[error("garbage collection failed: {0}")]
    GCFailed(String),

    #[error("status write failed: {0}")]
    StatusWriteFailed(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;
