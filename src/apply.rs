// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The consent-gated apply pipeline (spec §4.2): read index → fetch
//! artifact → verify hash → extract → redirect symlinks → reload+restart
//! → garbage-collect → clear consent.
//!
//! Stages run strictly in order; a failure at any stage aborts the
//! pipeline (spec §9 open question, resolved here as abort-on-first-error
//! rather than the reference's sometimes-continues behavior, since
//! continuing past a failed rename risks promoting a half-written file).

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use bytes::Bytes;
use futures_util::TryStreamExt;
use log::{error, info};
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::extract_zip;
use crate::index::{Index, IndexEntry};
use crate::installation::{self, Generations};
use crate::metadata::sha256_hex;
use crate::service::ServiceController;
use crate::status::StatusRecord;
use crate::token::TokenSource;

/// Runs exactly one apply: spec §4.2 stages 1-10. Returns `Ok(())` only
/// when every stage, through clearing consent, succeeded.
pub async fn apply_once(
    config: &Config,
    generations: &mut Generations,
    token_source: &dyn TokenSource,
    service: &dyn ServiceController,
) -> Result<()> {
    // Stage 1: read index.
    let index = Index::load(&config.index_path())?;
    let entry = index.entry_for(&config.service_name)?.clone();

    info!("applying update to {} ({} bytes declared)", entry.version, entry.bytes);

    // Stage 2: authenticated download.
    let token = token_source.token().await?;
    let staging_path = config.staged_artifact_path();
    download_artifact(&entry.path, &token, &staging_path).await?;

    verify_and_promote_and_swap(config, generations, service, &entry, &staging_path).await
}

async fn download_artifact(url: &str, bearer_token: &str, staging_path: &Path) -> Result<()> {
    if let Some(parent) = staging_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let response = crate::http::client()
        .get(url)
        .bearer_auth(bearer_token)
        .send()
        .await?;

    if let Some(disposition) = response.headers().get(reqwest::header::CONTENT_DISPOSITION) {
        if let Ok(value) = disposition.to_str() {
            info!("download content-disposition: {value}");
        }
    }

    let response = response
        .error_for_status()
        .map_err(|e| Error::DownloadFailed(e.to_string()))?;

    let mut out = tokio::fs::File::create(staging_path).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.try_next().await? {
        let chunk: Bytes = chunk;
        out.write_all(&chunk).await?;
    }
    out.flush().await?;
    Ok(())
}

/// Stages 3-10: everything after the artifact is sitting at `staging_path`.
/// Split out from [`apply_once`] so the verify/extract/swap/restart/GC
/// core can be exercised without a live HTTP server behind stage 2,
/// mirroring how `moss::package::fetch` separates `fetch` from `unpack`.
async fn verify_and_promote_and_swap(
    config: &Config,
    generations: &mut Generations,
    service: &dyn ServiceController,
    entry: &IndexEntry,
    staging_path: &Path,
) -> Result<()> {
    // Stage 3: executable bit, defense in depth ahead of extraction.
    std::fs::set_permissions(staging_path, std::fs::Permissions::from_mode(0o755))?;

    // Stage 4: hash verification. Must happen before promotion (stage 5).
    let actual = sha256_hex(&std::fs::read(staging_path)?);
    if actual != entry.hashes.sha256 {
        error!(
            "hash mismatch for {}: expected {}, got {actual}; staged file retained at {staging_path:?}",
            entry.version, entry.hashes.sha256
        );
        return Err(Error::HashMismatch {
            expected: entry.hashes.sha256.clone(),
            actual,
        });
    }

    // Stage 5: promote (same-filesystem rename, expected atomic).
    let promoted_path = config.promoted_artifact_path();
    std::fs::rename(staging_path, &promoted_path)?;

    // Stage 6: extract with ZipSlip guard.
    let version_dir = config.version_dir(&entry.version);
    extract_zip(&promoted_path, &version_dir)?;
    if !installation::is_complete(config, &entry.version) {
        return Err(Error::ExtractFailed(format!(
            "{version_dir:?} missing bin/ or config/ after extraction"
        )));
    }

    // Stage 7: redirect symlinks. No recovery attempted on partial failure.
    installation::redirect_active_links(config, &entry.version)?;

    // Stage 8: reload and restart.
    service.reload().await?;
    let job_id = service.restart(&config.managed_unit_name).await?;
    info!("queued restart of {} as job {job_id}", config.managed_unit_name);

    // Stage 9: garbage-collect previous generation, non-fatal.
    if let Some(previous) = generations.previous.take() {
        if let Err(e) = installation::gc_previous(config, &previous) {
            error!("garbage collection of {previous} failed: {e}");
        }
    }
    generations.previous = generations.current.replace(entry.version.clone());

    // Stage 10: clear consent.
    StatusRecord::cleared().write(&config.status_path())?;

    Ok(())
}

/// On every iteration, read the status record; when `update_requested = 1`,
/// run [`apply_once`] exactly once, whether or not `update_available` was
/// ever set (spec §5 ordering guarantees — the apply reads the index from
/// disk, not from the flag). Failures keep `update_requested` set and bump
/// the `failure_count` counter so a stuck request is observable externally
/// (spec §7/§9 open question).
pub async fn run_watcher_loop(
    config: Config,
    token_source: Box<dyn TokenSource>,
    service: Box<dyn ServiceController>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut generations = Generations::discover(&config).unwrap_or_default();
    let mut interval = tokio::time::interval(config.poll_interval_consent);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if *shutdown.borrow() {
                    break;
                }

                match StatusRecord::read(&config.status_path()) {
                    Ok(status) if status.update_requested == 1 => {
                        match apply_once(&config, &mut generations, token_source.as_ref(), service.as_ref()).await {
                            Ok(()) => info!("apply completed successfully"),
                            Err(e) => {
                                error!("apply failed: {e}");
                                record_failed_attempt(&config);
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => error!("failed to read status record: {e}"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn record_failed_attempt(config: &Config) {
    match StatusRecord::read(&config.status_path()) {
        Ok(mut status) => {
            status.failure_count += 1;
            if let Err(e) = status.write(&config.status_path()) {
                error!("failed to record failure count: {e}");
            }
        }
        Err(e) => error!("failed to read status record while recording failure: {e}"),
    }
}
