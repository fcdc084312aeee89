// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The on-disk convention that makes atomic swaps possible: versioned
//! install directories plus two symlinks, with exactly two generations
//! retained at steady state (spec §3, §4.4).

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use log::{trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::is_version_name;

/// In-memory generation tracking across apply iterations (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct Generations {
    pub current: Option<String>,
    pub previous: Option<String>,
}

impl Generations {
    /// Scans `INSTALL_ROOT` for directories matching the version regex on
    /// startup. 0, 1, or 2 matching directories are all valid initial
    /// states (spec §9 open question, resolved per its own
    /// recommendation rather than the reference's "exactly two or error"
    /// behavior).
    pub fn discover(config: &Config) -> Result<Self> {
        let mut candidates = Vec::new();
        match fs::read_dir(&config.install_root) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry?;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if entry.path().is_dir() && is_version_name(&name) {
                        candidates.push(name);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }

        let current = current_version(config);

        let previous = match (&current, candidates.len()) {
            (Some(current), _) => candidates.iter().find(|c| *c != current).cloned(),
            (None, 1) => {
                // No link yet: treat the lone directory as current, not previous.
                None
            }
            _ => None,
        };

        let current = current.or_else(|| candidates.into_iter().next());

        trace!("discovered generations: current={current:?} previous={previous:?}");
        Ok(Self { current, previous })
    }
}

/// `BIN_LINK` and `CFG_LINK` are the sole definition of "current version"
/// (invariant I2). The current generation is read back off `BIN_LINK`.
fn current_version(config: &Config) -> Option<String> {
    let target = fs::read_link(&config.bin_link_path).ok()?;
    let version_dir = target.parent()?.parent()?;
    let name = version_dir.file_name()?.to_string_lossy().into_owned();
    is_version_name(&name).then_some(name)
}

/// A version directory is complete once both `bin/` and `config/` are
/// populated (invariant I4).
pub fn is_complete(config: &Config, version: &str) -> bool {
    config.bin_path(version).is_file() && config.config_path(version).is_file()
}

/// Update = unlink(link); symlink(target, link). A missing link at unlink
/// time is not an error; the window where the link does not exist is
/// tolerated because the service is restarted in the next pipeline stage
/// (spec §4.4).
pub fn redirect_symlink(link: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::remove_file(link) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::SymlinkFailed(format!("{link:?}: {e}"))),
    }
    symlink(target, link).map_err(|e| Error::SymlinkFailed(format!("{link:?} -> {target:?}: {e}")))
}

pub fn redirect_active_links(config: &Config, version: &str) -> Result<()> {
    redirect_symlink(&config.bin_link_path, &config.bin_path(version))?;
    redirect_symlink(&config.config_link_path, &config.config_path(version))?;
    Ok(())
}

/// Removes the directory tree of the previous generation. Non-fatal:
/// invariant I1 may be temporarily violated until the next apply (spec
/// §4.2 stage 9).
pub fn gc_previous(config: &Config, previous: &str) -> Result<()> {
    let dir: PathBuf = config.version_dir(previous);
    if dir.exists() {
        fs::remove_dir_all(&dir).map_err(|e| Error::GCFailed(format!("{dir:?}: {e}")))?;
    } else {
        warn!("previous generation {previous} already absent, nothing to collect");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(root: &Path) -> Config {
        let mut cfg = Config::new("acme", "https://metadata.example.com".into(), false);
        cfg.install_root = root.to_path_buf();
        cfg.bin_link_path = root.join("link").join("bin").join("acme");
        cfg.config_link_path = root.join("link").join("cfg").join("acme.yml");
        cfg
    }

    #[test]
    fn discover_with_empty_root_yields_no_generations() {
        let dir = tempdir().unwrap();
        let cfg = test_config(dir.path());
        let gens = Generations::discover(&cfg).unwrap();
        assert_eq!(gens.current, None);
        assert_eq!(gens.previous, None);
    }

    #[test]
    fn discover_with_two_dirs_splits_current_and_previous() {
        let dir = tempdir().unwrap();
        let cfg = test_config(dir.path());

        let v1 = "v2024.12.01-sha.aaaaaaa";
        let v2 = "v2025.01.15-sha.ccccccc";
        for v in [v1, v2] {
            fs::create_dir_all(cfg.bin_path(v).parent().unwrap()).unwrap();
            fs::write(cfg.bin_path(v), b"bin").unwrap();
            fs::create_dir_all(cfg.config_path(v).parent().unwrap()).unwrap();
            fs::write(cfg.config_path(v), b"cfg").unwrap();
        }
        redirect_active_links(&cfg, v2).unwrap();

        let gens = Generations::discover(&cfg).unwrap();
        assert_eq!(gens.current.as_deref(), Some(v2));
        assert_eq!(gens.previous.as_deref(), Some(v1));
    }

    #[test]
    fn redirect_symlink_tolerates_missing_link() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("nested").join("link");
        let target = dir.path().join("target");
        fs::write(&target, b"x").unwrap();
        redirect_symlink(&link, &target).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), target);
    }

    #[test]
    fn gc_previous_is_noop_when_already_absent() {
        let dir = tempdir().unwrap();
        let cfg = test_config(dir.path());
        gc_previous(&cfg, "v2024.12.01-sha.aaaaaaa").unwrap();
    }

    #[test]
    fn is_complete_requires_both_bin_and_config() {
        let dir = tempdir().unwrap();
        let cfg = test_config(dir.path());
        let v = "v2025.01.15-sha.ccccccc";
        assert!(!is_complete(&cfg, v));
        fs::create_dir_all(cfg.bin_path(v).parent().unwrap()).unwrap();
        fs::write(cfg.bin_path(v), b"bin").unwrap();
        assert!(!is_complete(&cfg, v));
        fs::create_dir_all(cfg.config_path(v).parent().unwrap()).unwrap();
        fs::write(cfg.config_path(v), b"cfg").unwrap();
        assert!(is_complete(&cfg, v));
    }
}
