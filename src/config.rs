// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Typed configuration for the update agent, threaded explicitly into every
//! component constructor rather than read from globals.

use std::path::PathBuf;
use std::time::Duration;

/// All paths, URLs, and intervals the agent needs. See spec §9 "Global
/// state and paths" for the option names this mirrors.
#[derive(Debug, Clone)]
pub struct Config {
    pub install_root: PathBuf,
    pub service_name: String,
    pub metadata_url: String,
    pub targets_url: String,
    pub bin_link_path: PathBuf,
    pub config_link_path: PathBuf,
    pub service_account_key_path: PathBuf,
    pub managed_unit_name: String,
    pub poll_interval_metadata: Duration,
    pub poll_interval_consent: Duration,
    pub debug: bool,
}

impl Config {
    /// Defaults matching the reference CLI flags (spec §6), parameterized
    /// only by the `--metadata-url` and `--debug` flags the `serve`
    /// subcommand accepts.
    pub fn new(service_name: impl Into<String>, metadata_url: String, debug: bool) -> Self {
        let service_name = service_name.into();
        let install_root = PathBuf::from("/opt/nebula");

        Self {
            bin_link_path: PathBuf::from(format!("/usr/local/bin/{service_name}")),
            config_link_path: PathBuf::from(format!("/etc/{service_name}/{service_name}.yml")),
            service_account_key_path: install_root.join("service-account.json"),
            targets_url: format!("{metadata_url}/targets"),
            metadata_url,
            install_root,
            managed_unit_name: format!("{service_name}.service"),
            poll_interval_metadata: Duration::from_secs(60),
            poll_interval_consent: Duration::from_secs(5),
            debug,
            service_name,
        }
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.install_root.join("tmp")
    }

    pub fn metadata_cache_dir(&self) -> PathBuf {
        self.tmp_dir()
    }

    pub fn targets_cache_dir(&self) -> PathBuf {
        self.tmp_dir().join("targets")
    }

    pub fn index_path(&self) -> PathBuf {
        self.install_root
            .join("data")
            .join(&self.service_name)
            .join(format!("{}-index.json", self.service_name))
    }

    pub fn status_path(&self) -> PathBuf {
        self.install_root.join("update_status.json")
    }

    pub fn staged_artifact_path(&self) -> PathBuf {
        self.tmp_dir().join(format!("{}.zip", self.service_name))
    }

    pub fn promoted_artifact_path(&self) -> PathBuf {
        self.install_root.join(format!("{}.zip", self.service_name))
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.install_root.join(version)
    }

    pub fn bin_path(&self, version: &str) -> PathBuf {
        self.version_dir(version)
            .join("bin")
            .join(&self.service_name)
    }

    pub fn config_path(&self, version: &str) -> PathBuf {
        self.version_dir(version)
            .join("config")
            .join(format!("{}.yml", self.service_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_are_rooted_at_install_root() {
        let cfg = Config::new("acme", "https://metadata.example.com".into(), false);
        assert_eq!(cfg.tmp_dir(), cfg.install_root.join("tmp"));
        assert_eq!(
            cfg.index_path(),
            cfg.install_root.join("data/acme/acme-index.json")
        );
        assert_eq!(
            cfg.bin_path("v2025.01.15-sha.abc1234"),
            cfg.install_root.join("v2025.01.15-sha.abc1234/bin/acme")
        );
    }
}
