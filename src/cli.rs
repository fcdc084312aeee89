// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! CLI surface (spec §6): a single `serve` subcommand carrying the flags
//! the reference agent recognizes. The flag-parsing front end itself is
//! out of the core's scope; this module only decodes the flags into a
//! [`Config`] and hands off to [`crate::run`].

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "nebula", about = "Secure update agent for a managed service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Starts the update agent's metadata poller and apply pipeline.
    Serve {
        /// Path to a configuration file. Unused by the core itself.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "localhost:8000")]
        http_addr: String,

        #[arg(long, default_value = "localhost:9000")]
        internal_http_addr: String,

        #[arg(long, default_value_t = false)]
        debug: bool,

        #[arg(long, default_value_t = false)]
        auto_update: bool,

        #[arg(long, default_value = "https://metadata.nebula.example.com")]
        metadata_url: String,

        /// The service this agent manages; determines the on-disk layout
        /// and link names (spec §3, §6).
        #[arg(long, default_value = "nebula-service")]
        service_name: String,
    },
}

impl Command {
    pub fn into_config(self) -> (Config, ServeOptions) {
        match self {
            Command::Serve {
                config: _config,
                http_addr,
                internal_http_addr,
                debug,
                auto_update,
                metadata_url,
                service_name,
            } => {
                let config = Config::new(service_name, metadata_url, debug);
                (
                    config,
                    ServeOptions {
                        http_addr,
                        internal_http_addr,
                        auto_update,
                    },
                )
            }
        }
    }
}

/// Flags acknowledged by `serve` but outside the core's responsibility:
/// the HTTP server addresses are logged, not bound (spec §1 explicitly
/// scopes the CLI/server scaffolding out of the orchestration engine).
#[derive(Debug)]
pub struct ServeOptions {
    pub http_addr: String,
    pub internal_http_addr: String,
    pub auto_update: bool,
}
