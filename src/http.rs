// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared HTTP client for TCP connection reuse, mirroring
//! `moss::request`'s process-wide lazily-built `reqwest::Client`.

use once_cell::sync::Lazy;

static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::ClientBuilder::new()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("build reqwest client")
});

pub fn client() -> &'static reqwest::Client {
    &CLIENT
}
