// SPDX-FileCopyrightText: Copyright © 2026 Nebula Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Credential acquisition for the authenticated artifact download (spec
//! §4.2 stage 2, §9 "Credential acquisition"). The OAuth/service-account
//! exchange itself is an external collaborator spec.md scopes out of the
//! core; this module defines the pluggable interface and one concrete
//! adapter for a Google-style service-account key.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Returns a bearer token, possibly refreshing it.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: u64,
    iat: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GoogleServiceAccountTokenSource {
    key: ServiceAccountKey,
}

impl GoogleServiceAccountTokenSource {
    pub fn from_key_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let key: ServiceAccountKey = serde_json::from_slice(&bytes)?;
        Ok(Self { key })
    }
}

#[async_trait::async_trait]
impl TokenSource for GoogleServiceAccountTokenSource {
    async fn token(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs();

        let claims = Claims {
            iss: self.key.client_email.clone(),
            scope: SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            exp: now + 3600,
            iat: now,
        };

        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| Error::BootstrapFailed(format!("invalid service account key: {e}")))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| Error::BootstrapFailed(format!("jwt signing failed: {e}")))?;

        let response = crate::http::client()
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let parsed: TokenResponse = response.json().await?;
        Ok(parsed.access_token)
    }
}

/// A fixed-token source for tests and for operators who proxy auth through
/// another mechanism entirely.
pub struct StaticTokenSource(pub String);

#[async_trait::async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

pub fn default_key_path(install_root: &Path) -> PathBuf {
    install_root.join("service-account.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_returns_fixed_token() {
        let source = StaticTokenSource("test-token".into());
        assert_eq!(source.token().await.unwrap(), "test-token");
    }
}
