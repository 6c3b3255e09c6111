// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token endpoint client.

use std::sync::Once;
use std::time::Duration;

use anyhow::Context;

use crate::credential::Credential;
use crate::error::{ChatError, ChatResult, ErrorCode};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Fetches a [`Credential`] from the token endpoint.
///
/// One GET per call; no dedup and no retry.
pub struct TokenProvisioner {
    http: reqwest::Client,
}

impl TokenProvisioner {
    pub fn new(timeout: Duration) -> Self {
        ensure_crypto();
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { http }
    }

    /// `GET <server_url>` and parse `{"identity": .., "token": ..}`.
    ///
    /// Network errors, non-2xx responses, and malformed bodies all yield
    /// [`ErrorCode::AuthFetch`].
    pub async fn fetch(&self, server_url: &str) -> ChatResult<Credential> {
        tracing::debug!(url = server_url, "fetching access token");
        self.do_fetch(server_url).await.map_err(|e| ChatError::from_cause(ErrorCode::AuthFetch, &e))
    }

    async fn do_fetch(&self, server_url: &str) -> anyhow::Result<Credential> {
        let resp = self.http.get(server_url).send().await.with_context(|| format!("GET {server_url}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("token endpoint returned {status}: {text}");
        }

        let bytes = resp.bytes().await?;
        parse_credential(&bytes)
    }
}

/// Parse a token endpoint response body.
pub fn parse_credential(body: &[u8]) -> anyhow::Result<Credential> {
    let credential: Credential =
        serde_json::from_slice(body).context("malformed token response")?;
    if credential.identity.is_empty() {
        anyhow::bail!("malformed token response: empty identity");
    }
    if credential.token.is_empty() {
        anyhow::bail!("malformed token response: empty token");
    }
    Ok(credential)
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
