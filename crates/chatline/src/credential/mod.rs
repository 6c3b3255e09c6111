// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential provisioning and access-token lifecycle.
//!
//! The [`provision::TokenProvisioner`] fetches an identity and access token
//! from the token endpoint; the [`access::AccessManager`] then holds the
//! token for the lifetime of the session and publishes lifecycle events.

pub mod access;
pub mod provision;

use serde::{Deserialize, Serialize};

/// Identity and access token issued by the token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub identity: String,
    pub token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("token", &"<redacted>")
            .finish()
    }
}
