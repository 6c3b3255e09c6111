// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Find-or-create a named channel within a session.
//!
//! The registry lookup always happens first; the transport is asked to create
//! the channel only on a miss.  Lookup-then-create is not atomic: two clients
//! racing on the same unique name rely on the backend rejecting the second
//! create.

use crate::channel::{Channel, ChannelSpec};
use crate::error::{ChatResult, ErrorCode};
use crate::session::Session;

/// How a channel was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(String),
    Created(String),
}

impl Resolution {
    pub fn unique_name(&self) -> &str {
        match self {
            Self::Found(name) | Self::Created(name) => name,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Look `spec.unique_name` up in the session registry, creating the channel
/// on a miss.  A created channel is added to the registry in the `Resolved`
/// state.
pub async fn resolve(session: &mut Session, spec: &ChannelSpec) -> ChatResult<Resolution> {
    let auth = session.authorize().await?;

    if session.registry().contains(&spec.unique_name) {
        tracing::debug!(channel = %spec.unique_name, "channel found in registry");
        return Ok(Resolution::Found(spec.unique_name.clone()));
    }

    tracing::debug!(channel = %spec.unique_name, kind = %spec.kind, "creating channel");
    let snapshot = match session.transport().create_channel(&auth, spec).await {
        Ok(snapshot) => snapshot,
        Err(e) => return Err(session.transport_error(ErrorCode::ChannelCreate, &e).await),
    };

    let name = snapshot.unique_name.clone();
    session.registry_mut().insert(Channel::from_snapshot(snapshot));
    tracing::info!(channel = %name, "created channel");
    Ok(Resolution::Created(name))
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
