// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access manager: sole holder of the current access token.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::credential::Credential;
use crate::error::{ChatResult, ErrorCode};

/// Lifecycle notifications published by the [`AccessManager`].
///
/// Delivered over a broadcast channel, so each consumer sees them on its own
/// task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AccessEvent {
    Expired,
    Updated { token: String },
    Error { message: String },
}

struct TokenState {
    token: String,
    expired: bool,
}

/// Wraps one [`Credential`] and publishes token lifecycle events.
pub struct AccessManager {
    identity: String,
    state: RwLock<TokenState>,
    event_tx: broadcast::Sender<AccessEvent>,
}

impl AccessManager {
    pub fn new(credential: Credential) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            identity: credential.identity,
            state: RwLock::new(TokenState { token: credential.token, expired: false }),
            event_tx,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccessEvent> {
        self.event_tx.subscribe()
    }

    /// Current token, or [`ErrorCode::TokenExpired`] once expired.
    pub async fn token(&self) -> ChatResult<String> {
        let state = self.state.read().await;
        if state.expired {
            return Err(ErrorCode::TokenExpired.to_error("access token has expired"));
        }
        Ok(state.token.clone())
    }

    /// Identity plus current token, as handed to the transport.
    pub async fn credential(&self) -> ChatResult<Credential> {
        let token = self.token().await?;
        Ok(Credential { identity: self.identity.clone(), token })
    }

    pub async fn is_expired(&self) -> bool {
        self.state.read().await.expired
    }

    /// Mark the token expired and notify subscribers. Repeated calls notify once.
    pub async fn mark_expired(&self) {
        let mut state = self.state.write().await;
        if state.expired {
            return;
        }
        state.expired = true;
        drop(state);
        let _ = self.event_tx.send(AccessEvent::Expired);
    }

    /// Replace the token (supersedes the issued credential).
    pub async fn update_token(&self, token: impl Into<String>) {
        let token = token.into();
        {
            let mut state = self.state.write().await;
            state.token = token.clone();
            state.expired = false;
        }
        let _ = self.event_tx.send(AccessEvent::Updated { token });
    }

    pub fn report_error(&self, message: impl Into<String>) {
        let _ = self.event_tx.send(AccessEvent::Error { message: message.into() });
    }
}

/// Spawn a task that logs access lifecycle events.
///
/// Expiry is only logged: nothing re-fetches the token.
// TODO: re-run the token fetch on `Expired` and feed it to `update_token`.
pub fn spawn_access_logger(access: &AccessManager, cancel: CancellationToken) -> JoinHandle<()> {
    let mut rx = access.subscribe();
    let identity = access.identity().to_owned();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                recv = rx.recv() => match recv {
                    Ok(e) => e,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(skipped = n, "access logger lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            match event {
                AccessEvent::Expired => tracing::info!(identity = %identity, "access token has expired"),
                AccessEvent::Updated { .. } => {
                    tracing::info!(identity = %identity, "access token has updated")
                }
                AccessEvent::Error { message } => {
                    tracing::warn!(identity = %identity, err = %message, "access manager error")
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "access_tests.rs"]
mod tests;
