// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session controller: bootstraps an authenticated messaging session and
//! owns its channel registry.
//!
//! Lifecycle: `Uninitialized -> Synchronizing -> Ready | Failed`, then
//! `Ready -> Closed` on teardown.  A failed bootstrap never yields a
//! [`Session`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::{Channel, ChannelRegistry};
use crate::credential::access::AccessManager;
use crate::credential::Credential;
use crate::error::{ChatError, ChatResult, ErrorCode};
use crate::retry::RetryPolicy;
use crate::transport::{is_token_rejected, MessagingTransport};

/// Default number of trailing messages pre-loaded per channel.
pub const DEFAULT_INITIAL_MESSAGE_COUNT: usize = 500;

/// How much channel state is eagerly loaded at bootstrap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    /// Full channel list and message history.
    #[default]
    All,
    /// Nothing; the registry starts empty.
    None,
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::None => f.write_str("none"),
        }
    }
}

impl std::str::FromStr for SyncStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "none" => Ok(Self::None),
            other => anyhow::bail!("invalid synchronization strategy: {other}"),
        }
    }
}

/// Bootstrap options for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub strategy: SyncStrategy,
    pub initial_message_count: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { strategy: SyncStrategy::All, initial_message_count: DEFAULT_INITIAL_MESSAGE_COUNT }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Synchronizing,
    Ready,
    Failed,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Synchronizing => "synchronizing",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

/// Drives one session bootstrap.
pub struct SessionController {
    transport: Arc<dyn MessagingTransport>,
    access: Arc<AccessManager>,
    config: SessionConfig,
    retry: RetryPolicy,
    state: SessionState,
    history: Vec<SessionState>,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn MessagingTransport>,
        access: Arc<AccessManager>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            access,
            config,
            retry: RetryPolicy::none(),
            state: SessionState::Uninitialized,
            history: vec![SessionState::Uninitialized],
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state this controller has been in, oldest first.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(prev = self.state.as_str(), next = next.as_str(), "session transition");
        self.state = next;
        self.history.push(next);
    }

    /// Authenticate and synchronize. May be called once per controller.
    pub async fn create(&mut self) -> ChatResult<Session> {
        if self.state != SessionState::Uninitialized {
            return Err(ErrorCode::SessionCreate
                .to_error(format!("session already created (state: {})", self.state.as_str())));
        }
        self.transition(SessionState::Synchronizing);

        match self.synchronize().await {
            Ok(registry) => {
                self.transition(SessionState::Ready);
                tracing::info!(
                    identity = self.access.identity(),
                    channels = registry.len(),
                    strategy = %self.config.strategy,
                    "session ready"
                );
                Ok(Session {
                    transport: Arc::clone(&self.transport),
                    access: Arc::clone(&self.access),
                    config: self.config.clone(),
                    retry: self.retry,
                    registry,
                    active: None,
                    closed: false,
                })
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                tracing::warn!(err = %e, "session create failed");
                Err(e)
            }
        }
    }

    async fn synchronize(&self) -> ChatResult<ChannelRegistry> {
        let auth = self.access.credential().await?;
        let auth = &auth;
        let config = &self.config;
        let transport = &self.transport;
        let snapshots =
            match self.retry.run("session create", move || transport.connect(auth, config)).await {
                Ok(snapshots) => snapshots,
                Err(e) => return Err(classify(&self.access, ErrorCode::SessionCreate, &e).await),
            };

        let mut registry = ChannelRegistry::new();
        if config.strategy == SyncStrategy::All {
            for mut snapshot in snapshots {
                let skip = snapshot.messages.len().saturating_sub(config.initial_message_count);
                snapshot.messages.drain(..skip);
                registry.insert(Channel::from_snapshot(snapshot));
            }
        }
        Ok(registry)
    }
}

/// An authenticated messaging session.
///
/// Owned by the coordinating task; components borrow it explicitly.
pub struct Session {
    transport: Arc<dyn MessagingTransport>,
    access: Arc<AccessManager>,
    config: SessionConfig,
    retry: RetryPolicy,
    registry: ChannelRegistry,
    active: Option<String>,
    closed: bool,
}

impl Session {
    pub fn identity(&self) -> &str {
        self.access.identity()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        if self.closed {
            SessionState::Closed
        } else {
            SessionState::Ready
        }
    }

    pub fn access(&self) -> &Arc<AccessManager> {
        &self.access
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut ChannelRegistry {
        &mut self.registry
    }

    pub(crate) fn transport(&self) -> &Arc<dyn MessagingTransport> {
        &self.transport
    }

    pub(crate) fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// The channel this session joined, if any.
    pub fn active_channel(&self) -> Option<&Channel> {
        self.active.as_deref().and_then(|name| self.registry.get(name))
    }

    pub(crate) fn set_active(&mut self, unique_name: &str) {
        self.active = Some(unique_name.to_owned());
    }

    /// Credential for the next transport call. Fails once the session is
    /// closed or the token has expired.
    pub async fn authorize(&self) -> ChatResult<Credential> {
        if self.closed {
            return Err(ErrorCode::SessionClosed.to_error("session is closed"));
        }
        self.access.credential().await
    }

    /// Map a transport failure to `code`. A rejected token instead marks the
    /// access manager expired and yields [`ErrorCode::TokenExpired`].
    pub(crate) async fn transport_error(&self, code: ErrorCode, cause: &anyhow::Error) -> ChatError {
        classify(&self.access, code, cause).await
    }

    /// Tear the session down. Terminal.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.active = None;
            tracing::info!(identity = self.access.identity(), "session closed");
        }
    }
}

async fn classify(access: &AccessManager, code: ErrorCode, cause: &anyhow::Error) -> ChatError {
    if is_token_rejected(cause) {
        tracing::warn!(identity = access.identity(), "transport rejected the access token");
        access.mark_expired().await;
        return ChatError::from_cause(ErrorCode::TokenExpired, cause);
    }
    ChatError::from_cause(code, cause)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
