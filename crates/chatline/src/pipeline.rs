// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client bootstrap: token fetch, session, channel, join, greeting.
//!
//! Each stage runs only after the previous one succeeded.  Every failure is
//! reported exactly once through the [`Notifier`] and ends the pipeline,
//! except a failed greeting, which is reported but leaves the client
//! running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info};

use crate::channel::ChannelSpec;
use crate::credential::access::{spawn_access_logger, AccessEvent, AccessManager};
use crate::credential::provision::TokenProvisioner;
use crate::error::{ChatError, ChatResult, ErrorCode};
use crate::events::{EventDispatcher, EventObserver, LastMessage, LoggingObserver};
use crate::membership::{self, JoinedChannel};
use crate::message::{self, Ack};
use crate::resolve::{self, Resolution};
use crate::retry::RetryPolicy;
use crate::session::{Session, SessionConfig, SessionController};
use crate::transport::MessagingTransport;

/// User-visible error notices (the toast surface).
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<ChatError>,
}

impl Default for Notifier {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatError> {
        self.tx.subscribe()
    }

    /// Log and publish `err`, handing it back for propagation.
    pub fn report(&self, err: ChatError) -> ChatError {
        if err.code.is_notice() {
            info!(code = %err.code, err = %err.message, "notice");
        } else {
            error!(code = %err.code, err = %err.message, "operation failed");
        }
        let _ = self.tx.send(err.clone());
        err
    }
}

/// Everything [`start`] needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub token_url: String,
    pub channel: ChannelSpec,
    pub session: SessionConfig,
    /// Sent once after joining; `None` skips it.
    pub greeting: Option<String>,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
}

impl PipelineConfig {
    pub fn new(token_url: impl Into<String>, channel: ChannelSpec) -> Self {
        Self {
            token_url: token_url.into(),
            channel,
            session: SessionConfig::default(),
            greeting: Some("Test Message".to_owned()),
            retry: RetryPolicy::none(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// A running client: ready session, joined channel, live projections.
pub struct ChatClient {
    session: Session,
    channel: JoinedChannel,
    resolution: Resolution,
    last_message: Arc<LastMessage>,
    greeting: Option<Ack>,
    /// Cancels the background tasks when the client is dropped.
    cancel: DropGuard,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatClient {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn channel(&self) -> &JoinedChannel {
        &self.channel
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn last_message(&self) -> &Arc<LastMessage> {
        &self.last_message
    }

    /// Acknowledgement of the greeting, if one was sent successfully.
    pub fn greeting(&self) -> Option<Ack> {
        self.greeting
    }

    /// Send on the joined channel.
    pub async fn send(&mut self, body: &str) -> ChatResult<Ack> {
        let name = self.channel.unique_name().to_owned();
        message::send(&mut self.session, &name, body).await
    }

    /// Fold events seen by the pump into the session registry.
    pub fn sync(&mut self) {
        self.channel.sync_registry(&mut self.session);
    }

    /// Stop the pump and background tasks, then close the session.
    pub async fn close(mut self) {
        self.sync();
        self.channel.leave().await;
        drop(self.cancel);
        for task in self.tasks {
            let _ = task.await;
        }
        self.session.close();
    }
}

/// Run the bootstrap pipeline against `transport`.
pub async fn start(
    config: &PipelineConfig,
    transport: Arc<dyn MessagingTransport>,
    notifier: &Notifier,
) -> ChatResult<ChatClient> {
    let credential = TokenProvisioner::new(config.http_timeout)
        .fetch(&config.token_url)
        .await
        .map_err(|e| notifier.report(e))?;
    info!(identity = %credential.identity, "access token issued");

    let access = AccessManager::new(credential);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let tasks = vec![
        spawn_access_logger(&access, cancel.clone()),
        spawn_expiry_notices(&access, notifier.clone(), cancel.clone()),
    ];

    let mut session = SessionController::new(transport, access, config.session.clone())
        .with_retry(config.retry)
        .create()
        .await
        .map_err(|e| notifier.report(e))?;

    let resolution =
        resolve::resolve(&mut session, &config.channel).await.map_err(|e| notifier.report(e))?;
    let name = resolution.unique_name().to_owned();

    let last_message = LastMessage::new();
    let dispatcher = EventDispatcher::new()
        .with_observer(Arc::new(LoggingObserver))
        .with_observer(Arc::clone(&last_message) as Arc<dyn EventObserver>);
    let channel =
        membership::join(&mut session, &name, dispatcher).await.map_err(|e| notifier.report(e))?;

    let greeting = match &config.greeting {
        Some(body) => match message::send(&mut session, &name, body).await {
            Ok(ack) => Some(ack),
            Err(e) => {
                notifier.report(e);
                None
            }
        },
        None => None,
    };

    Ok(ChatClient {
        session,
        channel,
        resolution,
        last_message,
        greeting,
        cancel: guard,
        tasks,
    })
}

/// Turn access-token expiry into a [`ErrorCode::TokenExpired`] notice.
fn spawn_expiry_notices(
    access: &AccessManager,
    notifier: Notifier,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = access.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                recv = rx.recv() => match recv {
                    Ok(e) => e,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if matches!(event, AccessEvent::Expired) {
                notifier.report(ErrorCode::TokenExpired.to_error("access token has expired"));
            }
        }
    })
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
