// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod memory;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::channel::{ChannelSnapshot, ChannelSpec, Message};
use crate::credential::Credential;
use crate::events::EventStream;
use crate::session::SessionConfig;

/// The backend no longer accepts the caller's access token.
///
/// Carried inside the `anyhow::Error` of any transport operation; callers
/// downcast to tell it apart from other failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRejected;

impl fmt::Display for TokenRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("access token expired")
    }
}

impl std::error::Error for TokenRejected {}

/// Whether `err` (or anything in its chain) is a [`TokenRejected`].
pub fn is_token_rejected(err: &anyhow::Error) -> bool {
    err.downcast_ref::<TokenRejected>().is_some()
}

/// Boxed future returned by [`MessagingTransport`] operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// The messaging backend: session bootstrap, channel primitives, and
/// per-channel event subscriptions.
///
/// Object-safe for use as `Arc<dyn MessagingTransport>`.  Every call carries
/// the current credential; an expired token is rejected with
/// [`TokenRejected`].
pub trait MessagingTransport: Send + Sync + 'static {
    /// Authenticate and return the channel list synchronized according to
    /// `config.strategy`.
    fn connect<'a>(
        &'a self,
        auth: &'a Credential,
        config: &'a SessionConfig,
    ) -> TransportFuture<'a, Vec<ChannelSnapshot>>;

    fn create_channel<'a>(
        &'a self,
        auth: &'a Credential,
        spec: &'a ChannelSpec,
    ) -> TransportFuture<'a, ChannelSnapshot>;

    fn join<'a>(&'a self, auth: &'a Credential, unique_name: &'a str) -> TransportFuture<'a, ()>;

    /// Submit a message; resolves once it is persisted and broadcast.
    fn send<'a>(
        &'a self,
        auth: &'a Credential,
        unique_name: &'a str,
        body: &'a str,
    ) -> TransportFuture<'a, Message>;

    /// Attach a listener to a joined channel.
    fn subscribe<'a>(
        &'a self,
        auth: &'a Credential,
        unique_name: &'a str,
    ) -> TransportFuture<'a, EventStream>;
}
