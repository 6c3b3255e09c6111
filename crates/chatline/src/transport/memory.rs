// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process loopback transport.
//!
//! Holds channels, members, and messages in memory and broadcasts channel
//! events to subscribers.  Used by the `chatline` binary when no real backend
//! is wired in, and by the tests as an instrumented collaborator: every
//! operation is counted and any operation can be made to fail.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{broadcast, RwLock};

use crate::channel::{ChannelSnapshot, ChannelSpec, Member, Message};
use crate::credential::Credential;
use crate::events::{ChannelEvent, EventStream};
use crate::session::{SessionConfig, SyncStrategy};
use crate::transport::{MessagingTransport, TokenRejected, TransportFuture};

/// Per-channel event buffer.
const EVENT_CAPACITY: usize = 256;

/// Transport operations, for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    CreateChannel,
    Join,
    Send,
    Subscribe,
}

impl Operation {
    const ALL: [Operation; 5] =
        [Self::Connect, Self::CreateChannel, Self::Join, Self::Send, Self::Subscribe];

    fn index(self) -> usize {
        match self {
            Self::Connect => 0,
            Self::CreateChannel => 1,
            Self::Join => 2,
            Self::Send => 3,
            Self::Subscribe => 4,
        }
    }
}

struct HubChannel {
    friendly_name: String,
    kind: crate::channel::ChannelKind,
    members: BTreeSet<Member>,
    messages: Vec<Message>,
    attributes: BTreeMap<String, String>,
    next_seq: u64,
    events: broadcast::Sender<ChannelEvent>,
}

impl HubChannel {
    fn snapshot(&self, unique_name: &str, max_messages: usize) -> ChannelSnapshot {
        let skip = self.messages.len().saturating_sub(max_messages);
        ChannelSnapshot {
            unique_name: unique_name.to_owned(),
            friendly_name: self.friendly_name.clone(),
            kind: self.kind,
            members: self.members.iter().cloned().collect(),
            messages: self.messages[skip..].to_vec(),
            attributes: self.attributes.clone(),
        }
    }

    fn post(&mut self, author: &str, body: &str) -> Message {
        let message =
            Message { author: author.to_owned(), body: body.to_owned(), sequence: self.next_seq };
        self.next_seq += 1;
        self.messages.push(message.clone());
        // No subscribers is fine.
        let _ = self.events.send(ChannelEvent::MessageAdded { message: message.clone() });
        message
    }
}

#[derive(Default)]
struct Hub {
    /// token -> identity. Empty means any non-empty token is accepted.
    tokens: HashMap<String, String>,
    revoked: HashSet<String>,
    channels: IndexMap<String, HubChannel>,
}

impl Hub {
    fn authenticate(&self, auth: &Credential) -> anyhow::Result<()> {
        if auth.token.is_empty() {
            anyhow::bail!("missing access token");
        }
        if self.revoked.contains(&auth.token) {
            return Err(TokenRejected.into());
        }
        if self.tokens.is_empty() {
            return Ok(());
        }
        match self.tokens.get(&auth.token) {
            Some(identity) if *identity == auth.identity => Ok(()),
            Some(_) => anyhow::bail!("token does not belong to {}", auth.identity),
            None => anyhow::bail!("invalid access token"),
        }
    }

    fn channel_mut(&mut self, unique_name: &str) -> anyhow::Result<&mut HubChannel> {
        self.channels
            .get_mut(unique_name)
            .ok_or_else(|| anyhow::anyhow!("channel not found: {unique_name}"))
    }
}

/// Loopback [`MessagingTransport`].
#[derive(Default)]
pub struct MemoryTransport {
    hub: RwLock<Hub>,
    faults: RwLock<HashMap<Operation, String>>,
    calls: [AtomicU32; 5],
}

impl MemoryTransport {
    /// A transport that accepts any non-empty token.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Only accept `token`, issued to `identity` (repeatable).
    pub async fn issue_token(&self, token: impl Into<String>, identity: impl Into<String>) {
        self.hub.write().await.tokens.insert(token.into(), identity.into());
    }

    /// Reject `token` from now on.
    pub async fn revoke_token(&self, token: &str) {
        self.hub.write().await.revoked.insert(token.to_owned());
    }

    /// Make every later call of `op` fail with `message`.
    pub async fn fail(&self, op: Operation, message: impl Into<String>) {
        self.faults.write().await.insert(op, message.into());
    }

    pub async fn heal(&self, op: Operation) {
        self.faults.write().await.remove(&op);
    }

    /// Number of times `op` was invoked (including failed calls).
    pub fn calls(&self, op: Operation) -> u32 {
        self.calls[op.index()].load(Ordering::Relaxed)
    }

    pub fn total_calls(&self) -> u32 {
        Operation::ALL.iter().map(|op| self.calls(*op)).sum()
    }

    /// Create a channel directly on the backend, bypassing any session.
    pub async fn seed_channel(&self, spec: &ChannelSpec) {
        let mut hub = self.hub.write().await;
        hub.channels.entry(spec.unique_name.clone()).or_insert_with(|| new_channel(spec));
    }

    /// Post a message as `author` (another participant).
    pub async fn post_as(&self, author: &str, unique_name: &str, body: &str) -> anyhow::Result<Message> {
        let mut hub = self.hub.write().await;
        Ok(hub.channel_mut(unique_name)?.post(author, body))
    }

    /// Emit an arbitrary event on a channel.
    pub async fn emit(&self, unique_name: &str, event: ChannelEvent) -> anyhow::Result<()> {
        let mut hub = self.hub.write().await;
        let channel = hub.channel_mut(unique_name)?;
        let _ = channel.events.send(event);
        Ok(())
    }

    pub async fn snapshot(&self, unique_name: &str) -> Option<ChannelSnapshot> {
        let hub = self.hub.read().await;
        hub.channels.get(unique_name).map(|c| c.snapshot(unique_name, usize::MAX))
    }

    /// Count the call and return the injected fault, if any.
    async fn enter(&self, op: Operation) -> anyhow::Result<()> {
        self.calls[op.index()].fetch_add(1, Ordering::Relaxed);
        match self.faults.read().await.get(&op) {
            Some(message) => anyhow::bail!("{message}"),
            None => Ok(()),
        }
    }
}

fn new_channel(spec: &ChannelSpec) -> HubChannel {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    HubChannel {
        friendly_name: spec.friendly_name.clone(),
        kind: spec.kind,
        members: BTreeSet::new(),
        messages: Vec::new(),
        attributes: BTreeMap::new(),
        next_seq: 0,
        events,
    }
}

impl MessagingTransport for MemoryTransport {
    fn connect<'a>(
        &'a self,
        auth: &'a Credential,
        config: &'a SessionConfig,
    ) -> TransportFuture<'a, Vec<ChannelSnapshot>> {
        Box::pin(async move {
            self.enter(Operation::Connect).await?;
            let hub = self.hub.read().await;
            hub.authenticate(auth)?;
            let channels = match config.strategy {
                SyncStrategy::All => hub
                    .channels
                    .iter()
                    .map(|(name, c)| c.snapshot(name, config.initial_message_count))
                    .collect(),
                SyncStrategy::None => Vec::new(),
            };
            Ok(channels)
        })
    }

    fn create_channel<'a>(
        &'a self,
        auth: &'a Credential,
        spec: &'a ChannelSpec,
    ) -> TransportFuture<'a, ChannelSnapshot> {
        Box::pin(async move {
            self.enter(Operation::CreateChannel).await?;
            let mut hub = self.hub.write().await;
            hub.authenticate(auth)?;
            if hub.channels.contains_key(&spec.unique_name) {
                anyhow::bail!("channel already exists: {}", spec.unique_name);
            }
            let channel = new_channel(spec);
            let snapshot = channel.snapshot(&spec.unique_name, 0);
            hub.channels.insert(spec.unique_name.clone(), channel);
            Ok(snapshot)
        })
    }

    fn join<'a>(&'a self, auth: &'a Credential, unique_name: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.enter(Operation::Join).await?;
            let mut hub = self.hub.write().await;
            hub.authenticate(auth)?;
            let channel = hub.channel_mut(unique_name)?;
            let member = Member::new(auth.identity.clone());
            if channel.members.insert(member.clone()) {
                let _ = channel.events.send(ChannelEvent::MemberJoined { member });
            }
            Ok(())
        })
    }

    fn send<'a>(
        &'a self,
        auth: &'a Credential,
        unique_name: &'a str,
        body: &'a str,
    ) -> TransportFuture<'a, Message> {
        Box::pin(async move {
            self.enter(Operation::Send).await?;
            let mut hub = self.hub.write().await;
            hub.authenticate(auth)?;
            let channel = hub.channel_mut(unique_name)?;
            if !channel.members.contains(&Member::new(auth.identity.clone())) {
                anyhow::bail!("{} is not a member of {unique_name}", auth.identity);
            }
            Ok(channel.post(&auth.identity, body))
        })
    }

    fn subscribe<'a>(
        &'a self,
        auth: &'a Credential,
        unique_name: &'a str,
    ) -> TransportFuture<'a, EventStream> {
        Box::pin(async move {
            self.enter(Operation::Subscribe).await?;
            let mut hub = self.hub.write().await;
            hub.authenticate(auth)?;
            let channel = hub.channel_mut(unique_name)?;
            Ok(channel.events.subscribe())
        })
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
