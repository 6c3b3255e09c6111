// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel data model and the session-owned channel registry.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::events::ChannelEvent;

/// Visibility of a channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Public,
    Private,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => anyhow::bail!("invalid channel type: {other}"),
        }
    }
}

/// Local join progress for a resolved channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinState {
    #[default]
    Resolved,
    Joining,
    Joined,
    JoinFailed,
}

/// A channel participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Member {
    pub identity: String,
}

impl Member {
    pub fn new(identity: impl Into<String>) -> Self {
        Self { identity: identity.into() }
    }
}

/// A message in a channel. `sequence` is assigned by the transport and is
/// monotonic within one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub author: String,
    pub body: String,
    pub sequence: u64,
}

/// Parameters for creating a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub friendly_name: String,
    pub unique_name: String,
    pub kind: ChannelKind,
}

/// Channel state as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub unique_name: String,
    pub friendly_name: String,
    pub kind: ChannelKind,
    pub members: Vec<Member>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// A channel held in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub unique_name: String,
    pub friendly_name: String,
    pub kind: ChannelKind,
    pub members: BTreeSet<Member>,
    pub messages: Vec<Message>,
    pub attributes: BTreeMap<String, String>,
    pub join_state: JoinState,
}

impl Channel {
    pub fn from_snapshot(snapshot: ChannelSnapshot) -> Self {
        Self {
            unique_name: snapshot.unique_name,
            friendly_name: snapshot.friendly_name,
            kind: snapshot.kind,
            members: snapshot.members.into_iter().collect(),
            messages: snapshot.messages,
            attributes: snapshot.attributes,
            join_state: JoinState::Resolved,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.join_state == JoinState::Joined
    }

    /// Insert a message keeping sequence order; a repeated sequence replaces
    /// the stored copy (at-least-once delivery).
    pub fn upsert_message(&mut self, message: Message) {
        match self.messages.binary_search_by_key(&message.sequence, |m| m.sequence) {
            Ok(idx) => self.messages[idx] = message,
            Err(idx) => self.messages.insert(idx, message),
        }
    }

    pub fn remove_message(&mut self, sequence: u64) {
        self.messages.retain(|m| m.sequence != sequence);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Fold a transport event into this channel's local copy.
    pub fn apply(&mut self, event: &ChannelEvent) {
        match event {
            ChannelEvent::MessageAdded { message } | ChannelEvent::MessageChanged { message } => {
                self.upsert_message(message.clone());
            }
            ChannelEvent::MessageDeleted { message } => self.remove_message(message.sequence),
            ChannelEvent::MemberJoined { member } | ChannelEvent::MemberChanged { member } => {
                self.members.insert(member.clone());
            }
            ChannelEvent::MemberDeleted { member } => {
                self.members.remove(member);
            }
            ChannelEvent::AttributesChanged { attributes } => {
                self.attributes = attributes.clone();
            }
            _ => {}
        }
    }
}

/// Mapping from unique channel name to channel, in synchronization order.
#[derive(Debug, Default, Clone)]
pub struct ChannelRegistry {
    channels: IndexMap<String, Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, unique_name: &str) -> Option<&Channel> {
        self.channels.get(unique_name)
    }

    pub fn get_mut(&mut self, unique_name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(unique_name)
    }

    pub fn contains(&self, unique_name: &str) -> bool {
        self.channels.contains_key(unique_name)
    }

    /// Insert a channel, replacing any entry with the same unique name.
    pub fn insert(&mut self, channel: Channel) {
        self.channels.insert(channel.unique_name.clone(), channel);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
