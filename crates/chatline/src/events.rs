// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel state-change events and their fan-out to observers.
//!
//! Once a channel is joined, the transport yields an unbounded stream of
//! [`ChannelEvent`]s.  The [`EventDispatcher`] pump forwards every event,
//! unchanged, to each registered [`EventObserver`].  A failing or panicking
//! observer is logged and skipped; it never stops the pump or starves the
//! other observers.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::{Channel, Member, Message};

// -- Wire-format event types -------------------------------------------------

/// A state change on a joined channel, as emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    MessageAdded { message: Message },
    MessageChanged { message: Message },
    MessageDeleted { message: Message },
    MemberJoined { member: Member },
    MemberChanged { member: Member },
    MemberDeleted { member: Member },
    AttributesChanged { attributes: BTreeMap<String, String> },
    TypingStarted { member: Member },
    TypingEnded { member: Member },
    SynchronizationChanged { unique_name: String },
}

impl ChannelEvent {
    /// Short kind name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageAdded { .. } => "message_added",
            Self::MessageChanged { .. } => "message_changed",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::MemberJoined { .. } => "member_joined",
            Self::MemberChanged { .. } => "member_changed",
            Self::MemberDeleted { .. } => "member_deleted",
            Self::AttributesChanged { .. } => "attributes_changed",
            Self::TypingStarted { .. } => "typing_started",
            Self::TypingEnded { .. } => "typing_ended",
            Self::SynchronizationChanged { .. } => "synchronization_changed",
        }
    }
}

/// Stream of events for one joined channel.
pub type EventStream = broadcast::Receiver<ChannelEvent>;

// -- Observers ---------------------------------------------------------------

/// Receives every event for a joined channel.
///
/// Called from the dispatcher task, never from the coordinating task.
pub trait EventObserver: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn on_event(&self, channel: &str, event: &ChannelEvent) -> anyhow::Result<()>;
}

/// Logs one line per event, by kind.
pub struct LoggingObserver;

impl EventObserver for LoggingObserver {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_event(&self, channel: &str, event: &ChannelEvent) -> anyhow::Result<()> {
        match event {
            ChannelEvent::MessageAdded { message } => {
                debug!(channel, author = %message.author, body = %message.body, "message added");
            }
            ChannelEvent::MessageChanged { message } => {
                debug!(channel, body = %message.body, "message changed");
            }
            ChannelEvent::MessageDeleted { message } => {
                debug!(channel, seq = message.sequence, "message deleted");
            }
            ChannelEvent::MemberJoined { member } => {
                debug!(channel, member = %member.identity, "member joined");
            }
            ChannelEvent::MemberChanged { member } => {
                debug!(channel, member = %member.identity, "member changed");
            }
            ChannelEvent::MemberDeleted { member } => {
                debug!(channel, member = %member.identity, "member deleted");
            }
            ChannelEvent::AttributesChanged { attributes } => {
                debug!(channel, ?attributes, "attributes changed");
            }
            ChannelEvent::TypingStarted { member } => {
                debug!(channel, member = %member.identity, "started typing");
            }
            ChannelEvent::TypingEnded { member } => {
                debug!(channel, member = %member.identity, "ended typing");
            }
            ChannelEvent::SynchronizationChanged { .. } => {}
        }
        Ok(())
    }
}

/// The "last message" projection rendered by the UI: `author:body` of the
/// most recently added message.
pub struct LastMessage {
    tx: watch::Sender<Option<String>>,
}

impl LastMessage {
    pub fn new() -> Arc<Self> {
        let (tx, _) = watch::channel(None);
        Arc::new(Self { tx })
    }

    pub fn get(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl EventObserver for LastMessage {
    fn name(&self) -> &str {
        "last_message"
    }

    fn on_event(&self, _channel: &str, event: &ChannelEvent) -> anyhow::Result<()> {
        if let ChannelEvent::MessageAdded { message } = event {
            self.tx.send_replace(Some(format!("{}:{}", message.author, message.body)));
        }
        Ok(())
    }
}

/// Keeps a live copy of the joined channel up to date from its events.
pub struct ChannelMirror {
    tx: watch::Sender<Channel>,
    /// One past the highest message sequence seen; 0 when none.
    seen: AtomicU64,
}

impl ChannelMirror {
    pub fn new(initial: Channel) -> Arc<Self> {
        let seen = initial.messages.iter().map(|m| m.sequence + 1).max().unwrap_or(0);
        let (tx, _) = watch::channel(initial);
        Arc::new(Self { tx, seen: AtomicU64::new(seen) })
    }

    /// Fold this view into `target`. Members and attributes are replaced;
    /// messages are the mirror's plus any in `target` newer than everything
    /// the mirror has seen, i.e. acked sends the pump has not delivered yet.
    pub fn merge_into(&self, target: &mut Channel) {
        let (view, seen) = {
            let current = self.tx.borrow();
            (current.clone(), self.seen.load(Ordering::Acquire))
        };
        let pending: Vec<Message> =
            target.messages.drain(..).filter(|m| m.sequence >= seen).collect();
        target.messages = view.messages;
        for message in pending {
            target.upsert_message(message);
        }
        target.members = view.members;
        target.attributes = view.attributes;
    }

    pub fn snapshot(&self) -> Channel {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Channel> {
        self.tx.subscribe()
    }
}

impl EventObserver for ChannelMirror {
    fn name(&self) -> &str {
        "mirror"
    }

    fn on_event(&self, _channel: &str, event: &ChannelEvent) -> anyhow::Result<()> {
        self.tx.send_modify(|channel| {
            channel.apply(event);
            if let ChannelEvent::MessageAdded { message }
            | ChannelEvent::MessageChanged { message }
            | ChannelEvent::MessageDeleted { message } = event
            {
                self.seen.fetch_max(message.sequence + 1, Ordering::Release);
            }
        });
        Ok(())
    }
}

// -- Dispatcher --------------------------------------------------------------

/// Fans channel events out to registered observers.
#[derive(Default, Clone)]
pub struct EventDispatcher {
    observers: Vec<Arc<dyn EventObserver>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn register(&mut self, observer: Arc<dyn EventObserver>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Deliver one event to every observer. Returns the number of observers
    /// that failed.
    pub fn dispatch(&self, channel: &str, event: &ChannelEvent) -> usize {
        let mut failed = 0;
        for observer in &self.observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_event(channel, event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    warn!(channel, observer = observer.name(), kind = event.kind(), err = %e, "observer failed");
                }
                Err(_) => {
                    failed += 1;
                    warn!(channel, observer = observer.name(), kind = event.kind(), "observer panicked");
                }
            }
        }
        failed
    }

    /// Spawn the pump for one joined channel. Runs until the stream closes or
    /// `cancel` fires.
    pub fn spawn(
        self,
        channel: String,
        mut events: EventStream,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    recv = events.recv() => match recv {
                        Ok(e) => e,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(channel = %channel, skipped = n, "event pump lagged, events lost");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                self.dispatch(&channel, &event);
            }
            debug!(channel = %channel, "event pump stopped");
        })
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
