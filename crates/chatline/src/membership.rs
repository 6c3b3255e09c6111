// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Membership controller: joins a resolved channel and attaches its event
//! listener.
//!
//! Join state per channel: `Resolved -> Joining -> Joined | JoinFailed`.
//! The listener (transport subscription plus dispatcher task) is attached
//! only after the transport confirms the join.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, JoinState, Member};
use crate::error::{ChatResult, ErrorCode};
use crate::events::{ChannelMirror, EventDispatcher, EventObserver};
use crate::session::Session;

/// A joined channel with a live event pump.
///
/// Dropping it stops the pump.
pub struct JoinedChannel {
    unique_name: String,
    mirror: Arc<ChannelMirror>,
    pump: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl JoinedChannel {
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Current view of the channel, kept up to date by the pump.
    pub fn snapshot(&self) -> Channel {
        self.mirror.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Channel> {
        self.mirror.subscribe()
    }

    /// Fold the pump's view of members, messages, and attributes into the
    /// session registry. Acked sends not yet delivered by the pump are kept.
    pub fn sync_registry(&self, session: &mut Session) {
        if let Some(channel) = session.registry_mut().get_mut(&self.unique_name) {
            self.mirror.merge_into(channel);
        }
    }

    /// Stop the pump and wait for it to finish.
    pub async fn leave(mut self) {
        self.cancel.cancel();
        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                tracing::warn!(channel = %self.unique_name, err = %e, "event pump ended abnormally");
            }
        }
    }
}

impl Drop for JoinedChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Join `unique_name`, which must already be in the session registry, and
/// start forwarding its events to `dispatcher`'s observers.
pub async fn join(
    session: &mut Session,
    unique_name: &str,
    mut dispatcher: EventDispatcher,
) -> ChatResult<JoinedChannel> {
    let auth = session.authorize().await?;

    match session.registry().get(unique_name).map(|c| c.join_state) {
        None => {
            return Err(ErrorCode::NotResolved
                .to_error(format!("channel {unique_name} has not been resolved")));
        }
        Some(JoinState::Joined | JoinState::Joining) => {
            return Err(ErrorCode::Join.to_error(format!("channel {unique_name} is already joined")));
        }
        Some(JoinState::Resolved | JoinState::JoinFailed) => {}
    }
    set_join_state(session, unique_name, JoinState::Joining);

    let transport = Arc::clone(session.transport());
    let joined = {
        let transport = &transport;
        let auth = &auth;
        session.retry().run("join", move || transport.join(auth, unique_name)).await
    };
    if let Err(e) = joined {
        set_join_state(session, unique_name, JoinState::JoinFailed);
        tracing::warn!(channel = unique_name, err = %e, "join failed");
        return Err(session.transport_error(ErrorCode::Join, &e).await);
    }

    let events = match transport.subscribe(&auth, unique_name).await {
        Ok(events) => events,
        Err(e) => {
            set_join_state(session, unique_name, JoinState::JoinFailed);
            tracing::warn!(channel = unique_name, err = %e, "event subscription failed");
            return Err(session.transport_error(ErrorCode::Join, &e).await);
        }
    };

    let identity = session.identity().to_owned();
    let mut view = None;
    if let Some(channel) = session.registry_mut().get_mut(unique_name) {
        channel.join_state = JoinState::Joined;
        channel.members.insert(Member::new(identity));
        view = Some(channel.clone());
    }
    let view = view.ok_or_else(|| {
        ErrorCode::NotResolved.to_error(format!("channel {unique_name} left the registry"))
    })?;
    session.set_active(unique_name);

    let mirror = ChannelMirror::new(view);
    dispatcher.register(Arc::clone(&mirror) as Arc<dyn EventObserver>);
    let observers = dispatcher.observer_count();
    let cancel = CancellationToken::new();
    let pump = dispatcher.spawn(unique_name.to_owned(), events, cancel.clone());
    tracing::info!(channel = unique_name, observers, "joined channel");

    Ok(JoinedChannel { unique_name: unique_name.to_owned(), mirror, pump: Some(pump), cancel })
}

fn set_join_state(session: &mut Session, unique_name: &str, state: JoinState) {
    if let Some(channel) = session.registry_mut().get_mut(unique_name) {
        channel.join_state = state;
    }
}

#[cfg(test)]
#[path = "membership_tests.rs"]
mod tests;
