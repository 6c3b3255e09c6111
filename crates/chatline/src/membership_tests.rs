// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::channel::{ChannelKind, ChannelSpec};
use crate::credential::access::AccessManager;
use crate::credential::Credential;
use crate::events::{ChannelEvent, LastMessage};
use crate::session::{SessionConfig, SessionController};
use crate::transport::memory::{MemoryTransport, Operation};

const ROOM: &str = "general";

async fn ready_session() -> anyhow::Result<(Arc<MemoryTransport>, Session)> {
    let transport = MemoryTransport::new();
    transport
        .seed_channel(&ChannelSpec {
            friendly_name: "General".to_owned(),
            unique_name: ROOM.to_owned(),
            kind: ChannelKind::Public,
        })
        .await;
    let access =
        AccessManager::new(Credential { identity: "alice".to_owned(), token: "T".to_owned() });
    let session =
        SessionController::new(transport.clone(), access, SessionConfig::default()).create().await?;
    Ok((transport, session))
}

fn join_state(session: &Session) -> Option<JoinState> {
    session.registry().get(ROOM).map(|c| c.join_state)
}

#[tokio::test]
async fn join_marks_channel_joined_and_active() -> anyhow::Result<()> {
    let (transport, mut session) = ready_session().await?;

    let joined = join(&mut session, ROOM, EventDispatcher::new()).await?;
    assert_eq!(joined.unique_name(), ROOM);
    assert_eq!(join_state(&session), Some(JoinState::Joined));
    assert_eq!(session.active_channel().map(|c| c.unique_name.as_str()), Some(ROOM));
    assert!(joined.snapshot().members.contains(&Member::new("alice")));
    assert_eq!(transport.calls(Operation::Join), 1);
    assert_eq!(transport.calls(Operation::Subscribe), 1);
    Ok(())
}

#[tokio::test]
async fn unresolved_channel_is_rejected_without_transport_call() -> anyhow::Result<()> {
    let (transport, mut session) = ready_session().await?;

    let err = join(&mut session, "elsewhere", EventDispatcher::new()).await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::NotResolved));
    assert_eq!(transport.calls(Operation::Join), 0);
    Ok(())
}

#[tokio::test]
async fn failed_join_attaches_no_listener() -> anyhow::Result<()> {
    let (transport, mut session) = ready_session().await?;
    transport.fail(Operation::Join, "forbidden").await;

    let err = join(&mut session, ROOM, EventDispatcher::new()).await.err();
    let err = err.ok_or_else(|| anyhow::anyhow!("expected an error"))?;
    assert_eq!(err.code, ErrorCode::Join);
    assert_eq!(err.message, "forbidden");
    assert_eq!(join_state(&session), Some(JoinState::JoinFailed));
    assert!(session.active_channel().is_none());
    assert_eq!(transport.calls(Operation::Subscribe), 0);
    Ok(())
}

#[tokio::test]
async fn failed_join_can_be_retried() -> anyhow::Result<()> {
    let (transport, mut session) = ready_session().await?;
    transport.fail(Operation::Join, "forbidden").await;
    assert!(join(&mut session, ROOM, EventDispatcher::new()).await.is_err());

    transport.heal(Operation::Join).await;
    let _joined = join(&mut session, ROOM, EventDispatcher::new()).await?;
    assert_eq!(join_state(&session), Some(JoinState::Joined));
    Ok(())
}

#[tokio::test]
async fn joining_twice_is_an_error() -> anyhow::Result<()> {
    let (transport, mut session) = ready_session().await?;
    let _joined = join(&mut session, ROOM, EventDispatcher::new()).await?;

    let err = join(&mut session, ROOM, EventDispatcher::new()).await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::Join));
    assert_eq!(transport.calls(Operation::Join), 1);
    Ok(())
}

#[tokio::test]
async fn events_reach_observers_and_mirror() -> anyhow::Result<()> {
    let (transport, mut session) = ready_session().await?;
    let last = LastMessage::new();
    let dispatcher = EventDispatcher::new().with_observer(last.clone());

    let joined = join(&mut session, ROOM, dispatcher).await?;
    let mut view = joined.subscribe();
    transport.post_as("bob", ROOM, "hi").await?;
    tokio::time::timeout(Duration::from_secs(2), view.changed()).await??;

    assert_eq!(last.get().as_deref(), Some("bob:hi"));
    assert_eq!(joined.snapshot().last_message().map(|m| m.body.as_str()), Some("hi"));

    joined.sync_registry(&mut session);
    let stored = session.registry().get(ROOM).and_then(|c| c.last_message()).map(|m| m.author.clone());
    assert_eq!(stored.as_deref(), Some("bob"));
    Ok(())
}

#[tokio::test]
async fn leave_stops_the_pump() -> anyhow::Result<()> {
    let (transport, mut session) = ready_session().await?;
    let last = LastMessage::new();
    let joined = join(&mut session, ROOM, EventDispatcher::new().with_observer(last.clone())).await?;

    tokio::time::timeout(Duration::from_secs(2), joined.leave()).await?;
    transport
        .emit(ROOM, ChannelEvent::MessageAdded {
            message: crate::channel::Message { author: "bob".to_owned(), body: "late".to_owned(), sequence: 9 },
        })
        .await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(last.get(), None);
    Ok(())
}

#[tokio::test]
async fn closed_session_cannot_join() -> anyhow::Result<()> {
    let (transport, mut session) = ready_session().await?;
    session.close();

    let err = join(&mut session, ROOM, EventDispatcher::new()).await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::SessionClosed));
    assert_eq!(transport.calls(Operation::Join), 0);
    Ok(())
}

#[tokio::test]
async fn rejected_token_during_join_is_token_expired() -> anyhow::Result<()> {
    let (transport, mut session) = ready_session().await?;
    transport.revoke_token("T").await;

    let err = join(&mut session, ROOM, EventDispatcher::new()).await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::TokenExpired));
    assert_eq!(join_state(&session), Some(JoinState::JoinFailed));
    assert!(session.access().is_expired().await);
    assert_eq!(transport.calls(Operation::Subscribe), 0);
    Ok(())
}
