// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::channel::{ChannelKind, ChannelSpec};
use crate::transport::memory::{MemoryTransport, Operation};

fn alice() -> Arc<AccessManager> {
    AccessManager::new(Credential { identity: "alice".to_owned(), token: "T".to_owned() })
}

fn spec(name: &str) -> ChannelSpec {
    ChannelSpec {
        friendly_name: format!("{name} room"),
        unique_name: name.to_owned(),
        kind: ChannelKind::Public,
    }
}

async fn transport_with(names: &[&str]) -> Arc<MemoryTransport> {
    let transport = MemoryTransport::new();
    transport.issue_token("T", "alice").await;
    for name in names {
        transport.seed_channel(&spec(name)).await;
    }
    transport
}

#[yare::parameterized(
    all = { "all", SyncStrategy::All },
    none_upper = { "NONE", SyncStrategy::None },
)]
fn strategy_from_str(input: &str, expected: SyncStrategy) -> anyhow::Result<()> {
    assert_eq!(input.parse::<SyncStrategy>()?, expected);
    assert_eq!(expected.to_string(), input.to_lowercase());
    Ok(())
}

#[test]
fn default_config_syncs_everything() {
    let config = SessionConfig::default();
    assert_eq!(config.strategy, SyncStrategy::All);
    assert_eq!(config.initial_message_count, 500);
}

#[tokio::test]
async fn create_reaches_ready_exactly_once() -> anyhow::Result<()> {
    let transport = transport_with(&["general", "random"]).await;
    let mut controller = SessionController::new(transport.clone(), alice(), SessionConfig::default());
    assert_eq!(controller.state(), SessionState::Uninitialized);

    let session = controller.create().await?;
    assert_eq!(controller.state(), SessionState::Ready);
    assert_eq!(
        controller.history(),
        &[SessionState::Uninitialized, SessionState::Synchronizing, SessionState::Ready]
    );
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.identity(), "alice");
    assert_eq!(session.registry().names().collect::<Vec<_>>(), vec!["general", "random"]);
    assert!(session.active_channel().is_none());

    // A second create never re-enters Synchronizing.
    let again = controller.create().await;
    assert_eq!(again.err().map(|e| e.code), Some(ErrorCode::SessionCreate));
    assert_eq!(controller.history().len(), 3);
    assert_eq!(transport.calls(Operation::Connect), 1);
    Ok(())
}

#[tokio::test]
async fn none_strategy_starts_with_empty_registry() -> anyhow::Result<()> {
    let transport = transport_with(&["general"]).await;
    let config = SessionConfig { strategy: SyncStrategy::None, initial_message_count: 500 };
    let session = SessionController::new(transport, alice(), config).create().await?;
    assert!(session.registry().is_empty());
    Ok(())
}

#[tokio::test]
async fn preloads_trailing_messages_only() -> anyhow::Result<()> {
    let transport = transport_with(&["general"]).await;
    for i in 0..10 {
        transport.post_as("bob", "general", &format!("m{i}")).await?;
    }
    let config = SessionConfig { strategy: SyncStrategy::All, initial_message_count: 3 };
    let session = SessionController::new(transport, alice(), config).create().await?;

    let channel = session.registry().get("general");
    let bodies: Vec<String> =
        channel.map(|c| c.messages.iter().map(|m| m.body.clone()).collect()).unwrap_or_default();
    assert_eq!(bodies, vec!["m7", "m8", "m9"]);
    Ok(())
}

#[tokio::test]
async fn transport_failure_yields_failed_and_no_session() -> anyhow::Result<()> {
    let transport = transport_with(&[]).await;
    transport.fail(Operation::Connect, "backend unavailable").await;
    let mut controller = SessionController::new(transport, alice(), SessionConfig::default());

    let err = controller.create().await.err();
    assert_eq!(controller.state(), SessionState::Failed);
    let err = err.ok_or_else(|| anyhow::anyhow!("expected an error"))?;
    assert_eq!(err.code, ErrorCode::SessionCreate);
    assert!(err.message.contains("backend unavailable"));
    Ok(())
}

#[tokio::test]
async fn rejected_token_fails_create() {
    let transport = transport_with(&[]).await;
    let stranger =
        AccessManager::new(Credential { identity: "alice".to_owned(), token: "forged".to_owned() });
    let mut controller = SessionController::new(transport, stranger, SessionConfig::default());
    assert_eq!(controller.create().await.err().map(|e| e.code), Some(ErrorCode::SessionCreate));
}

#[tokio::test]
async fn expired_token_fails_before_transport() {
    let transport = transport_with(&[]).await;
    let access = alice();
    access.mark_expired().await;
    let mut controller = SessionController::new(transport.clone(), access, SessionConfig::default());

    assert_eq!(controller.create().await.err().map(|e| e.code), Some(ErrorCode::TokenExpired));
    assert_eq!(controller.state(), SessionState::Failed);
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn retry_policy_recovers_transient_failure() -> anyhow::Result<()> {
    let transport = transport_with(&["general"]).await;
    transport.fail(Operation::Connect, "flaky").await;

    let retry = RetryPolicy {
        max_retries: 3,
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(20),
    };
    let mut controller = SessionController::new(transport.clone(), alice(), SessionConfig::default())
        .with_retry(retry);

    let healer = {
        let transport = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            transport.heal(Operation::Connect).await;
        })
    };

    let session = controller.create().await?;
    healer.await?;
    assert_eq!(session.registry().len(), 1);
    assert!(transport.calls(Operation::Connect) >= 2);
    Ok(())
}

#[tokio::test]
async fn close_is_terminal() -> anyhow::Result<()> {
    let transport = transport_with(&[]).await;
    let mut session = SessionController::new(transport, alice(), SessionConfig::default()).create().await?;
    assert!(session.authorize().await.is_ok());

    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.authorize().await.err().map(|e| e.code), Some(ErrorCode::SessionClosed));
    Ok(())
}

#[tokio::test]
async fn revoked_token_at_connect_expires_access() {
    let transport = transport_with(&[]).await;
    transport.revoke_token("T").await;
    let access = alice();
    let mut controller = SessionController::new(transport, Arc::clone(&access), SessionConfig::default());

    assert_eq!(controller.create().await.err().map(|e| e.code), Some(ErrorCode::TokenExpired));
    assert_eq!(controller.state(), SessionState::Failed);
    assert!(access.is_expired().await);
}
