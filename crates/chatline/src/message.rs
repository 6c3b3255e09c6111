// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Send a text message on a joined channel.

use serde::{Deserialize, Serialize};

use crate::error::{ChatResult, ErrorCode};
use crate::session::Session;

/// Transport acknowledgement of a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub sequence: u64,
}

/// Send `body` on `unique_name`.  The channel must be joined; otherwise this
/// fails with [`ErrorCode::NotJoined`] without touching the transport.  No
/// retry.
pub async fn send(session: &mut Session, unique_name: &str, body: &str) -> ChatResult<Ack> {
    let auth = session.authorize().await?;

    match session.registry().get(unique_name) {
        None => {
            return Err(ErrorCode::NotResolved
                .to_error(format!("channel {unique_name} has not been resolved")));
        }
        Some(channel) if !channel.is_joined() => {
            return Err(ErrorCode::NotJoined
                .to_error(format!("channel {unique_name} is not joined")));
        }
        Some(_) => {}
    }

    let message = match session.transport().send(&auth, unique_name, body).await {
        Ok(message) => message,
        Err(e) => return Err(session.transport_error(ErrorCode::Send, &e).await),
    };

    let ack = Ack { sequence: message.sequence };
    tracing::debug!(channel = unique_name, seq = ack.sequence, "message sent");
    if let Some(channel) = session.registry_mut().get_mut(unique_name) {
        channel.upsert_message(message);
    }
    Ok(ack)
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
