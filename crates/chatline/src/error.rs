// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for every lifecycle stage of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    AuthFetch,
    /// Non-fatal notice: the access token expired.
    TokenExpired,
    SessionCreate,
    SessionClosed,
    ChannelCreate,
    NotResolved,
    Join,
    NotJoined,
    Send,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthFetch => "AUTH_FETCH",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::SessionCreate => "SESSION_CREATE",
            Self::SessionClosed => "SESSION_CLOSED",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::NotResolved => "NOT_RESOLVED",
            Self::Join => "JOIN",
            Self::NotJoined => "NOT_JOINED",
            Self::Send => "SEND",
        }
    }

    /// Whether this code is a notice rather than an operation failure.
    pub fn is_notice(&self) -> bool {
        matches!(self, Self::TokenExpired)
    }

    /// Whether this code reports a caller ordering mistake (e.g. send before
    /// join) rather than a collaborator failure.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::SessionClosed | Self::NotResolved | Self::NotJoined)
    }

    pub fn to_error(&self, message: impl Into<String>) -> ChatError {
        ChatError { code: *self, message: message.into() }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error with machine-readable code and human-readable diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatError {
    pub code: ErrorCode,
    pub message: String,
}

impl ChatError {
    /// Wrap an underlying cause, keeping its full context chain as the message.
    pub fn from_cause(code: ErrorCode, cause: &anyhow::Error) -> Self {
        Self { code, message: format!("{cause:#}") }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ChatError {}

pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
