// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use crate::channel::{ChannelKind, ChannelSpec};
use crate::pipeline::PipelineConfig;
use crate::retry::RetryPolicy;
use crate::session::{SessionConfig, SyncStrategy};

/// Prefix of generated channel unique names.
pub const CHANNEL_NAME_PREFIX: &str = "channels";

const BASE32_DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Chat client that provisions a token, joins a channel, and follows it.
#[derive(Debug, Parser)]
#[command(name = "chatline", version, about)]
pub struct Config {
    /// Token endpoint URL.
    #[arg(long, env = "CHATLINE_TOKEN_URL", default_value = "http://localhost:8000/token.php")]
    pub token_url: String,

    /// Channel unique name (default: generated).
    #[arg(long, env = "CHATLINE_CHANNEL")]
    pub channel: Option<String>,

    /// Channel display name.
    #[arg(long, env = "CHATLINE_FRIENDLY_NAME", default_value = "General Chat Channel")]
    pub friendly_name: String,

    /// Channel type (public, private).
    #[arg(long, env = "CHATLINE_CHANNEL_TYPE", default_value = "public")]
    pub channel_type: String,

    /// Synchronization strategy (all, none).
    #[arg(long, env = "CHATLINE_SYNC", default_value = "all")]
    pub sync: String,

    /// Messages pre-loaded per channel at bootstrap.
    #[arg(long, env = "CHATLINE_INITIAL_MESSAGES", default_value = "500")]
    pub initial_messages: usize,

    /// Message sent after joining.
    #[arg(long, env = "CHATLINE_GREETING", default_value = "Test Message")]
    pub greeting: String,

    /// Skip the greeting message.
    #[arg(long, env = "CHATLINE_NO_GREETING")]
    pub no_greeting: bool,

    /// Token fetch timeout in milliseconds.
    #[arg(long, env = "CHATLINE_HTTP_TIMEOUT_MS", default_value = "10000")]
    pub http_timeout_ms: u64,

    /// Retries for session create and join (0 = fail on first error).
    #[arg(long, env = "CHATLINE_RETRIES", default_value = "0")]
    pub retries: u32,

    /// Log format (json or text).
    #[arg(long, env = "CHATLINE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CHATLINE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token_url.is_empty() {
            anyhow::bail!("--token-url must not be empty");
        }
        if !self.token_url.starts_with("http://") && !self.token_url.starts_with("https://") {
            anyhow::bail!("--token-url must be an http(s) URL: {}", self.token_url);
        }
        if matches!(self.channel.as_deref(), Some("")) {
            anyhow::bail!("--channel must not be empty");
        }
        if self.http_timeout_ms == 0 {
            anyhow::bail!("--http-timeout-ms must be positive");
        }
        self.channel_kind()?;
        self.sync_strategy()?;
        match self.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => anyhow::bail!("invalid log format: {other}"),
        }
    }

    pub fn channel_kind(&self) -> anyhow::Result<ChannelKind> {
        self.channel_type.parse()
    }

    pub fn sync_strategy(&self) -> anyhow::Result<SyncStrategy> {
        self.sync.parse()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Build the pipeline configuration, generating a channel name if none
    /// was given.
    pub fn pipeline(&self) -> anyhow::Result<PipelineConfig> {
        let unique_name = self.channel.clone().unwrap_or_else(default_channel_name);
        let channel = ChannelSpec {
            friendly_name: self.friendly_name.clone(),
            unique_name,
            kind: self.channel_kind()?,
        };
        Ok(PipelineConfig {
            token_url: self.token_url.clone(),
            channel,
            session: SessionConfig {
                strategy: self.sync_strategy()?,
                initial_message_count: self.initial_messages,
            },
            greeting: (!self.no_greeting).then(|| self.greeting.clone()),
            retry: RetryPolicy::with_retries(self.retries),
            http_timeout: self.http_timeout(),
        })
    }
}

/// `channels` followed by 65 random bits in base 32.
pub fn default_channel_name() -> String {
    let bits = rand::random::<u128>() & ((1u128 << 65) - 1);
    format!("{CHANNEL_NAME_PREFIX}{}", to_base32(bits))
}

fn to_base32(mut value: u128) -> String {
    if value == 0 {
        return "0".to_owned();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE32_DIGITS[(value % 32) as usize]);
        value /= 32;
    }
    digits.iter().rev().map(|&d| d as char).collect()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
