// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod channel;
pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod membership;
pub mod message;
pub mod pipeline;
pub mod resolve;
pub mod retry;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

use tracing::info;

use crate::config::Config;
use crate::pipeline::Notifier;
use crate::transport::memory::MemoryTransport;

/// Run the client against the loopback transport until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let settings = config.pipeline()?;
    info!(
        url = %settings.token_url,
        channel = %settings.channel.unique_name,
        "starting chat client"
    );

    let transport = MemoryTransport::new();
    let notifier = Notifier::new();
    let mut client = pipeline::start(&settings, transport, &notifier).await?;

    let mut last = client.last_message().subscribe();
    let initial = last.borrow_and_update().clone();
    if let Some(line) = initial {
        println!("{line}");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = last.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = last.borrow_and_update().clone();
                if let Some(line) = line {
                    println!("{line}");
                }
                client.sync();
            }
        }
    }

    info!("shutting down");
    client.close().await;
    Ok(())
}
