// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, Ordering};

use super::*;

fn fast(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

#[tokio::test]
async fn default_policy_makes_one_attempt() {
    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let result: anyhow::Result<()> = RetryPolicy::default()
        .run("test", move || async move {
            attempts.fetch_add(1, Ordering::Relaxed);
            anyhow::bail!("boom")
        })
        .await;
    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn retries_until_success() -> anyhow::Result<()> {
    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let value = fast(5)
        .run("test", move || async move {
            let n = attempts.fetch_add(1, Ordering::Relaxed);
            if n < 2 {
                anyhow::bail!("transient {n}");
            }
            Ok(n)
        })
        .await?;
    assert_eq!(value, 2);
    assert_eq!(attempts.load(Ordering::Relaxed), 3);
    Ok(())
}

#[tokio::test]
async fn returns_last_error_when_exhausted() {
    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let result: anyhow::Result<()> = fast(2)
        .run("test", move || async move {
            let n = attempts.fetch_add(1, Ordering::Relaxed);
            anyhow::bail!("failure {n}")
        })
        .await;
    assert_eq!(result.err().map(|e| e.to_string()).as_deref(), Some("failure 2"));
    assert_eq!(attempts.load(Ordering::Relaxed), 3);
}

#[test]
fn with_retries_keeps_default_backoff() {
    let policy = RetryPolicy::with_retries(3);
    assert_eq!(policy.max_retries, 3);
    assert_eq!(policy.initial_backoff, RetryPolicy::none().initial_backoff);
}
