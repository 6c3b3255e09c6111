// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io;
use std::sync::{Arc, Mutex};

/// Assert that `$expr` is an `Err` whose message contains `$substr`.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        assert!(result.is_err(), concat!("expected Err for: ", stringify!($expr)));
        if let Err(err) = result {
            let msg = err.to_string();
            assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
        }
    }};
}

/// In-memory sink for JSON log lines. [`LogCapture::install`] makes it the
/// thread's default subscriber until the guard drops.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<serde_json::Value> {
        let buf = self.0.lock().unwrap_or_else(|e| e.into_inner()).clone();
        String::from_utf8_lossy(&buf).lines().filter_map(|l| serde_json::from_str(l).ok()).collect()
    }

    /// Lines whose message is `message`.
    pub fn matching(&self, message: &str) -> Vec<serde_json::Value> {
        self.lines().into_iter().filter(|l| l["fields"]["message"] == message).collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
