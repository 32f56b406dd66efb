//! Incremental output delivery
//!
//! Both pipes of a child are read line by line. Every line is handed to the
//! [`OutputHandler`] before it is appended to the accumulated stream text.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// Receiver of live process output
///
/// Called from the reader tasks, once per line, in the order the lines were
/// read from each stream. There is no ordering guarantee between stdout and
/// stderr.
pub trait OutputHandler: Send + Sync + 'static {
    fn on_line(&self, stream: StreamKind, line: &str);
}

impl<F> OutputHandler for F
where
    F: Fn(StreamKind, &str) + Send + Sync + 'static,
{
    fn on_line(&self, stream: StreamKind, line: &str) {
        self(stream, line)
    }
}

/// Reads `stream` to the end, forwarding each line to `handler`
///
/// Lines are split on `\n` and on `\r` (progress bars redraw with carriage
/// returns). Invalid UTF-8 is replaced rather than rejected. Returns
/// everything read.
pub(crate) async fn pump<R>(stream: R, kind: StreamKind, handler: Arc<dyn OutputHandler>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut accumulated = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Error reading {}: {}", kind.as_str(), e);
                break;
            }
        }

        let chunk = String::from_utf8_lossy(&buf);
        let line = chunk.strip_suffix('\n').unwrap_or(&chunk);
        for segment in line.split('\r').filter(|s| !s.is_empty()) {
            handler.on_line(kind, segment);
        }
        accumulated.push_str(&chunk);
    }

    accumulated
}
