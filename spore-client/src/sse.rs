//! Server-Sent Events decoding for the progress stream

use std::collections::VecDeque;

use futures::{Stream, StreamExt, stream};
use spore_core::domain::job::ProgressEvent;

use crate::error::{ClientError, Result};

/// Event name the orchestrator gives progress events
const PROGRESS_EVENT: &str = "progress";

/// Incremental SSE parser
///
/// Bytes go in through [`SseDecoder::feed`] in whatever chunks the network
/// delivers; complete `data` payloads of progress events come out.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    ready: VecDeque<String>,
}

impl SseDecoder {
    pub(crate) fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            self.line(line);
        }
    }

    /// Next complete payload, if any
    pub(crate) fn next_data(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    fn line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }
        // Comment, used for keep-alives
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        if data.is_empty() {
            return;
        }
        if event.as_deref().is_none_or(|name| name == PROGRESS_EVENT) {
            self.ready.push_back(data.join("\n"));
        }
    }
}

/// Decodes a body of SSE bytes into progress events
pub(crate) fn progress_events<S, B>(body: S) -> impl Stream<Item = Result<ProgressEvent>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    stream::unfold(
        (body, SseDecoder::default(), false),
        |(mut body, mut decoder, failed)| async move {
            if failed {
                return None;
            }
            loop {
                if let Some(data) = decoder.next_data() {
                    let event = serde_json::from_str::<ProgressEvent>(&data).map_err(|e| {
                        ClientError::StreamError(format!("malformed progress event: {}", e))
                    });
                    return Some((event, (body, decoder, false)));
                }
                match body.next().await {
                    Some(Ok(chunk)) => decoder.feed(chunk.as_ref()),
                    Some(Err(e)) => {
                        let err = ClientError::StreamError(e.to_string());
                        return Some((Err(err), (body, decoder, true)));
                    }
                    None => return None,
                }
            }
        },
    )
}
