//! SSE stream parser for Gemini's `streamGenerateContent?alt=sse` responses.

use super::{GeminiResponse, fragments_from_response};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use gemlink_abstraction::{ContentFragment, ModelError};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ModelError>> + Send>>;

/// A chunk is either a normal response or an in-band error document.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    error: Option<serde_json::Value>,
    #[serde(flatten)]
    response: GeminiResponse,
}

/// Turns an SSE byte stream into content fragments.
///
/// Events are separated by a blank line; `\r` is dropped so both `\n\n` and
/// `\r\n\r\n` framings work. Bytes are buffered raw so multi-byte characters split
/// across network chunks decode correctly.
pub(crate) struct SseFragmentStream {
    stream: ByteStream,
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for an event boundary.
    scanned: usize,
    pending: VecDeque<Result<ContentFragment, ModelError>>,
    done: bool,
}

impl SseFragmentStream {
    pub(crate) fn new<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display,
    {
        let stream = stream.map(|item| item.map_err(|e| ModelError::StreamError(e.to_string())));
        Self { stream: Box::pin(stream), buffer: Vec::new(), scanned: 0, pending: VecDeque::new(), done: false }
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
    }

    /// Parses every complete event currently in the buffer.
    fn drain_events(&mut self) {
        while let Some(end_idx) = find_event_end(&self.buffer, self.scanned) {
            let event: Vec<u8> = self.buffer.drain(..end_idx + 2).collect();
            self.scanned = 0;
            self.handle_event(&event[..end_idx]);
        }
        self.scanned = self.buffer.len();
    }

    /// Parses whatever is left once the connection closes.
    fn flush_tail(&mut self) {
        self.drain_events();
        if !self.buffer.is_empty() {
            let tail = std::mem::take(&mut self.buffer);
            self.scanned = 0;
            self.handle_event(&tail);
        }
    }

    fn handle_event(&mut self, event: &[u8]) {
        if self.done {
            return;
        }

        let event = String::from_utf8_lossy(event);
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| data.strip_prefix(' ').unwrap_or(data))
            .collect();
        if data.is_empty() {
            return;
        }
        let data = data.join("\n");
        let data = data.trim();

        if data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            self.done = true;
            return;
        }

        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) if chunk.error.is_some() => {
                // Keep the document intact; the error classifier reads it.
                self.pending.push_back(Err(ModelError::StreamError(data.to_string())));
                self.done = true;
            }
            Ok(chunk) => {
                self.pending.extend(fragments_from_response(chunk.response).into_iter().map(Ok));
            }
            Err(e) => {
                // Skip malformed JSON chunks (some proxies send keep-alive noise)
                debug!("Failed to parse SSE chunk: {}", e);
            }
        }
    }
}

/// Finds the first blank line, resuming one byte before `from` so a boundary
/// split across two network chunks is still seen.
fn find_event_end(buffer: &[u8], from: usize) -> Option<usize> {
    let start = from.saturating_sub(1).min(buffer.len());
    buffer[start..].windows(2).position(|w| w == b"\n\n").map(|idx| start + idx)
}

impl Stream for SseFragmentStream {
    type Item = Result<ContentFragment, ModelError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if self.done {
                return Poll::Ready(None);
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.push_bytes(&bytes);
                    self.drain_events();
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.flush_tail();
                    self.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
