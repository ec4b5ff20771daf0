// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Incremental line reading over a streaming HTTP response.
//!
//! Claude and Ollama stream newline-delimited JSON; Gemini streams SSE
//! `data:` lines. All three decode through this reader, which yields lines
//! as they arrive without buffering the whole body.

use futures::StreamExt;

use crate::error::ProviderError;

/// Reads complete lines from a streaming response body.
pub(crate) struct LineReader {
    stream: futures::stream::BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    done: bool,
}

impl LineReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            stream: response
                .bytes_stream()
                .map(|result| result.map(|chunk| chunk.to_vec()))
                .boxed(),
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Next complete line, without the trailing newline. `Ok(None)` means
    /// the body ended cleanly.
    pub async fn next_line(&mut self) -> Result<Option<String>, ProviderError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop(); // newline
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).to_string()));
            }

            if self.done {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let line = String::from_utf8_lossy(&self.buffer).to_string();
                self.buffer.clear();
                return Ok(Some(line));
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => return Err(ProviderError::Stream(err.to_string())),
                None => self.done = true,
            }
        }
    }
}

/// Strip an SSE `data: ` prefix, if present.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")).map(str::trim)
}
