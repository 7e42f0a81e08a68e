//! Framing of LSP messages over a byte stream.
//!
//! The wire format is an HTTP-like header block of `\r\n`-terminated
//! ASCII lines, a blank line, then exactly `Content-Length` bytes of
//! UTF-8 JSON. The decoder here is push-based: the transport owner
//! feeds it whatever chunks arrive and drains whole [`Message`]s back
//! out, with partial frames staying buffered in between.

use serde::Serialize;

use crate::{FrameError, Message};

/// Cap on the size of a single header block.
pub const HEADER_CAP: usize = 64 * 1024;

/// Cap on the size of a single payload.
pub const PAYLOAD_CAP: usize = 512 * 1024 * 1024;

/// An incremental decoder for the inbound half of a session.
///
/// After any decode error the decoder is poisoned: every later call
/// replays the same error. See [`FrameError`].
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: Vec<u8>,
    poisoned: Option<FrameError>,
}

impl StreamDecoder {
    /// Creates an empty decoder.
    pub fn new() -> StreamDecoder {
        StreamDecoder::default()
    }

    /// Appends bytes read from the transport.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Yields all messages that have become complete.
    pub fn drain(&mut self) -> Result<Vec<Message>, FrameError> {
        let mut messages = Vec::new();
        while let Some(msg) = self.next_message()? {
            messages.push(msg);
        }
        Ok(messages)
    }

    /// Yields the next complete message, or `None` if more bytes are
    /// needed.
    pub fn next_message(&mut self) -> Result<Option<Message>, FrameError> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }

        let Some(header_end) = find_header_end(&self.buf) else {
            if self.buf.len() > HEADER_CAP {
                return Err(self.poison(FrameError::MalformedHeader(
                    "header block exceeds the size cap".into(),
                )));
            }
            return Ok(None);
        };
        if header_end > HEADER_CAP {
            return Err(self.poison(FrameError::MalformedHeader(
                "header block exceeds the size cap".into(),
            )));
        }

        let size = match parse_headers(&self.buf[..header_end]) {
            Ok(size) => size,
            Err(err) => return Err(self.poison(err)),
        };
        if size > PAYLOAD_CAP {
            return Err(self.poison(FrameError::PayloadTooLarge(size)));
        }

        let body_start = header_end + 4;
        if self.buf.len() < body_start + size {
            return Ok(None);
        }

        let payload = &self.buf[body_start..body_start + size];
        log::debug!("< {}", String::from_utf8_lossy(payload));
        let msg = match serde_json::from_slice::<Message>(payload) {
            Ok(msg) => msg,
            Err(err) => return Err(self.poison(FrameError::InvalidJson(err.to_string()))),
        };

        self.buf.drain(..body_start + size);
        Ok(Some(msg))
    }

    fn poison(&mut self, err: FrameError) -> FrameError {
        self.poisoned = Some(err.clone());
        self.buf.clear();
        err
    }
}

/// Position of the `\r\n\r\n` separating headers from the payload.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Extracts `Content-Length` from a header block. The only required
/// header; anything else (`Content-Type` in particular) is ignored.
fn parse_headers(block: &[u8]) -> Result<usize, FrameError> {
    let block = std::str::from_utf8(block)
        .map_err(|_| FrameError::MalformedHeader("header block is not ASCII".into()))?;

    let mut size = None;
    for line in block.split("\r\n") {
        let mut parts = line.splitn(2, ':');
        let header_name = parts.next().unwrap();
        let header_value = parts
            .next()
            .ok_or_else(|| FrameError::MalformedHeader(line.to_owned()))?;
        if header_name.trim().eq_ignore_ascii_case("Content-Length") {
            size = Some(
                header_value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::MalformedHeader(line.to_owned()))?,
            );
        }
    }
    size.ok_or(FrameError::MissingContentLength)
}

/// Frames a message onto the outbound buffer.
pub fn encode(msg: &Message, out: &mut Vec<u8>) {
    #[derive(Serialize)]
    struct JsonRpc<'a> {
        jsonrpc: &'static str,
        #[serde(flatten)]
        msg: &'a Message,
    }
    let text = serde_json::to_string(&JsonRpc {
        jsonrpc: "2.0",
        msg,
    })
    .unwrap();
    log::debug!("> {text}");

    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", text.len()).as_bytes());
    out.extend_from_slice(text.as_bytes());
}
