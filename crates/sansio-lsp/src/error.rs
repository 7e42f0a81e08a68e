//! Error types of the client core.
//!
//! Three families, by fate: [`FrameError`]s are fatal and poison the
//! decoder, [`ProtocolError`]s are surfaced as events while the session
//! stays usable, and [`ClientError`]s reject a caller operation
//! synchronously.

use std::fmt;

use lsp_types::{ProgressToken, TextDocumentSyncKind, Url};

use crate::{ClientState, RequestId};

/// A fatal framing error on the inbound byte stream.
///
/// Once raised, the decoder is poisoned and replays the same error on
/// every later call: resynchronising a length-prefixed stream after
/// corruption is unsafe, so the caller should restart the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A header line is not a `name: value` pair, or the header block
    /// exceeded the size cap without terminating.
    MalformedHeader(String),
    /// The header block terminated without a `Content-Length`.
    MissingContentLength,
    /// The announced payload exceeds the size cap.
    PayloadTooLarge(usize),
    /// The payload is not valid JSON-RPC.
    InvalidJson(String),
}

impl std::error::Error for FrameError {}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::MalformedHeader(line) => write!(f, "malformed header: {line:?}"),
            FrameError::MissingContentLength => write!(f, "no Content-Length"),
            FrameError::PayloadTooLarge(size) => write!(f, "payload of {size} bytes is too large"),
            FrameError::InvalidJson(err) => write!(f, "malformed LSP payload: {err}"),
        }
    }
}

/// A protocol violation by the server (or a corrupted-but-framable
/// stream). Reported as [`Event::Error`](crate::Event::Error); whether
/// to keep the session alive is the caller's call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A response arrived whose id matches no pending request.
    UnknownResponseId(RequestId),
    /// A message arrived that the current state forbids.
    UnexpectedMessage {
        /// The state the client was in.
        state: ClientState,
        /// The offending method, or `"response"` for responses.
        method: String,
    },
    /// A second response to the `initialize` request arrived.
    DuplicateInitialize,
    /// A `$/progress` report or end arrived for a token with no
    /// preceding begin.
    ProgressWithoutBegin(ProgressToken),
    /// The payload of a message did not match its method's schema.
    InvalidParams {
        /// The method being decoded.
        method: String,
        /// The underlying decode error, rendered.
        message: String,
    },
}

impl std::error::Error for ProtocolError {}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownResponseId(id) => {
                write!(f, "response for unknown request {id}")
            }
            ProtocolError::UnexpectedMessage { state, method } => {
                write!(f, "unexpected {method} in state {state:?}")
            }
            ProtocolError::DuplicateInitialize => {
                write!(f, "initialize was answered more than once")
            }
            ProtocolError::ProgressWithoutBegin(token) => {
                write!(f, "progress for token {token:?} without a begin")
            }
            ProtocolError::InvalidParams { method, message } => {
                write!(f, "invalid params for {method}: {message}")
            }
        }
    }
}

/// Rejection of a caller operation, raised synchronously at the call
/// site. The session state is untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The operation is not permitted in the current lifecycle state.
    IllegalState {
        /// The state the client is in.
        state: ClientState,
        /// The rejected operation.
        operation: &'static str,
    },
    /// A document operation referenced a URI that was never opened.
    UnknownDocument(Url),
    /// A change does not fit the sync kind negotiated for the document.
    UnsupportedChange {
        /// The document being changed.
        uri: Url,
        /// The negotiated sync kind.
        kind: TextDocumentSyncKind,
    },
    /// A reply was issued for a request the server never sent (or that
    /// was already answered).
    UnknownServerRequest(RequestId),
}

impl std::error::Error for ClientError {}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::IllegalState { state, operation } => {
                write!(f, "cannot {operation} in state {state:?}")
            }
            ClientError::UnknownDocument(uri) => {
                write!(f, "document {uri} is not open")
            }
            ClientError::UnsupportedChange { uri, kind } => {
                write!(f, "change to {uri} does not fit sync kind {kind:?}")
            }
            ClientError::UnknownServerRequest(id) => {
                write!(f, "no server request {id} awaits a reply")
            }
        }
    }
}
