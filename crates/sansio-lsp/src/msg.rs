//! The JSON-RPC 2.0 envelope, as the wire carries it.
//!
//! Payload schemas live in [`lsp_types`]; this module models only the
//! envelope around them: the three message shapes, their ids, and the
//! error object of a failed response. JSON-RPC has no tag field, so
//! decoding discriminates structurally: a `method` with an `id` is a
//! request, an `id` without a `method` is a response, and a `method`
//! without an `id` is a notification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A request id.
///
/// The client allocates integer ids only (monotonically increasing,
/// starting at 0), but ids on server-originated requests are the
/// server's choice, so both wire forms decode. Replies echo the id
/// back verbatim, whichever form it has.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(untagged)]
pub enum RequestId {
    /// An integer id.
    Number(i32),
    /// A string id.
    String(String),
}

impl RequestId {
    /// The integer form, if this is an integer id.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            RequestId::Number(n) => Some(*n),
            RequestId::String(_) => None,
        }
    }

    /// The string form, if this is a string id.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RequestId::Number(_) => None,
            RequestId::String(s) => Some(s),
        }
    }
}

impl From<i32> for RequestId {
    fn from(id: i32) -> RequestId {
        RequestId::Number(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> RequestId {
        RequestId::String(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            // Quoted, so `7` and `"7"` stay distinguishable in logs.
            RequestId::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// One frame of traffic, in either direction.
///
/// Variant order matters to serde: an untagged request would also
/// satisfy [`Response`] (extra fields are ignored, and both of its
/// optional members default), so requests must be tried first and
/// notifications last.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Message {
    /// A call expecting a reply.
    Request(Request),
    /// The reply to an earlier call.
    Response(Response),
    /// Fire-and-forget.
    Notification(Notification),
}

impl From<Request> for Message {
    fn from(req: Request) -> Message {
        Message::Request(req)
    }
}

impl From<Response> for Message {
    fn from(resp: Response) -> Message {
        Message::Response(resp)
    }
}

impl From<Notification> for Message {
    fn from(not: Notification) -> Message {
        Message::Notification(not)
    }
}

/// A call that expects a reply carrying the same id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Request {
    /// Echoed back by the reply.
    pub id: RequestId,
    /// The operation, e.g. `textDocument/hover`.
    pub method: String,
    /// The arguments. `Null` stands for both an absent `params` member
    /// and an explicit `null`; neither is emitted when serializing.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl Request {
    /// Packs typed params into a request.
    pub fn new<P: Serialize>(id: RequestId, method: String, params: P) -> Request {
        Request {
            id,
            method,
            params: serde_json::to_value(params).unwrap(),
        }
    }
}

/// The reply to a [`Request`].
///
/// Well-formed traffic carries exactly one of `result` and `error`;
/// both absent is tolerated and dispatches as an empty result.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Response {
    /// The id of the request being answered. JSON-RPC also permits a
    /// `null` id when the request's own id could not be read; such a
    /// reply fails to decode here and poisons the stream, which is the
    /// right outcome for a peer that garbled an id we allocated.
    pub id: RequestId,
    /// The result, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// A successful reply. `result` must serialize; LSP result types do.
    pub fn new_ok<R: Serialize>(id: RequestId, result: R) -> Response {
        Response {
            id,
            result: Some(serde_json::to_value(result).unwrap()),
            error: None,
        }
    }

    /// An error reply, with no extra data attached.
    pub fn new_err(id: RequestId, code: i32, message: String) -> Response {
        Response {
            id,
            result: None,
            error: Some(ResponseError {
                code,
                message,
                data: None,
            }),
        }
    }
}

/// A call with no id: no reply ever comes back.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    /// The operation, e.g. `textDocument/didOpen`.
    pub method: String,
    /// The arguments, with the same `Null` convention as
    /// [`Request::params`].
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl Notification {
    /// Packs typed params into a notification.
    pub fn new(method: String, params: impl Serialize) -> Notification {
        Notification {
            method,
            params: serde_json::to_value(params).unwrap(),
        }
    }
}

/// What a failed [`Response`] carries instead of a result.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResponseError {
    /// One of the [`ErrorCode`] values, or a server-specific code.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
    /// Extra machine-readable detail, method-specific.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Error codes a response may carry: the JSON-RPC set plus the LSP
/// additions.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub enum ErrorCode {
    /// The payload was not parseable JSON.
    ParseError = -32700,
    /// The message was not a valid request object.
    InvalidRequest = -32600,
    /// No handler for the method.
    MethodNotFound = -32601,
    /// The params did not match the method's schema.
    InvalidParams = -32602,
    /// The handler itself failed.
    InternalError = -32603,
    /// Lower bound of the range reserved for implementation errors.
    ServerErrorStart = -32099,
    /// Upper bound of the range reserved for implementation errors.
    ServerErrorEnd = -32000,
    /// The server saw traffic before its `initialize` exchange.
    ServerNotInitialized = -32002,
    /// Catch-all for errors with no better code.
    UnknownErrorCode = -32001,
    /// The request was cancelled via `$/cancelRequest` and the server
    /// noticed in time.
    RequestCanceled = -32800,
    /// The document changed underneath the request, so any result
    /// would be stale.
    ContentModified = -32801,
    /// The server abandoned the request on its own initiative.
    ServerCancelled = -32802,
    /// The request was well-formed but could not be served.
    RequestFailed = -32803,
}
