//! The correlation state of a session.
//!
//! Two half-tables. `outgoing` maps the ids we allocate to the
//! [`RequestKind`] expected back, so the response JSON can be decoded
//! into the right event when it arrives. `incoming` holds the
//! server-originated requests still waiting for the caller's reply,
//! keyed by id and recording the method so a reply cannot be routed to
//! the wrong request.

use std::collections::HashMap;

use serde::Serialize;

use crate::{Request, RequestId, RequestKind};

/// Both halves of the pending-request state.
#[derive(Debug, Default)]
pub struct ReqQueue {
    /// Server-originated requests awaiting a caller reply.
    pub incoming: Incoming,
    /// Our requests awaiting a server response.
    pub outgoing: Outgoing,
}

/// Server-originated requests the caller has not answered yet.
#[derive(Debug, Default)]
pub struct Incoming {
    pending: HashMap<RequestId, String>,
}

impl Incoming {
    /// Records a server request whose reply will answer `method`.
    pub fn register(&mut self, id: RequestId, method: String) {
        self.pending.insert(id, method);
    }

    /// The method recorded for a pending server request.
    pub fn method(&self, id: &RequestId) -> Option<&str> {
        self.pending.get(id).map(String::as_str)
    }

    /// Drops the entry once the reply has gone out.
    pub fn complete(&mut self, id: &RequestId) -> Option<String> {
        self.pending.remove(id)
    }
}

/// Our in-flight requests, plus the id counter feeding them.
#[derive(Debug, Default)]
pub struct Outgoing {
    next_id: i32,
    pending: HashMap<RequestId, RequestKind>,
}

impl Outgoing {
    /// Builds the next request and tracks its reply kind. Ids increase
    /// monotonically and are never reused within a session.
    pub fn register<P: Serialize>(
        &mut self,
        method: String,
        params: P,
        kind: RequestKind,
    ) -> Request {
        let id = RequestId::from(self.next_id);
        self.next_id += 1;
        self.pending.insert(id.clone(), kind);
        Request::new(id, method, params)
    }

    /// The number of requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Resolves a response id to the kind recorded at send time;
    /// `None` means the server answered something we never asked.
    pub fn complete(&mut self, id: &RequestId) -> Option<RequestKind> {
        self.pending.remove(id)
    }
}
