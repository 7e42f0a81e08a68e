//! A sans-I/O client implementation of the Language Server Protocol.
//!
//! The [`Client`] is a pure protocol state machine: it owns no socket,
//! spawns no process and blocks on nothing. The caller pumps bytes from
//! the server into [`Client::feed`], writes whatever
//! [`Client::take_output`] hands back, and reacts to the typed
//! [`Event`]s drained from [`Client::events`]. Everything else happens
//! in here: framing, the initialize/shutdown handshake,
//! request/response correlation, capability bookkeeping, and progress
//! multiplexing.
//!
//! Message payloads are the [`lsp_types`] data model, re-exported for
//! convenience.

pub mod caps;
pub mod codec;
pub mod req_queue;
pub mod util;

mod client;
pub use client::*;

mod error;
pub use error::*;

mod events;
pub use events::*;

mod lifecycle;
pub use lifecycle::*;

mod msg;
pub use msg::*;

pub use caps::CapabilityRegistry;
pub use codec::StreamDecoder;

pub use lsp_types;
