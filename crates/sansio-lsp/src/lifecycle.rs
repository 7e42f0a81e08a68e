//! Client lifecycle.
//!
//! The LSP handshake pins a session to a strict progression:
//!
//! ```text
//! NotInitialized -> WaitingForInitialized -> Normal
//!     -> WaitingForShutdown -> Shutdown -> Exited
//! ```
//!
//! Transitions are driven only by the handshake messages themselves
//! (the `initialize` and `shutdown` responses, the `exit`
//! notification); no state is ever re-entered once left.

use crate::ClientError;

/// Where a client session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClientState {
    /// Constructed, `initialize` not yet queued.
    NotInitialized,
    /// `initialize` sent, waiting for the server's response.
    WaitingForInitialized,
    /// Handshake complete, feature traffic flows.
    Normal,
    /// `shutdown` sent, waiting for the server's acknowledgement.
    WaitingForShutdown,
    /// Shutdown acknowledged, only `exit` remains.
    Shutdown,
    /// Terminal.
    Exited,
}

impl ClientState {
    /// Whether feature requests and document notifications may be sent.
    pub fn is_running(self) -> bool {
        matches!(self, ClientState::Normal)
    }

    /// Whether the session has reached its terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ClientState::Exited)
    }

    /// Gates `operation` on the client being exactly in `wanted`.
    pub(crate) fn expect(
        self,
        wanted: ClientState,
        operation: &'static str,
    ) -> Result<(), ClientError> {
        if self == wanted {
            Ok(())
        } else {
            Err(ClientError::IllegalState {
                state: self,
                operation,
            })
        }
    }
}
