//! What the server can do.
//!
//! A snapshot of the capabilities negotiated at `initialize`, plus the
//! registrations the server adds and removes at runtime through
//! `client/registerCapability` and `client/unregisterCapability`.

use std::collections::HashMap;

use lsp_types::{
    InitializeResult, Registration, ServerCapabilities, ServerInfo, TextDocumentSyncCapability,
    TextDocumentSyncKind,
};

/// The server-side capability state of a session.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    capabilities: ServerCapabilities,
    server_info: Option<ServerInfo>,
    registrations: HashMap<String, Registration>,
}

impl CapabilityRegistry {
    /// Records the outcome of the `initialize` exchange.
    pub fn record_initialize(&mut self, result: InitializeResult) {
        self.capabilities = result.capabilities;
        self.server_info = result.server_info;
    }

    /// The capabilities the server advertised at `initialize`.
    pub fn snapshot(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// The server's self-description, when it sent one.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Adds a dynamic registration. Re-registering an id replaces the
    /// previous entry.
    pub fn register(&mut self, registration: Registration) {
        if let Some(old) = self
            .registrations
            .insert(registration.id.clone(), registration)
        {
            log::debug!("replaced registration {} ({})", old.id, old.method);
        }
    }

    /// Removes a dynamic registration. Unregistering an unknown id is
    /// tolerated with a warning.
    pub fn unregister(&mut self, id: &str) {
        if self.registrations.remove(id).is_none() {
            log::warn!("unregister of unknown registration {id}");
        }
    }

    /// The dynamic registrations currently in force.
    pub fn registrations(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.values()
    }

    /// The text synchronization kind negotiated for the session,
    /// whichever of the two advertisement forms the server used.
    pub fn text_document_sync(&self) -> TextDocumentSyncKind {
        match &self.capabilities.text_document_sync {
            None => TextDocumentSyncKind::NONE,
            Some(TextDocumentSyncCapability::Kind(kind)) => *kind,
            Some(TextDocumentSyncCapability::Options(options)) => {
                options.change.unwrap_or(TextDocumentSyncKind::NONE)
            }
        }
    }
}
