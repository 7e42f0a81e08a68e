//! Typed events produced by the dispatcher.
//!
//! Everything the server says eventually surfaces as an [`Event`]:
//! responses to our requests (decoded by the [`RequestKind`] recorded
//! when the request went out), requests the server originates, and
//! plain notifications. The caller drains them through
//! [`Client::events`](crate::Client::events).

use lsp_types::{
    ApplyWorkspaceEditParams, CodeActionResponse, CompletionResponse, ConfigurationItem,
    DocumentSymbolResponse, FoldingRange, GotoDefinitionResponse, Hover, Location,
    LogMessageParams, ProgressToken, PublishDiagnosticsParams, ServerCapabilities, ServerInfo,
    ShowMessageParams, ShowMessageRequestParams, SignatureHelp, SymbolInformation, TextEdit,
    WorkDoneProgressBegin, WorkDoneProgressEnd, WorkDoneProgressReport, WorkspaceEdit,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{ProtocolError, RequestId, ResponseError};

/// The kind of reply expected for an in-flight request.
///
/// A closed enumeration over every request method the client sends;
/// the pending table stores one of these per outbound id so the
/// response JSON can be decoded into the right [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// `initialize`
    Initialize,
    /// `shutdown`
    Shutdown,
    /// `textDocument/completion`
    Completion,
    /// `textDocument/hover`
    Hover,
    /// `textDocument/signatureHelp`
    SignatureHelp,
    /// `textDocument/definition`
    Definition,
    /// `textDocument/declaration`
    Declaration,
    /// `textDocument/typeDefinition`
    TypeDefinition,
    /// `textDocument/implementation`
    Implementation,
    /// `textDocument/references`
    References,
    /// `textDocument/documentSymbol`
    DocumentSymbol,
    /// `workspace/symbol`
    WorkspaceSymbol,
    /// `textDocument/formatting`
    Formatting,
    /// `textDocument/rangeFormatting`
    RangeFormatting,
    /// `textDocument/rename`
    Rename,
    /// `textDocument/foldingRange`
    FoldingRange,
    /// `workspace/executeCommand`
    ExecuteCommand,
    /// `textDocument/codeAction`
    CodeAction,
    /// `textDocument/willSaveWaitUntil`
    WillSaveWaitUntil,
}

/// What the server told us, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The handshake completed; the session is now running.
    Initialized {
        /// The capabilities the server advertised.
        capabilities: ServerCapabilities,
        /// The server's self-description, when present.
        server_info: Option<ServerInfo>,
    },
    /// The server acknowledged `shutdown`.
    Shutdown,

    /// Reply to `completion`.
    Completion {
        /// The id the request went out under.
        id: RequestId,
        /// The completions, absent when the server answered `null`.
        response: Option<CompletionResponse>,
    },
    /// Reply to `hover`.
    Hover {
        /// The id the request went out under.
        id: RequestId,
        /// The hover contents.
        response: Option<Hover>,
    },
    /// Reply to `signature_help`.
    SignatureHelp {
        /// The id the request went out under.
        id: RequestId,
        /// The signatures.
        response: Option<SignatureHelp>,
    },
    /// Reply to `definition`.
    Definition {
        /// The id the request went out under.
        id: RequestId,
        /// The target location(s).
        response: Option<GotoDefinitionResponse>,
    },
    /// Reply to `declaration`.
    Declaration {
        /// The id the request went out under.
        id: RequestId,
        /// The target location(s).
        response: Option<GotoDefinitionResponse>,
    },
    /// Reply to `type_definition`.
    TypeDefinition {
        /// The id the request went out under.
        id: RequestId,
        /// The target location(s).
        response: Option<GotoDefinitionResponse>,
    },
    /// Reply to `implementation`.
    Implementation {
        /// The id the request went out under.
        id: RequestId,
        /// The target location(s).
        response: Option<GotoDefinitionResponse>,
    },
    /// Reply to `references`.
    References {
        /// The id the request went out under.
        id: RequestId,
        /// Every reference found.
        locations: Option<Vec<Location>>,
    },
    /// Reply to `document_symbol`.
    DocumentSymbols {
        /// The id the request went out under.
        id: RequestId,
        /// The symbols, flat or nested per the server's taste.
        response: Option<DocumentSymbolResponse>,
    },
    /// Reply to `workspace_symbol`.
    WorkspaceSymbols {
        /// The id the request went out under.
        id: RequestId,
        /// The matching symbols.
        symbols: Option<Vec<SymbolInformation>>,
    },
    /// Reply to `formatting`.
    Formatting {
        /// The id the request went out under.
        id: RequestId,
        /// The edits to apply.
        edits: Option<Vec<TextEdit>>,
    },
    /// Reply to `range_formatting`.
    RangeFormatting {
        /// The id the request went out under.
        id: RequestId,
        /// The edits to apply.
        edits: Option<Vec<TextEdit>>,
    },
    /// Reply to `rename`.
    Rename {
        /// The id the request went out under.
        id: RequestId,
        /// The workspace-wide edit realising the rename.
        edit: Option<WorkspaceEdit>,
    },
    /// Reply to `folding_range`.
    FoldingRanges {
        /// The id the request went out under.
        id: RequestId,
        /// The foldable ranges.
        ranges: Option<Vec<FoldingRange>>,
    },
    /// Reply to `execute_command`.
    ExecuteCommand {
        /// The id the request went out under.
        id: RequestId,
        /// Whatever the command returned.
        result: Option<Value>,
    },
    /// Reply to `code_action`.
    CodeActions {
        /// The id the request went out under.
        id: RequestId,
        /// The available actions and commands.
        actions: Option<CodeActionResponse>,
    },
    /// Reply to `will_save_wait_until`.
    WillSaveWaitUntil {
        /// The id the request went out under.
        id: RequestId,
        /// The edits to apply before saving.
        edits: Option<Vec<TextEdit>>,
    },
    /// The server answered one of our requests with an error.
    RpcError {
        /// The id of the failed request.
        id: RequestId,
        /// Which request failed.
        kind: RequestKind,
        /// The error the server reported.
        error: ResponseError,
    },

    /// `workspace/configuration`: the server wants settings. Answer
    /// with [`Client::reply_to_configuration`](crate::Client::reply_to_configuration).
    ConfigurationRequest {
        /// The id to thread into the reply.
        id: RequestId,
        /// The configuration sections requested.
        items: Vec<ConfigurationItem>,
    },
    /// `workspace/workspaceFolders`: the server wants the folder list.
    /// Answer with [`Client::reply_to_workspace_folders`](crate::Client::reply_to_workspace_folders).
    WorkspaceFoldersRequest {
        /// The id to thread into the reply.
        id: RequestId,
    },
    /// `window/showMessageRequest`: the server wants the user to pick
    /// an action. Answer with
    /// [`Client::reply_to_show_message_request`](crate::Client::reply_to_show_message_request).
    ShowMessageRequest {
        /// The id to thread into the reply.
        id: RequestId,
        /// The message and the actions on offer.
        params: ShowMessageRequestParams,
    },
    /// `workspace/applyEdit`: the server wants an edit applied. Answer
    /// with [`Client::reply_to_apply_edit`](crate::Client::reply_to_apply_edit).
    ApplyEdit {
        /// The id to thread into the reply.
        id: RequestId,
        /// The edit to apply.
        params: ApplyWorkspaceEditParams,
    },

    /// `textDocument/publishDiagnostics`.
    PublishDiagnostics(PublishDiagnosticsParams),
    /// `window/showMessage`.
    ShowMessage(ShowMessageParams),
    /// `window/logMessage`.
    LogMessage(LogMessageParams),
    /// A `$/progress` stream opened.
    ProgressBegin {
        /// The token multiplexing the stream.
        token: ProgressToken,
        /// Title, cancellability, initial message.
        begin: WorkDoneProgressBegin,
    },
    /// A `$/progress` stream reported.
    ProgressReport {
        /// The token multiplexing the stream.
        token: ProgressToken,
        /// Message and percentage, when given.
        report: WorkDoneProgressReport,
    },
    /// A `$/progress` stream closed.
    ProgressEnd {
        /// The token multiplexing the stream.
        token: ProgressToken,
        /// The final message, when given.
        end: WorkDoneProgressEnd,
    },

    /// The server violated the protocol; the session stays usable at
    /// the caller's discretion.
    Error(ProtocolError),
}

impl RequestKind {
    /// The LSP method this kind of request goes out under.
    pub fn method(self) -> &'static str {
        use lsp_types::request::{self, Request};
        match self {
            RequestKind::Initialize => request::Initialize::METHOD,
            RequestKind::Shutdown => request::Shutdown::METHOD,
            RequestKind::Completion => request::Completion::METHOD,
            RequestKind::Hover => request::HoverRequest::METHOD,
            RequestKind::SignatureHelp => request::SignatureHelpRequest::METHOD,
            RequestKind::Definition => request::GotoDefinition::METHOD,
            RequestKind::Declaration => request::GotoDeclaration::METHOD,
            RequestKind::TypeDefinition => request::GotoTypeDefinition::METHOD,
            RequestKind::Implementation => request::GotoImplementation::METHOD,
            RequestKind::References => request::References::METHOD,
            RequestKind::DocumentSymbol => request::DocumentSymbolRequest::METHOD,
            RequestKind::WorkspaceSymbol => request::WorkspaceSymbolRequest::METHOD,
            RequestKind::Formatting => request::Formatting::METHOD,
            RequestKind::RangeFormatting => request::RangeFormatting::METHOD,
            RequestKind::Rename => request::Rename::METHOD,
            RequestKind::FoldingRange => request::FoldingRangeRequest::METHOD,
            RequestKind::ExecuteCommand => request::ExecuteCommand::METHOD,
            RequestKind::CodeAction => request::CodeActionRequest::METHOD,
            RequestKind::WillSaveWaitUntil => request::WillSaveWaitUntil::METHOD,
        }
    }

    /// Decodes a successful reply of this kind into its event.
    ///
    /// An absent `result` decodes the same as `null`: every reply shape
    /// below is nullable.
    pub(crate) fn decode_reply(
        self,
        id: RequestId,
        result: Option<Value>,
    ) -> Result<Event, serde_json::Error> {
        fn typed<T: DeserializeOwned>(result: Option<Value>) -> Result<Option<T>, serde_json::Error> {
            serde_json::from_value(result.unwrap_or(Value::Null))
        }

        Ok(match self {
            RequestKind::Initialize => {
                let result: lsp_types::InitializeResult =
                    serde_json::from_value(result.unwrap_or(Value::Null))?;
                Event::Initialized {
                    capabilities: result.capabilities,
                    server_info: result.server_info,
                }
            }
            RequestKind::Shutdown => Event::Shutdown,
            RequestKind::Completion => Event::Completion {
                id,
                response: typed(result)?,
            },
            RequestKind::Hover => Event::Hover {
                id,
                response: typed(result)?,
            },
            RequestKind::SignatureHelp => Event::SignatureHelp {
                id,
                response: typed(result)?,
            },
            RequestKind::Definition => Event::Definition {
                id,
                response: typed(result)?,
            },
            RequestKind::Declaration => Event::Declaration {
                id,
                response: typed(result)?,
            },
            RequestKind::TypeDefinition => Event::TypeDefinition {
                id,
                response: typed(result)?,
            },
            RequestKind::Implementation => Event::Implementation {
                id,
                response: typed(result)?,
            },
            RequestKind::References => Event::References {
                id,
                locations: typed(result)?,
            },
            RequestKind::DocumentSymbol => Event::DocumentSymbols {
                id,
                response: typed(result)?,
            },
            RequestKind::WorkspaceSymbol => Event::WorkspaceSymbols {
                id,
                symbols: typed(result)?,
            },
            RequestKind::Formatting => Event::Formatting {
                id,
                edits: typed(result)?,
            },
            RequestKind::RangeFormatting => Event::RangeFormatting {
                id,
                edits: typed(result)?,
            },
            RequestKind::Rename => Event::Rename {
                id,
                edit: typed(result)?,
            },
            RequestKind::FoldingRange => Event::FoldingRanges {
                id,
                ranges: typed(result)?,
            },
            RequestKind::ExecuteCommand => Event::ExecuteCommand { id, result },
            RequestKind::CodeAction => Event::CodeActions {
                id,
                actions: typed(result)?,
            },
            RequestKind::WillSaveWaitUntil => Event::WillSaveWaitUntil {
                id,
                edits: typed(result)?,
            },
        })
    }
}
