//! The client: a pure protocol state machine.
//!
//! All effects surface as enqueued bytes ([`Client::take_output`]) and
//! enqueued events ([`Client::events`]); the caller owns the transport
//! and the scheduling. Operations are gated by the lifecycle state and
//! fail fast when called out of turn.

use std::collections::{HashMap, VecDeque};

use lsp_types::notification::{self, Notification as Notif};
use lsp_types::request::{self, Request as Req};
use lsp_types::{
    ApplyWorkspaceEditParams, ApplyWorkspaceEditResponse, CancelParams, ClientCapabilities,
    ClientInfo, CodeActionContext, CodeActionParams, CompletionContext, CompletionParams,
    ConfigurationParams, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DidSaveTextDocumentParams, DocumentFormattingParams,
    DocumentRangeFormattingParams, DocumentSymbolParams, ExecuteCommandParams, FoldingRangeParams,
    FormattingOptions, GotoDefinitionParams, HoverParams, InitializeParams, InitializeResult,
    InitializedParams, LogMessageParams, MessageActionItem, NumberOrString, Position,
    ProgressParams, ProgressParamsValue, ProgressToken, PublishDiagnosticsParams, Range,
    ReferenceContext, ReferenceParams, Registration, RegistrationParams, RenameParams,
    ServerCapabilities, ServerInfo, ShowMessageParams, ShowMessageRequestParams,
    SignatureHelpParams, TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentPositionParams, TextDocumentSaveReason, TextDocumentSyncKind, TraceValue,
    UnregistrationParams, Url, VersionedTextDocumentIdentifier, WillSaveTextDocumentParams,
    WorkDoneProgress, WorkDoneProgressCreateParams, WorkspaceFolder, WorkspaceSymbolParams,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::req_queue::ReqQueue;
use crate::{
    codec, CapabilityRegistry, ClientError, ClientState, ErrorCode, Event, FrameError, Message,
    Notification, ProtocolError, Request, RequestId, RequestKind, Response, StreamDecoder,
};

/// What the caller knows at construction time; everything feeding the
/// `initialize` request.
#[derive(Debug, Clone, Default)]
pub struct ClientParams {
    /// The process id of the editor, for the server's orphan detection.
    pub process_id: Option<u32>,
    /// The root of the workspace, absent for single-file sessions.
    pub root_uri: Option<Url>,
    /// The workspace folders, overriding `root_uri` when present.
    pub workspace_folders: Option<Vec<WorkspaceFolder>>,
    /// The initial trace verbosity.
    pub trace: Option<TraceValue>,
    /// Name and version of the editor.
    pub client_info: Option<ClientInfo>,
    /// The capabilities we advertise.
    pub capabilities: ClientCapabilities,
    /// Server-specific options, passed through verbatim.
    pub initialization_options: Option<Value>,
}

/// A sans-I/O LSP client session.
///
/// Bytes from the server go in through [`feed`](Client::feed), typed
/// [`Event`]s come out of [`events`](Client::events), and bytes for the
/// server accumulate until [`take_output`](Client::take_output) drains
/// them. Construction queues the `initialize` request immediately.
#[derive(Debug)]
pub struct Client {
    state: ClientState,
    decoder: StreamDecoder,
    outgoing: Vec<u8>,
    events: VecDeque<Event>,
    req_queue: ReqQueue,
    caps: CapabilityRegistry,
    /// Progress streams by token; the flag records whether a begin has
    /// been seen (tokens from `workDoneProgress/create` start false).
    progress: HashMap<ProgressToken, bool>,
    /// Sync kind negotiated for each open document.
    docs: HashMap<Url, TextDocumentSyncKind>,
    init_id: RequestId,
}

impl Client {
    /// Creates a session and queues the `initialize` request.
    pub fn new(params: ClientParams) -> Client {
        let mut client = Client {
            state: ClientState::NotInitialized,
            decoder: StreamDecoder::new(),
            outgoing: Vec::new(),
            events: VecDeque::new(),
            req_queue: ReqQueue::default(),
            caps: CapabilityRegistry::default(),
            progress: HashMap::new(),
            docs: HashMap::new(),
            init_id: RequestId::from(0),
        };
        client.send_initialize(params);
        client
    }

    #[allow(deprecated)] // `root_uri` is marked as deprecated
    fn send_initialize(&mut self, params: ClientParams) {
        let ClientParams {
            process_id,
            root_uri,
            workspace_folders,
            trace,
            client_info,
            capabilities,
            initialization_options,
        } = params;
        let params = InitializeParams {
            process_id,
            root_uri,
            initialization_options,
            capabilities,
            trace,
            workspace_folders,
            client_info,
            ..Default::default()
        };
        self.init_id = self.send_request::<request::Initialize>(params, RequestKind::Initialize);
        self.state = ClientState::WaitingForInitialized;
    }

    /// The lifecycle state the session is in.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The capabilities the server advertised at `initialize`. Empty
    /// until the handshake completes.
    pub fn capabilities(&self) -> &ServerCapabilities {
        self.caps.snapshot()
    }

    /// The server's self-description, when it sent one.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.caps.server_info()
    }

    /// The dynamic registrations currently in force.
    pub fn registrations(&self) -> impl Iterator<Item = &Registration> {
        self.caps.registrations()
    }

    /// How many of our requests still await a response.
    pub fn pending_requests(&self) -> usize {
        self.req_queue.outgoing.pending_count()
    }

    // === the byte-level surface ===

    /// Feeds bytes read from the server. Complete messages are
    /// dispatched immediately; partial frames stay buffered.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        self.decoder.feed(bytes)?;
        while let Some(msg) = self.decoder.next_message()? {
            self.dispatch(msg);
        }
        Ok(())
    }

    /// Drains the events produced since the last call.
    pub fn events(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.events.drain(..)
    }

    /// Drains the bytes that are ready to be written to the server.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outgoing)
    }

    // === document synchronization ===

    /// Announces a newly opened document.
    pub fn did_open(
        &mut self,
        uri: Url,
        language_id: impl Into<String>,
        version: i32,
        text: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.state.expect(ClientState::Normal, "didOpen")?;
        self.docs.insert(uri.clone(), self.caps.text_document_sync());
        self.send_notification::<notification::DidOpenTextDocument>(DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri,
                language_id: language_id.into(),
                version,
                text: text.into(),
            },
        });
        Ok(())
    }

    /// Announces changes to an open document. The version is
    /// caller-supplied; the changes must fit the sync kind negotiated
    /// when the document was opened.
    pub fn did_change(
        &mut self,
        uri: Url,
        version: i32,
        content_changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Result<(), ClientError> {
        self.state.expect(ClientState::Normal, "didChange")?;
        let kind = self.open_document(&uri)?;
        let fits = if kind == TextDocumentSyncKind::INCREMENTAL {
            true
        } else if kind == TextDocumentSyncKind::FULL {
            content_changes.iter().all(|c| c.range.is_none())
        } else {
            false
        };
        if !fits {
            return Err(ClientError::UnsupportedChange { uri, kind });
        }
        self.send_notification::<notification::DidChangeTextDocument>(
            DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier { uri, version },
                content_changes,
            },
        );
        Ok(())
    }

    /// Announces that a document was closed.
    pub fn did_close(&mut self, uri: Url) -> Result<(), ClientError> {
        self.state.expect(ClientState::Normal, "didClose")?;
        self.open_document(&uri)?;
        self.docs.remove(&uri);
        self.send_notification::<notification::DidCloseTextDocument>(DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri },
        });
        Ok(())
    }

    /// Announces that a document was saved, optionally with its full
    /// content.
    pub fn did_save(&mut self, uri: Url, text: Option<String>) -> Result<(), ClientError> {
        self.state.expect(ClientState::Normal, "didSave")?;
        self.open_document(&uri)?;
        self.send_notification::<notification::DidSaveTextDocument>(DidSaveTextDocumentParams {
            text_document: TextDocumentIdentifier { uri },
            text,
        });
        Ok(())
    }

    /// Announces that a document is about to be saved.
    pub fn will_save(
        &mut self,
        uri: Url,
        reason: TextDocumentSaveReason,
    ) -> Result<(), ClientError> {
        self.state.expect(ClientState::Normal, "willSave")?;
        self.open_document(&uri)?;
        self.send_notification::<notification::WillSaveTextDocument>(WillSaveTextDocumentParams {
            text_document: TextDocumentIdentifier { uri },
            reason,
        });
        Ok(())
    }

    /// Asks for pre-save edits; the server answers before the save may
    /// proceed.
    pub fn will_save_wait_until(
        &mut self,
        uri: Url,
        reason: TextDocumentSaveReason,
    ) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "willSaveWaitUntil")?;
        self.open_document(&uri)?;
        Ok(self.send_request::<request::WillSaveWaitUntil>(
            WillSaveTextDocumentParams {
                text_document: TextDocumentIdentifier { uri },
                reason,
            },
            RequestKind::WillSaveWaitUntil,
        ))
    }

    // === feature requests ===

    /// Requests completions at a position.
    pub fn completion(
        &mut self,
        uri: Url,
        position: Position,
        context: Option<CompletionContext>,
    ) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "completion")?;
        Ok(self.send_request::<request::Completion>(
            CompletionParams {
                text_document_position: doc_position(uri, position),
                context,
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            },
            RequestKind::Completion,
        ))
    }

    /// Requests hover information at a position.
    pub fn hover(&mut self, uri: Url, position: Position) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "hover")?;
        Ok(self.send_request::<request::HoverRequest>(
            HoverParams {
                text_document_position_params: doc_position(uri, position),
                work_done_progress_params: Default::default(),
            },
            RequestKind::Hover,
        ))
    }

    /// Requests signature help at a position.
    pub fn signature_help(
        &mut self,
        uri: Url,
        position: Position,
    ) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "signatureHelp")?;
        Ok(self.send_request::<request::SignatureHelpRequest>(
            SignatureHelpParams {
                context: None,
                text_document_position_params: doc_position(uri, position),
                work_done_progress_params: Default::default(),
            },
            RequestKind::SignatureHelp,
        ))
    }

    /// Requests the definition of the symbol at a position.
    pub fn definition(&mut self, uri: Url, position: Position) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "definition")?;
        Ok(self.send_request::<request::GotoDefinition>(
            goto_params(uri, position),
            RequestKind::Definition,
        ))
    }

    /// Requests the declaration of the symbol at a position.
    pub fn declaration(&mut self, uri: Url, position: Position) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "declaration")?;
        Ok(self.send_request::<request::GotoDeclaration>(
            goto_params(uri, position),
            RequestKind::Declaration,
        ))
    }

    /// Requests the type definition of the symbol at a position.
    pub fn type_definition(
        &mut self,
        uri: Url,
        position: Position,
    ) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "typeDefinition")?;
        Ok(self.send_request::<request::GotoTypeDefinition>(
            goto_params(uri, position),
            RequestKind::TypeDefinition,
        ))
    }

    /// Requests the implementations of the symbol at a position.
    pub fn implementation(
        &mut self,
        uri: Url,
        position: Position,
    ) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "implementation")?;
        Ok(self.send_request::<request::GotoImplementation>(
            goto_params(uri, position),
            RequestKind::Implementation,
        ))
    }

    /// Requests all references to the symbol at a position.
    pub fn references(
        &mut self,
        uri: Url,
        position: Position,
        include_declaration: bool,
    ) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "references")?;
        Ok(self.send_request::<request::References>(
            ReferenceParams {
                text_document_position: doc_position(uri, position),
                context: ReferenceContext {
                    include_declaration,
                },
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            },
            RequestKind::References,
        ))
    }

    /// Requests the symbols of a document.
    pub fn document_symbol(&mut self, uri: Url) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "documentSymbol")?;
        Ok(self.send_request::<request::DocumentSymbolRequest>(
            DocumentSymbolParams {
                text_document: TextDocumentIdentifier { uri },
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            },
            RequestKind::DocumentSymbol,
        ))
    }

    /// Searches the workspace for symbols matching a query.
    pub fn workspace_symbol(&mut self, query: impl Into<String>) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "workspaceSymbol")?;
        Ok(self.send_request::<request::WorkspaceSymbolRequest>(
            WorkspaceSymbolParams {
                query: query.into(),
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            },
            RequestKind::WorkspaceSymbol,
        ))
    }

    /// Requests a whole-document format.
    pub fn formatting(
        &mut self,
        uri: Url,
        options: FormattingOptions,
    ) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "formatting")?;
        Ok(self.send_request::<request::Formatting>(
            DocumentFormattingParams {
                text_document: TextDocumentIdentifier { uri },
                options,
                work_done_progress_params: Default::default(),
            },
            RequestKind::Formatting,
        ))
    }

    /// Requests a format of part of a document.
    pub fn range_formatting(
        &mut self,
        uri: Url,
        range: Range,
        options: FormattingOptions,
    ) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "rangeFormatting")?;
        Ok(self.send_request::<request::RangeFormatting>(
            DocumentRangeFormattingParams {
                text_document: TextDocumentIdentifier { uri },
                range,
                options,
                work_done_progress_params: Default::default(),
            },
            RequestKind::RangeFormatting,
        ))
    }

    /// Requests a workspace-wide rename of the symbol at a position.
    pub fn rename(
        &mut self,
        uri: Url,
        position: Position,
        new_name: impl Into<String>,
    ) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "rename")?;
        Ok(self.send_request::<request::Rename>(
            RenameParams {
                text_document_position: doc_position(uri, position),
                new_name: new_name.into(),
                work_done_progress_params: Default::default(),
            },
            RequestKind::Rename,
        ))
    }

    /// Requests the foldable ranges of a document.
    pub fn folding_range(&mut self, uri: Url) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "foldingRange")?;
        Ok(self.send_request::<request::FoldingRangeRequest>(
            FoldingRangeParams {
                text_document: TextDocumentIdentifier { uri },
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            },
            RequestKind::FoldingRange,
        ))
    }

    /// Asks the server to execute one of the commands it advertised.
    pub fn execute_command(
        &mut self,
        command: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "executeCommand")?;
        Ok(self.send_request::<request::ExecuteCommand>(
            ExecuteCommandParams {
                command: command.into(),
                arguments,
                work_done_progress_params: Default::default(),
            },
            RequestKind::ExecuteCommand,
        ))
    }

    /// Requests the code actions available for a range.
    pub fn code_action(
        &mut self,
        uri: Url,
        range: Range,
        context: CodeActionContext,
    ) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "codeAction")?;
        Ok(self.send_request::<request::CodeActionRequest>(
            CodeActionParams {
                text_document: TextDocumentIdentifier { uri },
                range,
                context,
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            },
            RequestKind::CodeAction,
        ))
    }

    // === lifecycle ===

    /// Starts an orderly shutdown. Feature traffic is rejected from
    /// here on; `exit` becomes legal once the server acknowledges.
    pub fn shutdown(&mut self) -> Result<RequestId, ClientError> {
        self.state.expect(ClientState::Normal, "shutdown")?;
        let id = self.send_request::<request::Shutdown>((), RequestKind::Shutdown);
        self.state = ClientState::WaitingForShutdown;
        Ok(id)
    }

    /// Tells the server to exit. Terminal; every later operation fails.
    pub fn exit(&mut self) -> Result<(), ClientError> {
        self.state.expect(ClientState::Shutdown, "exit")?;
        self.send_notification::<notification::Exit>(());
        self.state = ClientState::Exited;
        Ok(())
    }

    /// Asks the server to abandon one of our in-flight requests. The
    /// pending entry stays until the server's terminal reply, which may
    /// still be a result or a `RequestCancelled` error.
    pub fn cancel_request(&mut self, id: &RequestId) -> Result<(), ClientError> {
        self.state.expect(ClientState::Normal, "cancelRequest")?;
        let id = match id {
            RequestId::Number(n) => NumberOrString::Number(*n),
            RequestId::String(s) => NumberOrString::String(s.clone()),
        };
        self.send_notification::<notification::Cancel>(CancelParams { id });
        Ok(())
    }

    // === replies to server-originated requests ===

    /// Answers a [`ConfigurationRequest`](Event::ConfigurationRequest)
    /// with one settings value per requested item.
    pub fn reply_to_configuration(
        &mut self,
        id: RequestId,
        items: Vec<Value>,
    ) -> Result<(), ClientError> {
        self.reply(id, request::WorkspaceConfiguration::METHOD, items)
    }

    /// Answers a [`WorkspaceFoldersRequest`](Event::WorkspaceFoldersRequest).
    pub fn reply_to_workspace_folders(
        &mut self,
        id: RequestId,
        folders: Option<Vec<WorkspaceFolder>>,
    ) -> Result<(), ClientError> {
        self.reply(id, request::WorkspaceFoldersRequest::METHOD, folders)
    }

    /// Answers a [`ShowMessageRequest`](Event::ShowMessageRequest) with
    /// the action the user picked, if any.
    pub fn reply_to_show_message_request(
        &mut self,
        id: RequestId,
        action: Option<MessageActionItem>,
    ) -> Result<(), ClientError> {
        self.reply(id, request::ShowMessageRequest::METHOD, action)
    }

    /// Answers an [`ApplyEdit`](Event::ApplyEdit) with whether the edit
    /// was applied.
    pub fn reply_to_apply_edit(
        &mut self,
        id: RequestId,
        response: ApplyWorkspaceEditResponse,
    ) -> Result<(), ClientError> {
        self.reply(id, request::ApplyWorkspaceEdit::METHOD, response)
    }

    fn reply(
        &mut self,
        id: RequestId,
        method: &'static str,
        result: impl Serialize,
    ) -> Result<(), ClientError> {
        if self.req_queue.incoming.method(&id) != Some(method) {
            return Err(ClientError::UnknownServerRequest(id));
        }
        self.req_queue.incoming.complete(&id);
        let response = Response::new_ok(id, result);
        self.enqueue(response.into());
        Ok(())
    }

    // === dispatch ===

    fn dispatch(&mut self, msg: Message) {
        match msg {
            Message::Response(response) => self.on_response(response),
            Message::Request(request) => self.on_request(request),
            Message::Notification(notification) => self.on_notification(notification),
        }
    }

    fn on_response(&mut self, response: Response) {
        let Response { id, result, error } = response;
        let Some(kind) = self.req_queue.outgoing.complete(&id) else {
            if id == self.init_id && self.state > ClientState::WaitingForInitialized {
                self.push_error(ProtocolError::DuplicateInitialize);
            } else {
                self.push_error(ProtocolError::UnknownResponseId(id));
            }
            return;
        };

        if let Some(error) = error {
            self.events.push_back(Event::RpcError { id, kind, error });
            return;
        }

        match kind {
            RequestKind::Initialize => self.on_initialize_response(result),
            RequestKind::Shutdown => {
                if self.state == ClientState::WaitingForShutdown {
                    self.state = ClientState::Shutdown;
                }
                self.events.push_back(Event::Shutdown);
            }
            _ => match kind.decode_reply(id, result) {
                Ok(event) => self.events.push_back(event),
                Err(err) => self.push_error(ProtocolError::InvalidParams {
                    method: kind.method().to_owned(),
                    message: err.to_string(),
                }),
            },
        }
    }

    fn on_initialize_response(&mut self, result: Option<Value>) {
        if self.state != ClientState::WaitingForInitialized {
            self.push_error(ProtocolError::DuplicateInitialize);
            return;
        }
        match serde_json::from_value::<InitializeResult>(result.unwrap_or(Value::Null)) {
            Ok(result) => {
                self.caps.record_initialize(result);
                self.state = ClientState::Normal;
                // The `initialized` notification is ours to send; the
                // caller may not send it manually.
                self.send_notification::<notification::Initialized>(InitializedParams {});
                self.events.push_back(Event::Initialized {
                    capabilities: self.caps.snapshot().clone(),
                    server_info: self.caps.server_info().cloned(),
                });
            }
            Err(err) => self.push_error(ProtocolError::InvalidParams {
                method: request::Initialize::METHOD.to_owned(),
                message: err.to_string(),
            }),
        }
    }

    fn on_request(&mut self, request: Request) {
        let Request { id, method, params } = request;
        if self.state != ClientState::Normal {
            self.enqueue(
                Response::new_err(
                    id,
                    ErrorCode::InvalidRequest as i32,
                    format!("client is in state {:?}", self.state),
                )
                .into(),
            );
            self.push_error(ProtocolError::UnexpectedMessage {
                state: self.state,
                method,
            });
            return;
        }

        match method.as_str() {
            request::WorkspaceConfiguration::METHOD => {
                let Some(params) = self.request_params::<ConfigurationParams>(&id, &method, params)
                else {
                    return;
                };
                self.req_queue.incoming.register(id.clone(), method);
                self.events.push_back(Event::ConfigurationRequest {
                    id,
                    items: params.items,
                });
            }
            request::WorkspaceFoldersRequest::METHOD => {
                self.req_queue.incoming.register(id.clone(), method);
                self.events.push_back(Event::WorkspaceFoldersRequest { id });
            }
            request::ShowMessageRequest::METHOD => {
                let Some(params) =
                    self.request_params::<ShowMessageRequestParams>(&id, &method, params)
                else {
                    return;
                };
                self.req_queue.incoming.register(id.clone(), method);
                self.events.push_back(Event::ShowMessageRequest { id, params });
            }
            request::ApplyWorkspaceEdit::METHOD => {
                let Some(params) =
                    self.request_params::<ApplyWorkspaceEditParams>(&id, &method, params)
                else {
                    return;
                };
                self.req_queue.incoming.register(id.clone(), method);
                self.events.push_back(Event::ApplyEdit { id, params });
            }
            request::WorkDoneProgressCreate::METHOD => {
                let Some(params) =
                    self.request_params::<WorkDoneProgressCreateParams>(&id, &method, params)
                else {
                    return;
                };
                self.progress.entry(params.token).or_insert(false);
                self.enqueue(Response::new_ok(id, Value::Null).into());
            }
            request::RegisterCapability::METHOD => {
                let Some(params) = self.request_params::<RegistrationParams>(&id, &method, params)
                else {
                    return;
                };
                for registration in params.registrations {
                    self.caps.register(registration);
                }
                self.enqueue(Response::new_ok(id, Value::Null).into());
            }
            request::UnregisterCapability::METHOD => {
                let Some(params) = self.request_params::<UnregistrationParams>(&id, &method, params)
                else {
                    return;
                };
                for unregistration in params.unregisterations {
                    self.caps.unregister(&unregistration.id);
                }
                self.enqueue(Response::new_ok(id, Value::Null).into());
            }
            _ => {
                log::warn!("unhandled server request: {method}");
                self.enqueue(
                    Response::new_err(
                        id,
                        ErrorCode::MethodNotFound as i32,
                        format!("No such method {method}"),
                    )
                    .into(),
                );
            }
        }
    }

    fn on_notification(&mut self, notification: Notification) {
        let Notification { method, params } = notification;
        if self.state != ClientState::Normal {
            log::warn!("dropping {method} in state {:?}", self.state);
            return;
        }

        match method.as_str() {
            notification::PublishDiagnostics::METHOD => {
                if let Some(params) = self.notification_params::<PublishDiagnosticsParams>(&method, params) {
                    self.events.push_back(Event::PublishDiagnostics(params));
                }
            }
            notification::ShowMessage::METHOD => {
                if let Some(params) = self.notification_params::<ShowMessageParams>(&method, params) {
                    self.events.push_back(Event::ShowMessage(params));
                }
            }
            notification::LogMessage::METHOD => {
                if let Some(params) = self.notification_params::<LogMessageParams>(&method, params) {
                    self.events.push_back(Event::LogMessage(params));
                }
            }
            notification::Progress::METHOD => {
                if let Some(params) = self.notification_params::<ProgressParams>(&method, params) {
                    self.on_progress(params);
                }
            }
            _ => log::debug!("unhandled notification: {method}"),
        }
    }

    fn on_progress(&mut self, params: ProgressParams) {
        let ProgressParams { token, value } = params;
        let ProgressParamsValue::WorkDone(progress) = value;
        match progress {
            WorkDoneProgress::Begin(begin) => {
                self.progress.insert(token.clone(), true);
                self.events.push_back(Event::ProgressBegin { token, begin });
            }
            WorkDoneProgress::Report(report) => {
                if self.progress.get(&token) == Some(&true) {
                    self.events.push_back(Event::ProgressReport { token, report });
                } else {
                    self.push_error(ProtocolError::ProgressWithoutBegin(token));
                }
            }
            WorkDoneProgress::End(end) => {
                if self.progress.remove(&token) == Some(true) {
                    self.events.push_back(Event::ProgressEnd { token, end });
                } else {
                    self.push_error(ProtocolError::ProgressWithoutBegin(token));
                }
            }
        }
    }

    // === plumbing ===

    fn send_request<R: Req>(&mut self, params: R::Params, kind: RequestKind) -> RequestId {
        let request = self
            .req_queue
            .outgoing
            .register(R::METHOD.to_owned(), params, kind);
        let id = request.id.clone();
        self.enqueue(request.into());
        id
    }

    fn send_notification<N: Notif>(&mut self, params: N::Params) {
        self.enqueue(Notification::new(N::METHOD.to_owned(), params).into());
    }

    fn enqueue(&mut self, msg: Message) {
        codec::encode(&msg, &mut self.outgoing);
    }

    fn open_document(&self, uri: &Url) -> Result<TextDocumentSyncKind, ClientError> {
        self.docs
            .get(uri)
            .copied()
            .ok_or_else(|| ClientError::UnknownDocument(uri.clone()))
    }

    fn push_error(&mut self, error: ProtocolError) {
        log::warn!("{error}");
        self.events.push_back(Event::Error(error));
    }

    /// Decodes the params of a server request, replying with an
    /// `InvalidParams` error when they do not fit.
    fn request_params<P: DeserializeOwned>(
        &mut self,
        id: &RequestId,
        method: &str,
        params: Value,
    ) -> Option<P> {
        match serde_json::from_value(params) {
            Ok(params) => Some(params),
            Err(err) => {
                self.enqueue(
                    Response::new_err(
                        id.clone(),
                        ErrorCode::InvalidParams as i32,
                        format!("Failed to deserialize parameters: {err}"),
                    )
                    .into(),
                );
                self.push_error(ProtocolError::InvalidParams {
                    method: method.to_owned(),
                    message: err.to_string(),
                });
                None
            }
        }
    }

    /// Decodes the params of a notification, reporting a protocol error
    /// when they do not fit.
    fn notification_params<P: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Value,
    ) -> Option<P> {
        match serde_json::from_value(params) {
            Ok(params) => Some(params),
            Err(err) => {
                self.push_error(ProtocolError::InvalidParams {
                    method: method.to_owned(),
                    message: err.to_string(),
                });
                None
            }
        }
    }
}

fn doc_position(uri: Url, position: Position) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri },
        position,
    }
}

fn goto_params(uri: Url, position: Position) -> GotoDefinitionParams {
    GotoDefinitionParams {
        text_document_position_params: doc_position(uri, position),
        work_done_progress_params: Default::default(),
        partial_result_params: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use lsp_types::CompletionResponse;
    use serde_json::json;

    use super::*;

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn new_client() -> Client {
        Client::new(ClientParams {
            process_id: Some(1234),
            root_uri: Some(uri("file:///tmp/x")),
            ..Default::default()
        })
    }

    /// Frames `value` the way a server would and feeds it in.
    fn feed_message(client: &mut Client, value: serde_json::Value) {
        let text = value.to_string();
        client
            .feed(format!("Content-Length: {}\r\n\r\n{text}", text.len()).as_bytes())
            .unwrap();
    }

    /// Unframes everything the client queued for the server.
    fn sent_messages(client: &mut Client) -> Vec<Message> {
        let bytes = client.take_output();
        let text = String::from_utf8(bytes.clone()).unwrap();
        let mut decoder = StreamDecoder::new();
        decoder.feed(&bytes).unwrap();
        let messages = decoder.drain().unwrap();
        // Every emitted message carries the JSON-RPC version marker.
        assert_eq!(text.matches("\"jsonrpc\":\"2.0\"").count(), messages.len());
        messages
    }

    /// A client past the handshake, with incremental sync negotiated.
    fn running_client() -> Client {
        let mut client = new_client();
        feed_message(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 0, "result": {"capabilities": {"textDocumentSync": 2}}}),
        );
        assert_eq!(client.events().count(), 1);
        client.take_output();
        client
    }

    #[test]
    fn handshake() {
        let mut client = new_client();
        assert_eq!(client.state(), ClientState::WaitingForInitialized);

        let sent = sent_messages(&mut client);
        assert_eq!(sent.len(), 1);
        let Message::Request(init) = &sent[0] else {
            panic!("expected the initialize request: {sent:?}");
        };
        assert_eq!(init.method, "initialize");
        assert_eq!(init.id, 0.into());
        assert_eq!(init.params["processId"], 1234);
        assert_eq!(init.params["rootUri"], "file:///tmp/x");

        feed_message(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 0, "result": {"capabilities": {}}}),
        );
        let events: Vec<_> = client.events().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Initialized { .. }));
        assert_eq!(client.state(), ClientState::Normal);

        let sent = sent_messages(&mut client);
        assert!(
            matches!(&sent[..], [Message::Notification(n)] if n.method == "initialized"),
            "expected the initialized notification: {sent:?}"
        );
    }

    #[test]
    fn absent_initialize_optionals_are_omitted() {
        let mut client = Client::new(ClientParams::default());
        let text = String::from_utf8(client.take_output()).unwrap();
        assert!(!text.contains("clientInfo"));
        assert!(!text.contains("workspaceFolders"));
        assert!(!text.contains("initializationOptions"));
        assert!(!text.contains("trace"));
    }

    #[test]
    fn feature_requests_before_handshake_are_rejected() {
        let mut client = new_client();
        let err = client
            .completion(uri("file:///a.py"), Position { line: 0, character: 0 }, None)
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::IllegalState {
                state: ClientState::WaitingForInitialized,
                operation: "completion",
            }
        );
    }

    #[test]
    fn completion_request_response() {
        let mut client = running_client();
        let id = client
            .completion(uri("file:///a.py"), Position { line: 3, character: 7 }, None)
            .unwrap();

        let sent = sent_messages(&mut client);
        let Message::Request(req) = &sent[0] else {
            panic!("expected a request: {sent:?}");
        };
        assert_eq!(req.method, "textDocument/completion");
        assert_eq!(req.params["textDocument"]["uri"], "file:///a.py");
        assert_eq!(req.params["position"]["line"], 3);
        assert_eq!(req.params["position"]["character"], 7);
        assert_eq!(client.pending_requests(), 1);

        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": id.as_i32().unwrap(),
                "result": {"isIncomplete": false, "items": [{"label": "foo"}]},
            }),
        );
        let events: Vec<_> = client.events().collect();
        assert_eq!(events.len(), 1);
        let Event::Completion {
            id: event_id,
            response: Some(CompletionResponse::List(list)),
        } = &events[0]
        else {
            panic!("expected a completion event: {events:?}");
        };
        assert_eq!(*event_id, id);
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].label, "foo");
        assert_eq!(client.pending_requests(), 0);
    }

    #[test]
    fn request_ids_are_distinct() {
        let mut client = running_client();
        let a = client.hover(uri("file:///a.py"), Position { line: 0, character: 0 }).unwrap();
        let b = client.hover(uri("file:///a.py"), Position { line: 0, character: 0 }).unwrap();
        let c = client.shutdown().unwrap();
        assert!(a != b && b != c && a != c);
    }

    #[test]
    fn pending_table_is_conserved() {
        let mut client = running_client();
        let a = client.hover(uri("file:///a.py"), Position { line: 0, character: 0 }).unwrap();
        let _b = client.hover(uri("file:///a.py"), Position { line: 1, character: 0 }).unwrap();
        let c = client.definition(uri("file:///a.py"), Position { line: 2, character: 0 }).unwrap();
        assert_eq!(client.pending_requests(), 3);

        // Responses may arrive out of send order.
        feed_message(
            &mut client,
            json!({"jsonrpc": "2.0", "id": c.as_i32().unwrap(), "result": null}),
        );
        feed_message(
            &mut client,
            json!({"jsonrpc": "2.0", "id": a.as_i32().unwrap(), "result": null}),
        );
        assert_eq!(client.pending_requests(), 1);
        let events: Vec<_> = client.events().collect();
        assert!(matches!(events[0], Event::Definition { .. }));
        assert!(matches!(events[1], Event::Hover { .. }));
    }

    #[test]
    fn unknown_response_id_is_a_protocol_error() {
        let mut client = running_client();
        feed_message(&mut client, json!({"jsonrpc": "2.0", "id": 999, "result": null}));
        let events: Vec<_> = client.events().collect();
        assert_eq!(
            events,
            vec![Event::Error(ProtocolError::UnknownResponseId(999.into()))]
        );
    }

    #[test]
    fn second_initialize_response_is_flagged() {
        let mut client = running_client();
        feed_message(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 0, "result": {"capabilities": {}}}),
        );
        let events: Vec<_> = client.events().collect();
        assert_eq!(events, vec![Event::Error(ProtocolError::DuplicateInitialize)]);
    }

    #[test]
    fn publish_diagnostics() {
        let mut client = running_client();
        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "method": "textDocument/publishDiagnostics",
                "params": {
                    "uri": "file:///a.py",
                    "diagnostics": [{
                        "range": {
                            "start": {"line": 0, "character": 0},
                            "end": {"line": 0, "character": 1},
                        },
                        "message": "x",
                    }],
                },
            }),
        );
        let events: Vec<_> = client.events().collect();
        assert_eq!(events.len(), 1);
        let Event::PublishDiagnostics(params) = &events[0] else {
            panic!("expected diagnostics: {events:?}");
        };
        assert_eq!(params.uri, uri("file:///a.py"));
        assert_eq!(params.diagnostics.len(), 1);
        assert_eq!(params.diagnostics[0].message, "x");
    }

    fn progress(token: &str, value: serde_json::Value) -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "method": "$/progress",
            "params": {"token": token, "value": value},
        })
    }

    #[test]
    fn progress_stream() {
        let mut client = running_client();
        feed_message(&mut client, progress("t", json!({"kind": "begin", "title": "indexing"})));
        feed_message(&mut client, progress("t", json!({"kind": "report", "percentage": 50})));
        feed_message(&mut client, progress("t", json!({"kind": "end"})));

        let events: Vec<_> = client.events().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], Event::ProgressBegin { begin, .. } if begin.title == "indexing"));
        assert!(
            matches!(&events[1], Event::ProgressReport { report, .. } if report.percentage == Some(50))
        );
        assert!(matches!(&events[2], Event::ProgressEnd { .. }));
    }

    #[test]
    fn stray_progress_end_is_a_protocol_error() {
        let mut client = running_client();
        feed_message(&mut client, progress("t", json!({"kind": "end"})));
        let events: Vec<_> = client.events().collect();
        assert_eq!(
            events,
            vec![Event::Error(ProtocolError::ProgressWithoutBegin(
                NumberOrString::String("t".into())
            ))]
        );
    }

    #[test]
    fn created_token_still_needs_a_begin() {
        let mut client = running_client();
        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": "create-1",
                "method": "window/workDoneProgress/create",
                "params": {"token": "t"},
            }),
        );
        // The create is answered inside the core.
        let sent = sent_messages(&mut client);
        assert!(
            matches!(&sent[..], [Message::Response(resp)] if resp.id == RequestId::from("create-1".to_owned()) && resp.error.is_none())
        );

        feed_message(&mut client, progress("t", json!({"kind": "report"})));
        let events: Vec<_> = client.events().collect();
        assert!(matches!(events[0], Event::Error(ProtocolError::ProgressWithoutBegin(_))));

        feed_message(&mut client, progress("t", json!({"kind": "begin", "title": "x"})));
        feed_message(&mut client, progress("t", json!({"kind": "report"})));
        let events: Vec<_> = client.events().collect();
        assert!(matches!(events[0], Event::ProgressBegin { .. }));
        assert!(matches!(events[1], Event::ProgressReport { .. }));
    }

    #[test]
    fn shutdown_and_exit() {
        let mut client = running_client();
        let id = client.shutdown().unwrap();
        assert_eq!(client.state(), ClientState::WaitingForShutdown);
        let sent = sent_messages(&mut client);
        assert!(matches!(&sent[..], [Message::Request(req)] if req.method == "shutdown"));

        // Feature traffic is rejected while shutting down.
        assert!(matches!(
            client.hover(uri("file:///a.py"), Position { line: 0, character: 0 }),
            Err(ClientError::IllegalState { .. })
        ));

        feed_message(
            &mut client,
            json!({"jsonrpc": "2.0", "id": id.as_i32().unwrap(), "result": null}),
        );
        assert_eq!(client.state(), ClientState::Shutdown);
        let events: Vec<_> = client.events().collect();
        assert_eq!(events, vec![Event::Shutdown]);

        client.exit().unwrap();
        assert_eq!(client.state(), ClientState::Exited);
        let sent = sent_messages(&mut client);
        assert!(matches!(&sent[..], [Message::Notification(n)] if n.method == "exit"));

        assert!(matches!(
            client.shutdown(),
            Err(ClientError::IllegalState { state: ClientState::Exited, .. })
        ));
        assert!(matches!(client.exit(), Err(ClientError::IllegalState { .. })));
    }

    #[test]
    fn exit_before_shutdown_ack_is_rejected() {
        let mut client = running_client();
        client.shutdown().unwrap();
        assert!(matches!(
            client.exit(),
            Err(ClientError::IllegalState {
                state: ClientState::WaitingForShutdown,
                ..
            })
        ));
    }

    #[test]
    fn change_before_open_is_rejected() {
        let mut client = running_client();
        let err = client
            .did_change(uri("file:///a.py"), 2, vec![crate::util::whole_document_change("x")])
            .unwrap_err();
        assert_eq!(err, ClientError::UnknownDocument(uri("file:///a.py")));
    }

    #[test]
    fn change_kinds_follow_the_negotiated_sync() {
        // Full sync: whole-document changes only.
        let mut client = new_client();
        feed_message(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 0, "result": {"capabilities": {"textDocumentSync": 1}}}),
        );
        client.events().count();
        client.did_open(uri("file:///a.py"), "python", 1, "abc").unwrap();

        let incremental = crate::util::range_change(
            Position { line: 0, character: 0 },
            Position { line: 0, character: 1 },
            "x",
            "abc",
        );
        let err = client
            .did_change(uri("file:///a.py"), 2, vec![incremental])
            .unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedChange { kind, .. } if kind == TextDocumentSyncKind::FULL));

        client
            .did_change(uri("file:///a.py"), 2, vec![crate::util::whole_document_change("xbc")])
            .unwrap();
    }

    #[test]
    fn open_close_cycle() {
        let mut client = running_client();
        client.did_open(uri("file:///a.py"), "python", 1, "abc").unwrap();
        client
            .did_change(
                uri("file:///a.py"),
                2,
                vec![crate::util::range_change(
                    Position { line: 0, character: 0 },
                    Position { line: 0, character: 1 },
                    "x",
                    "abc",
                )],
            )
            .unwrap();
        client.did_save(uri("file:///a.py"), None).unwrap();
        client.did_close(uri("file:///a.py")).unwrap();
        assert_eq!(
            client.did_close(uri("file:///a.py")).unwrap_err(),
            ClientError::UnknownDocument(uri("file:///a.py"))
        );

        let sent = sent_messages(&mut client);
        let methods: Vec<_> = sent
            .iter()
            .map(|msg| match msg {
                Message::Notification(n) => n.method.as_str(),
                other => panic!("expected notifications: {other:?}"),
            })
            .collect();
        assert_eq!(
            methods,
            [
                "textDocument/didOpen",
                "textDocument/didChange",
                "textDocument/didSave",
                "textDocument/didClose",
            ]
        );
    }

    #[test]
    fn will_save_round_trip() {
        let mut client = running_client();
        client.did_open(uri("file:///a.py"), "python", 1, "abc").unwrap();
        client
            .will_save(uri("file:///a.py"), TextDocumentSaveReason::MANUAL)
            .unwrap();
        let id = client
            .will_save_wait_until(uri("file:///a.py"), TextDocumentSaveReason::MANUAL)
            .unwrap();

        let sent = sent_messages(&mut client);
        assert!(matches!(&sent[1], Message::Notification(n) if n.method == "textDocument/willSave"));
        assert!(
            matches!(&sent[2], Message::Request(req) if req.method == "textDocument/willSaveWaitUntil")
        );

        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": id.as_i32().unwrap(),
                "result": [{
                    "range": {
                        "start": {"line": 0, "character": 0},
                        "end": {"line": 0, "character": 0},
                    },
                    "newText": "fmt",
                }],
            }),
        );
        let events: Vec<_> = client.events().collect();
        let Event::WillSaveWaitUntil { edits: Some(edits), .. } = &events[0] else {
            panic!("expected pre-save edits: {events:?}");
        };
        assert_eq!(edits[0].new_text, "fmt");
    }

    #[test]
    fn feature_requests_go_out_under_their_methods() {
        let mut client = running_client();
        let any = Position { line: 0, character: 0 };
        client.signature_help(uri("file:///a.py"), any).unwrap();
        client.declaration(uri("file:///a.py"), any).unwrap();
        client.type_definition(uri("file:///a.py"), any).unwrap();
        client.implementation(uri("file:///a.py"), any).unwrap();
        client.references(uri("file:///a.py"), any, true).unwrap();
        client.document_symbol(uri("file:///a.py")).unwrap();
        client.workspace_symbol("foo").unwrap();
        client
            .formatting(
                uri("file:///a.py"),
                FormattingOptions {
                    tab_size: 4,
                    insert_spaces: true,
                    ..Default::default()
                },
            )
            .unwrap();
        client
            .range_formatting(
                uri("file:///a.py"),
                Range { start: any, end: any },
                FormattingOptions {
                    tab_size: 4,
                    insert_spaces: true,
                    ..Default::default()
                },
            )
            .unwrap();
        client.rename(uri("file:///a.py"), any, "bar").unwrap();
        client.folding_range(uri("file:///a.py")).unwrap();
        client.execute_command("x.doIt", vec![json!(1)]).unwrap();
        client
            .code_action(
                uri("file:///a.py"),
                Range { start: any, end: any },
                CodeActionContext::default(),
            )
            .unwrap();

        let methods: Vec<_> = sent_messages(&mut client)
            .into_iter()
            .map(|msg| match msg {
                Message::Request(req) => req.method,
                other => panic!("expected requests: {other:?}"),
            })
            .collect();
        assert_eq!(
            methods,
            [
                "textDocument/signatureHelp",
                "textDocument/declaration",
                "textDocument/typeDefinition",
                "textDocument/implementation",
                "textDocument/references",
                "textDocument/documentSymbol",
                "workspace/symbol",
                "textDocument/formatting",
                "textDocument/rangeFormatting",
                "textDocument/rename",
                "textDocument/foldingRange",
                "workspace/executeCommand",
                "textDocument/codeAction",
            ]
        );
    }

    #[test]
    fn did_save_without_text_omits_the_field() {
        let mut client = running_client();
        client.did_open(uri("file:///a.py"), "python", 1, "abc").unwrap();
        client.take_output();
        client.did_save(uri("file:///a.py"), None).unwrap();
        let text = String::from_utf8(client.take_output()).unwrap();
        assert!(!text.contains("\"text\""));
    }

    #[test]
    fn register_and_unregister_capability() {
        let mut client = running_client();
        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": "reg-1",
                "method": "client/registerCapability",
                "params": {"registrations": [
                    {"id": "fmt", "method": "textDocument/formatting"},
                ]},
            }),
        );
        let sent = sent_messages(&mut client);
        assert!(matches!(&sent[..], [Message::Response(resp)] if resp.error.is_none()));
        assert_eq!(
            client.registrations().map(|r| r.method.as_str()).collect::<Vec<_>>(),
            ["textDocument/formatting"]
        );

        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": "reg-2",
                "method": "client/unregisterCapability",
                "params": {"unregisterations": [
                    {"id": "fmt", "method": "textDocument/formatting"},
                ]},
            }),
        );
        sent_messages(&mut client);
        assert_eq!(client.registrations().count(), 0);
        // No events surfaced: both are answered inside the core.
        assert_eq!(client.events().count(), 0);
    }

    #[test]
    fn unknown_server_request_gets_method_not_found() {
        let mut client = running_client();
        feed_message(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 9, "method": "client/unknownThing"}),
        );
        let sent = sent_messages(&mut client);
        let Message::Response(resp) = &sent[0] else {
            panic!("expected an error response: {sent:?}");
        };
        assert_eq!(resp.error.as_ref().unwrap().code, -32601);
    }

    #[test]
    fn configuration_request_and_reply() {
        let mut client = running_client();
        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": "cfg-1",
                "method": "workspace/configuration",
                "params": {"items": [{"section": "python.linting"}]},
            }),
        );
        let events: Vec<_> = client.events().collect();
        let Event::ConfigurationRequest { id, items } = &events[0] else {
            panic!("expected a configuration request: {events:?}");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].section.as_deref(), Some("python.linting"));

        client
            .reply_to_configuration(id.clone(), vec![json!({"enabled": true})])
            .unwrap();
        let sent = sent_messages(&mut client);
        let Message::Response(resp) = &sent[0] else {
            panic!("expected a response: {sent:?}");
        };
        assert_eq!(resp.id, *id);
        assert_eq!(resp.result, Some(json!([{"enabled": true}])));

        // The entry is gone; replying twice is an error.
        assert_eq!(
            client.reply_to_configuration(id.clone(), vec![]),
            Err(ClientError::UnknownServerRequest(id.clone()))
        );
    }

    #[test]
    fn show_message_request_and_reply() {
        let mut client = running_client();
        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "window/showMessageRequest",
                "params": {"type": 1, "message": "boom", "actions": [{"title": "Retry"}]},
            }),
        );
        let events: Vec<_> = client.events().collect();
        let Event::ShowMessageRequest { id, params } = &events[0] else {
            panic!("expected a show-message request: {events:?}");
        };
        assert_eq!(params.message, "boom");

        let action: MessageActionItem = serde_json::from_value(json!({"title": "Retry"})).unwrap();
        client.reply_to_show_message_request(id.clone(), Some(action)).unwrap();
        let sent = sent_messages(&mut client);
        let Message::Response(resp) = &sent[0] else {
            panic!("expected a response: {sent:?}");
        };
        assert_eq!(resp.result.as_ref().unwrap()["title"], "Retry");
    }

    #[test]
    fn apply_edit_request_and_reply() {
        let mut client = running_client();
        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": 6,
                "method": "workspace/applyEdit",
                "params": {"edit": {}},
            }),
        );
        let events: Vec<_> = client.events().collect();
        let Event::ApplyEdit { id, .. } = &events[0] else {
            panic!("expected an apply-edit request: {events:?}");
        };

        let response: ApplyWorkspaceEditResponse =
            serde_json::from_value(json!({"applied": false, "failureReason": "read-only"})).unwrap();
        client.reply_to_apply_edit(id.clone(), response).unwrap();
        let sent = sent_messages(&mut client);
        let Message::Response(resp) = &sent[0] else {
            panic!("expected a response: {sent:?}");
        };
        assert_eq!(resp.result.as_ref().unwrap()["applied"], false);
    }

    #[test]
    fn rpc_error_is_correlated() {
        let mut client = running_client();
        let id = client.hover(uri("file:///a.py"), Position { line: 0, character: 0 }).unwrap();
        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": id.as_i32().unwrap(),
                "error": {"code": -32603, "message": "kaboom"},
            }),
        );
        let events: Vec<_> = client.events().collect();
        let Event::RpcError { id: event_id, kind, error } = &events[0] else {
            panic!("expected an rpc error: {events:?}");
        };
        assert_eq!(*event_id, id);
        assert_eq!(*kind, RequestKind::Hover);
        assert_eq!(error.code, -32603);
        assert_eq!(error.message, "kaboom");
    }

    #[test]
    fn cancelled_request_stays_pending_until_answered() {
        let mut client = running_client();
        let id = client.hover(uri("file:///a.py"), Position { line: 0, character: 0 }).unwrap();
        client.cancel_request(&id).unwrap();

        let sent = sent_messages(&mut client);
        let cancel = sent
            .iter()
            .find_map(|msg| match msg {
                Message::Notification(n) if n.method == "$/cancelRequest" => Some(n),
                _ => None,
            })
            .expect("a $/cancelRequest notification");
        assert_eq!(cancel.params["id"], id.as_i32().unwrap());
        assert_eq!(client.pending_requests(), 1);

        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": id.as_i32().unwrap(),
                "error": {"code": -32800, "message": "canceled"},
            }),
        );
        assert_eq!(client.pending_requests(), 0);
        let events: Vec<_> = client.events().collect();
        assert!(
            matches!(&events[0], Event::RpcError { error, .. } if error.code == ErrorCode::RequestCanceled as i32)
        );
    }

    #[test]
    fn notifications_outside_normal_are_dropped() {
        let mut client = new_client();
        feed_message(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "method": "window/showMessage",
                "params": {"type": 3, "message": "too early"},
            }),
        );
        assert_eq!(client.events().count(), 0);
    }

    #[test]
    fn server_requests_outside_normal_are_answered_with_an_error() {
        let mut client = new_client();
        client.take_output();
        feed_message(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 1, "method": "workspace/configuration", "params": {"items": []}}),
        );
        let sent = sent_messages(&mut client);
        let Message::Response(resp) = &sent[0] else {
            panic!("expected an error response: {sent:?}");
        };
        assert_eq!(resp.error.as_ref().unwrap().code, -32600);
        let events: Vec<_> = client.events().collect();
        assert!(matches!(
            events[0],
            Event::Error(ProtocolError::UnexpectedMessage { .. })
        ));
    }

    #[test]
    fn unknown_notifications_are_dropped_silently() {
        let mut client = running_client();
        feed_message(
            &mut client,
            json!({"jsonrpc": "2.0", "method": "$/somethingCustom", "params": {"x": 1}}),
        );
        assert_eq!(client.events().count(), 0);
    }

    #[test]
    fn workspace_folders_request_and_reply() {
        let mut client = running_client();
        feed_message(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 11, "method": "workspace/workspaceFolders"}),
        );
        let events: Vec<_> = client.events().collect();
        let Event::WorkspaceFoldersRequest { id } = &events[0] else {
            panic!("expected a workspace-folders request: {events:?}");
        };
        client
            .reply_to_workspace_folders(
                id.clone(),
                Some(vec![WorkspaceFolder {
                    uri: uri("file:///tmp/x"),
                    name: "x".into(),
                }]),
            )
            .unwrap();
        let sent = sent_messages(&mut client);
        let Message::Response(resp) = &sent[0] else {
            panic!("expected a response: {sent:?}");
        };
        assert_eq!(resp.result.as_ref().unwrap()[0]["name"], "x");
    }
}
