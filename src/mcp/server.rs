//! MCP server over newline-delimited JSON-RPC.
//!
//! Requests are read line by line. `tools/call` runs on its own task so a
//! slow call or a follow-mode log stream never blocks the reader; every
//! response goes through one writer task.

use serde_json::{json, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::protocol::{
    text_result, CallToolParams, CancelledParams, JsonRpcRequest, JsonRpcResponse,
    INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND, PARSE_ERROR,
    PROTOCOL_VERSION,
};
use crate::dispatch::{Dispatcher, InvocationRequest};
use crate::output::ToolOutput;
use crate::tools::ToolRegistry;

const SERVER_NAME: &str = "kube-mcp";
const OUTBOX_CAPACITY: usize = 64;

/// Running call keyed by its JSON-RPC id. `serial` tells a finished call's
/// entry apart from a later call that reused the id.
#[derive(Debug)]
struct InFlightCall {
    serial: u64,
    token: CancellationToken,
}

type InFlight = Arc<Mutex<HashMap<String, InFlightCall>>>;

/// Serves the tool dispatcher to one MCP client.
#[derive(Debug)]
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
    in_flight: InFlight,
    next_serial: AtomicU64,
    shutdown: CancellationToken,
}

impl McpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_serial: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop reading and cancel in-flight calls.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Serve on the process stdin/stdout.
    pub async fn serve_stdio(&self) -> io::Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve until the reader reaches EOF or [`McpServer::shutdown`] is
    /// called. Calls still running at EOF are allowed to finish.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
        let writer_task = tokio::spawn(write_loop(writer, rx));
        let mut calls = JoinSet::new();
        let mut lines = reader.lines();

        tracing::info!("MCP server ready ({} tools)", self.dispatcher.tools().len());
        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("MCP server shutting down");
                    break;
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                tracing::debug!("Client closed the input stream");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line, &tx, &mut calls).await {
                send(&tx, &response).await;
            }
            while calls.try_join_next().is_some() {}
        }

        while calls.join_next().await.is_some() {}
        drop(tx);
        writer_task.await.map_err(io::Error::other)?
    }

    /// Handle one input line. Returns the immediate response, if any;
    /// `tools/call` responds later from its own task.
    async fn handle_line(
        &self,
        line: &str,
        tx: &mpsc::Sender<String>,
        calls: &mut JoinSet<()>,
    ) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Unparseable request: {}", e);
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };
        let id_hint = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    id_hint,
                    INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ))
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                id_hint,
                INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            ));
        }

        let Some(id) = request.id.clone() else {
            self.handle_notification(&request).await;
            return None;
        };
        tracing::debug!("Handling {} (id {})", request.method, id);

        match request.method.as_str() {
            "initialize" => Some(JsonRpcResponse::success(id, self.initialize_result())),
            "ping" => Some(JsonRpcResponse::success(id, json!({}))),
            "tools/list" => Some(JsonRpcResponse::success(id, self.tools_list())),
            "tools/call" => match serde_json::from_value::<CallToolParams>(request.params) {
                Ok(params) => self.spawn_call(id, params, tx.clone(), calls).await,
                Err(e) => Some(JsonRpcResponse::error(
                    id,
                    INVALID_PARAMS,
                    format!("Invalid params: {}", e),
                )),
            },
            other => {
                tracing::warn!("Unknown method: {}", other);
                Some(JsonRpcResponse::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", other),
                ))
            }
        }
    }

    async fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => tracing::debug!("Client initialized"),
            "notifications/cancelled" => {
                let params: CancelledParams = match serde_json::from_value(request.params.clone()) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("Ignoring malformed cancellation: {}", e);
                        return;
                    }
                };
                let key = params.request_id.to_string();
                match self.in_flight.lock().await.get(&key) {
                    Some(call) => {
                        tracing::info!(
                            "Cancelling request {} ({})",
                            key,
                            params.reason.as_deref().unwrap_or("no reason given")
                        );
                        call.token.cancel();
                    }
                    None => tracing::debug!("Cancellation for unknown request {}", key),
                }
            }
            other => tracing::debug!("Ignoring notification {}", other),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {"listChanged": false}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "instructions": ToolRegistry::generate_prompt(self.dispatcher.tools()),
        })
    }

    fn tools_list(&self) -> Value {
        let tools: Vec<Value> = self
            .dispatcher
            .tools()
            .into_iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "description": d.description,
                    "inputSchema": d.input_schema(),
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    /// Start a `tools/call` task. An id that is already in flight is
    /// rejected and the running call keeps its cancellation entry.
    async fn spawn_call(
        &self,
        id: Value,
        params: CallToolParams,
        tx: mpsc::Sender<String>,
        calls: &mut JoinSet<()>,
    ) -> Option<JsonRpcResponse> {
        let key = id.to_string();
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();
        match self.in_flight.lock().await.entry(key.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!("Rejecting request {}: id already in flight", key);
                return Some(JsonRpcResponse::error(
                    id,
                    INVALID_REQUEST,
                    format!("Request id {} is already in flight", key),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(InFlightCall {
                    serial,
                    token: token.clone(),
                });
            }
        }
        let dispatcher = self.dispatcher.clone();
        let in_flight = self.in_flight.clone();

        calls.spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => None,
                result = call_tool(&dispatcher, params) => Some(result),
            };
            if let Entry::Occupied(entry) = in_flight.lock().await.entry(key.clone()) {
                if entry.get().serial == serial {
                    entry.remove();
                }
            }
            match result {
                Some(result) => send(&tx, &JsonRpcResponse::success(id, result)).await,
                None => tracing::debug!("Request {} cancelled, no response sent", key),
            }
        });
        None
    }
}

/// Run one tool and shape the outcome as a `tools/call` result. Tool errors
/// are results with `isError`, not JSON-RPC errors.
async fn call_tool(dispatcher: &Dispatcher, params: CallToolParams) -> Value {
    let request = InvocationRequest::new(params.name, params.arguments);
    let output = match dispatcher.dispatch(request).await {
        Ok(output) => output,
        Err(e) => return text_result(e.to_user_message(), true),
    };
    match output {
        ToolOutput::Stream(stream) => {
            let window = dispatcher.config().logs.follow_window;
            match stream.collect_for(window).await {
                Ok(lines) => text_result(lines.join("\n"), false),
                Err(e) => text_result(e.to_user_message(), true),
            }
        }
        other => match other.render() {
            Ok(text) => text_result(text.unwrap_or_default(), false),
            Err(e) => text_result(e.to_user_message(), true),
        },
    }
}

async fn send(tx: &mpsc::Sender<String>, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            if tx.send(line).await.is_err() {
                tracing::debug!("Writer closed, dropping response");
            }
        }
        Err(e) => tracing::error!("Failed to encode response: {}", e),
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
