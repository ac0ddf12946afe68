//! Host Server
//!
//! JSON-RPC 2.0 over stdio, for integration platforms that drive kvlookup as a
//! long-lived child process.
//!
//! # Protocol
//! - Each request is a single line of JSON
//! - Each response is a single line of JSON
//! - Errors are returned as JSON-RPC error responses
//!
//! # Methods
//! - `initialize` - server name, version and method list
//! - `lookup` - `{"entities": [{"value": "...", "type": "..."}], "options": {...}}`
//! - `validate` - `{"options": {...}}`, returns the list of `{key, message}` problems
//! - `shutdown` - close the store connection and stop serving
//!
//! The server keeps one [`Lookup`] for its whole lifetime, so consecutive
//! `lookup` calls with the same connection options share one connection.
//!
//! Start it with: `kvlookup serve`

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::error::LookupError;
use crate::lookup::{BatchOutcome, Entity, Lookup};
use crate::options::{validate_options, RawOptions};
use crate::output::{ErrorInfo, Metadata};
use crate::store::redis::RespConnector;
use crate::store::StoreConnector;

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
const LOOKUP_ERROR: i32 = -32000;

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn new(id: Option<Value>, outcome: std::result::Result<Value, JsonRpcError>) -> Self {
        match outcome {
            Ok(value) => Self { jsonrpc: "2.0", id, result: Some(value), error: None },
            Err(error) => Self { jsonrpc: "2.0", id, result: None, error: Some(error) },
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    fn invalid_params(message: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {message}"))
    }

    /// Invalid input maps to "invalid params"; everything else is a lookup error
    fn from_lookup_error(err: &LookupError) -> Self {
        let code = match err {
            LookupError::InvalidInput(_) => INVALID_PARAMS,
            _ => LOOKUP_ERROR,
        };
        Self {
            code,
            message: err.message(),
            data: Some(serde_json::json!({ "code": err.error_code() })),
        }
    }
}

// ============================================================================
// Method Parameters and Results
// ============================================================================

#[derive(Debug, Deserialize)]
struct LookupParams {
    entities: Vec<Entity>,
    #[serde(default)]
    options: RawOptions,
}

#[derive(Debug, Deserialize)]
struct ValidateParams {
    #[serde(default)]
    options: RawOptions,
}

#[derive(Debug, Serialize)]
struct LookupResponse<'a> {
    #[serde(flatten)]
    batch: &'a BatchOutcome,
    meta: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Option<Value>) -> std::result::Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
    serde_json::from_value(params).map_err(JsonRpcError::invalid_params)
}

fn to_result(value: impl Serialize) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
}

// ============================================================================
// Server
// ============================================================================

/// Request dispatcher holding the long-lived [`Lookup`]
pub struct HostServer<C: StoreConnector> {
    lookup: Lookup<C>,
    shutting_down: bool,
}

impl<C: StoreConnector> HostServer<C> {
    pub const fn new(connector: C) -> Self {
        Self { lookup: Lookup::new(connector), shutting_down: false }
    }

    /// Whether a `shutdown` request has been handled
    #[must_use]
    pub const fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    #[must_use]
    pub const fn lookup(&self) -> &Lookup<C> {
        &self.lookup
    }

    /// Handle one line of input, returning the response line
    ///
    /// Blank lines produce no response.
    ///
    /// # Errors
    ///
    /// Returns an error only if the response cannot be serialized.
    pub async fn handle_line(&mut self, line: &str) -> Result<Option<String>> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => {
                debug!(method = %request.method, "Host request");
                let outcome = self.dispatch(&request.method, request.params).await;
                JsonRpcResponse::new(request.id, outcome)
            }
            Err(e) => JsonRpcResponse::new(None, Err(JsonRpcError::new(PARSE_ERROR, format!("Parse error: {e}")))),
        };

        Ok(Some(serde_json::to_string(&response)?))
    }

    async fn dispatch(&mut self, method: &str, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        match method {
            "initialize" => Ok(handle_initialize()),
            "lookup" => self.handle_lookup(params).await,
            "validate" => handle_validate(params),
            "shutdown" => {
                self.close().await;
                self.shutting_down = true;
                Ok(Value::Null)
            }
            _ => Err(JsonRpcError::new(METHOD_NOT_FOUND, format!("Unknown method: {method}"))),
        }
    }

    async fn handle_lookup(&mut self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: LookupParams = parse_params(params)?;
        let options = params.options.into_options().map_err(|e| JsonRpcError::from_lookup_error(&e))?;

        let start = Instant::now();
        let batch = self
            .lookup
            .lookup_all(&params.entities, &options)
            .await
            .map_err(|e| JsonRpcError::from_lookup_error(&e))?;
        let execution_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        to_result(LookupResponse {
            batch: &batch,
            meta: Metadata::for_batch(execution_ms, params.entities.len(), batch.hits(), batch.failures.len()),
            error: batch.error().map(|e| ErrorInfo::new(e.error_code(), e.message())),
        })
    }

    /// Close the store connection
    pub async fn close(&mut self) {
        self.lookup.shutdown().await;
    }
}

fn handle_initialize() -> Value {
    serde_json::json!({
        "serverInfo": {
            "name": "kvlookup",
            "version": env!("CARGO_PKG_VERSION")
        },
        "methods": ["initialize", "lookup", "validate", "shutdown"]
    })
}

fn handle_validate(params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
    let params: ValidateParams = parse_params(params)?;
    to_result(validate_options(&params.options))
}

/// Start the host server on stdio
///
/// Reads requests until stdin closes or `shutdown` is received, then closes
/// the store connection.
///
/// # Errors
///
/// Returns an error if stdio communication fails.
pub async fn serve() -> Result<()> {
    let mut server = HostServer::new(RespConnector::new());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("Host server started");
    while let Some(line) = lines.next_line().await? {
        if let Some(response) = server.handle_line(&line).await? {
            stdout.write_all(response.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        if server.is_shutting_down() {
            break;
        }
    }

    server.close().await;
    info!("Host server stopped");
    Ok(())
}
