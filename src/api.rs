//! JSON-RPC API for the Locked Output Service
//!
//! Two endpoints:
//! - POST /rpc - JSON-RPC 2.0 (`addLockedBitcoinRequest`, `getLockedBitcoinRequest`,
//!   `sendLockedBitcoinRequest`)
//! - GET /api/health - Health check
//!
//! RPC failures are reported in the response body with HTTP 200.

use axum::{
    body::Bytes,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::common::error::WalletError;
use crate::common::logging::{generate_correlation_id, log_api_call};
use crate::redemption::{LockedOutputService, ServiceError};
use crate::types::SpendAmount;

// =============================================================================
// Error Codes
// =============================================================================

/// JSON-RPC 2.0 error codes
pub mod rpc_code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

pub const ADD_LOCKED: &str = "addLockedBitcoinRequest";
pub const GET_LOCKED: &str = "getLockedBitcoinRequest";
pub const SEND_LOCKED: &str = "sendLockedBitcoinRequest";

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_params(detail: impl Into<String>) -> Self {
        Self {
            code: rpc_code::INVALID_PARAMS,
            message: "Invalid params".to_string(),
            data: Some(serde_json::json!({
                "code": "VALIDATION_ERROR",
                "retryable": false,
                "detail": detail.into(),
            })),
        }
    }

    /// Stable code string carried in `data`, if any
    fn data_code(&self) -> Option<&str> {
        self.data.as_ref()?.get("code")?.as_str()
    }
}

impl From<ServiceError> for RpcError {
    fn from(err: ServiceError) -> Self {
        let invalid = err.is_invalid_params();
        let code = err.code();
        let detail = err.to_string();
        let retryable = WalletError::from(err).is_retryable();

        let (rpc, message) = if invalid {
            (rpc_code::INVALID_PARAMS, "Invalid params".to_string())
        } else {
            (rpc_code::INTERNAL_ERROR, detail.clone())
        };

        Self {
            code: rpc,
            message,
            data: Some(serde_json::json!({
                "code": code,
                "retryable": retryable,
                "detail": detail,
            })),
        }
    }
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddLockedParams {
    address: String,
    script: String,
    #[serde(default)]
    account: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendLockedParams {
    from: String,
    to: String,
    #[serde(default)]
    amount: Option<u64>,
    #[serde(default)]
    account: Option<String>,
}

// =============================================================================
// Application State
// =============================================================================

pub type AppState = Arc<LockedOutputService>;

// =============================================================================
// API Handlers
// =============================================================================

/// POST /rpc
async fn handle_rpc(State(service): State<AppState>, body: Bytes) -> impl IntoResponse {
    let started = Instant::now();
    let correlation_id = generate_correlation_id();

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            log_api_call("<unparsed>", &correlation_id, elapsed_ms(started), Some("PARSE_ERROR"));
            let error = RpcError::new(rpc_code::PARSE_ERROR, format!("Parse error: {}", e));
            return Json(RpcResponse::failure(Value::Null, error));
        }
    };

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request = match serde_json::from_value::<RpcRequest>(value) {
        Ok(request) if request.jsonrpc == "2.0" => request,
        _ => {
            log_api_call("<invalid>", &correlation_id, elapsed_ms(started), Some("INVALID_REQUEST"));
            let error = RpcError::new(rpc_code::INVALID_REQUEST, "Invalid Request");
            return Json(RpcResponse::failure(id, error));
        }
    };

    let outcome = dispatch(&service, &request.method, request.params).await;
    let response = match outcome {
        Ok(result) => {
            log_api_call(&request.method, &correlation_id, elapsed_ms(started), None);
            RpcResponse::success(request.id, result)
        }
        Err(error) => {
            let code = error
                .data_code()
                .map(str::to_string)
                .unwrap_or_else(|| error.code.to_string());
            log_api_call(&request.method, &correlation_id, elapsed_ms(started), Some(&code));
            RpcResponse::failure(request.id, error)
        }
    };

    Json(response)
}

async fn dispatch(service: &LockedOutputService, method: &str, params: Value) -> Result<Value, RpcError> {
    match method {
        ADD_LOCKED => {
            let p: AddLockedParams =
                serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))?;
            service
                .register(&p.address, &p.script, p.account.as_deref())
                .await?;
            Ok(Value::Bool(true))
        }
        GET_LOCKED => {
            let account = account_param(&params)?;
            let outputs = service.list(account.as_deref()).await?;
            serde_json::to_value(outputs).map_err(|e| RpcError::new(rpc_code::INTERNAL_ERROR, e.to_string()))
        }
        SEND_LOCKED => {
            let p: SendLockedParams =
                serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))?;
            let receipt = service
                .spend(&p.from, &p.to, SpendAmount::from_option(p.amount), p.account.as_deref())
                .await?;
            Ok(Value::String(receipt.txid.to_string()))
        }
        other => Err(RpcError::new(
            rpc_code::METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        )),
    }
}

/// `getLockedBitcoinRequest` takes the account as a bare string, `{account}`, or nothing
fn account_param(params: &Value) -> Result<Option<String>, RpcError> {
    match params {
        Value::Null => Ok(None),
        Value::String(account) => Ok(Some(account.clone())),
        Value::Array(items) if items.is_empty() => Ok(None),
        Value::Array(items) => match &items[0] {
            Value::String(account) if items.len() == 1 => Ok(Some(account.clone())),
            _ => Err(RpcError::invalid_params("expected a single account string")),
        },
        Value::Object(map) => match map.get("account") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(account)) => Ok(Some(account.clone())),
            Some(_) => Err(RpcError::invalid_params("account must be a string")),
        },
        _ => Err(RpcError::invalid_params("account must be a string")),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// GET /api/health
async fn handle_health(State(service): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cltv-wallet",
        "network": service.network().to_string(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// =============================================================================
// Router Setup
// =============================================================================

/// Create the API router with all endpoints
pub fn create_router(service: LockedOutputService) -> Router {
    let state: AppState = Arc::new(service);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(service: LockedOutputService, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(service);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    println!("=== CLTV Wallet API ===");
    println!("Listening on http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  POST /rpc         - JSON-RPC ({}, {}, {})", ADD_LOCKED, GET_LOCKED, SEND_LOCKED);
    println!("  GET  /api/health  - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

// =============================================================================
// Tests
// =============================================================================
