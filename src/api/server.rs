//! API Server Module
//!
//! This module implements the admin JSON-RPC endpoint of the batcher.
//! Operators use it to inspect queued sectors and to force a batch out
//! without waiting for the timer.
//!
//! # Methods
//! - `sectorPreCommitPending`: sectors waiting for pre-commit
//! - `sectorPreCommitFlush`: send pending sectors now, returning the results

use crate::{batch::PreCommitBatcher, config::ApiConfig, BatcherError};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    batcher: Arc<PreCommitBatcher>,
    /// Cancelled on server shutdown; in-flight flushes are released with it.
    shutdown: CancellationToken,
}

/// The admin API server
pub struct Server {
    config: ApiConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: ApiConfig, batcher: Arc<PreCommitBatcher>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            state: AppState { batcher, shutdown },
        }
    }

    /// Router with a single POST endpoint at "/".
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(handle_rpc))
            .with_state(self.state.clone())
    }

    /// Serve until the shutdown token is cancelled.
    pub async fn start(self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }
}

/// JSON-RPC 2.0 request structure
///
/// Neither method takes params, so only the method name and id are read.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    method: String,
    id: Value,
}

/// JSON-RPC 2.0 response structure
///
/// Either `result` or `error` is populated, never both.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

const METHOD_NOT_FOUND: i32 = -32601;
const INTERNAL_ERROR: i32 = -32603;
/// The request was abandoned (caller shutdown or batcher stopped), not failed.
const REQUEST_CANCELLED: i32 = -32800;

impl JsonRpcResponse {
    fn from_result<T: Serialize>(id: Value, res: Result<T, BatcherError>) -> Self {
        match res.and_then(|v| {
            serde_json::to_value(v).map_err(|e| BatcherError::Encoding(e.to_string()))
        }) {
            Ok(result) => Self {
                jsonrpc: "2.0".to_string(),
                result: Some(result),
                error: None,
                id,
            },
            Err(e) if e.is_caller_local() => {
                info!("RPC request abandoned: {}", e);
                Self::error(id, REQUEST_CANCELLED, e.to_string())
            }
            Err(e) => {
                warn!("RPC request failed: {}", e);
                Self::error(id, INTERNAL_ERROR, e.to_string())
            }
        }
    }

    fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

async fn handle_rpc(
    State(state): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    info!("Received RPC request: {}", request.method);

    let ctx = state.shutdown.child_token();
    let response = match request.method.as_str() {
        "sectorPreCommitPending" => {
            JsonRpcResponse::from_result(request.id, state.batcher.pending(&ctx).await)
        }
        "sectorPreCommitFlush" => {
            JsonRpcResponse::from_result(request.id, state.batcher.flush(&ctx).await)
        }
        _ => JsonRpcResponse::error(request.id, METHOD_NOT_FOUND, "Method not found".to_string()),
    };

    Json(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        batch::BatchEngine,
        chain::MemoryChain,
        config::{FeeConfig, SealingConfig, SharedConfig},
        Address, MinerInfo,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn server(miner: &str) -> Server {
        server_with_batcher(miner).0
    }

    fn server_with_batcher(miner: &str) -> (Server, Arc<PreCommitBatcher>) {
        let chain = MemoryChain::new(MinerInfo {
            owner: Address::new("f0100"),
            worker: Address::new("f0101"),
            control_addresses: vec![],
        });
        let engine = BatchEngine::new(
            Address::new(miner),
            Arc::new(chain.clone()),
            Arc::new(chain),
            FeeConfig::default(),
        );
        let batcher = PreCommitBatcher::start(
            engine,
            Arc::new(SharedConfig::new(SealingConfig::default())),
            Duration::from_secs(30),
        )
        .unwrap();
        let batcher = Arc::new(batcher);

        let server = Server::new(
            ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            batcher.clone(),
            CancellationToken::new(),
        );
        (server, batcher)
    }

    async fn call(server: &Server, method: &str) -> Value {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": [],
            "id": 1,
        });
        let response = server
            .router()
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_pending_and_flush_on_empty_batcher() {
        let server = server("f01000");

        let pending = call(&server, "sectorPreCommitPending").await;
        assert_eq!(pending["result"], serde_json::json!([]));
        assert_eq!(pending["id"], 1);

        let flushed = call(&server, "sectorPreCommitFlush").await;
        assert_eq!(flushed["result"], serde_json::json!([]));
        assert!(flushed.get("error").is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = server("f01000");
        let response = call(&server, "sendTransaction").await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn test_pending_needs_id_address() {
        let server = server("f3notanid");
        let response = call(&server, "sectorPreCommitPending").await;
        assert_eq!(response["error"]["code"], INTERNAL_ERROR);
        assert_eq!(
            response["error"]["message"],
            "address f3notanid is not an ID address"
        );
    }

    #[tokio::test]
    async fn test_flush_after_stop_reports_cancelled() {
        let (server, batcher) = server_with_batcher("f01000");
        batcher.stop(&CancellationToken::new()).await.unwrap();

        let response = call(&server, "sectorPreCommitFlush").await;
        assert_eq!(response["error"]["code"], REQUEST_CANCELLED);
        assert_eq!(response["error"]["message"], "batcher stopped");
    }
}
