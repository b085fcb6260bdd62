//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! line-delimited JSON-RPC method calls to the command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use colla_oracle::OracleError;
use colla_rewards::RewardError;

use crate::commands;
use crate::engine::EngineError;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    /// Error code.
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: "INVALID_PARAMS".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self {
            code: -32603,
            message: "INTERNAL_ERROR".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Caller lacks the required role (-32010).
    pub fn unauthorized(detail: &str) -> Self {
        Self::domain(-32010, "UNAUTHORIZED", detail)
    }

    fn domain(code: i32, message: &str, detail: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }
}

// Oracle errors: -32020..=-32029. Reward errors: -32030..=-32039.
impl From<OracleError> for RpcError {
    fn from(e: OracleError) -> Self {
        let detail = e.to_string();
        let (code, name) = match e {
            OracleError::InvalidTimeRange { .. } => (-32020, "INVALID_TIME_RANGE"),
            OracleError::FeedNotFound { .. } | OracleError::OwnershipNotFound { .. } => {
                (-32021, "NOT_FOUND")
            }
            OracleError::NoDataInRange { .. } => (-32022, "NO_DATA_IN_RANGE"),
            OracleError::FeedTargetOutdated { .. } => (-32023, "FEED_TARGET_OUTDATED"),
            OracleError::ProofRejected { .. } => (-32024, "PROOF_REJECTED"),
            OracleError::StateRootTimeout { .. } => (-32025, "STATE_ROOT_TIMEOUT"),
            OracleError::Overflow => return RpcError::internal_error(&detail),
            _ => (-32029, "INVALID_FEED"),
        };
        RpcError::domain(code, name, &detail)
    }
}

impl From<RewardError> for RpcError {
    fn from(e: RewardError) -> Self {
        let detail = e.to_string();
        let (code, name) = match e {
            RewardError::Oracle(inner) => return inner.into(),
            RewardError::Unauthorized { .. } => return RpcError::unauthorized(&detail),
            RewardError::InvalidEpoch(_)
            | RewardError::EpochNotSequential { .. }
            | RewardError::EpochOrder { .. }
            | RewardError::InvalidEpochRange { .. } => (-32030, "INVALID_EPOCH"),
            RewardError::EpochAlreadyFinalized { .. } => (-32031, "EPOCH_ALREADY_FINALIZED"),
            RewardError::NoRewards => (-32032, "NO_REWARDS"),
            RewardError::InvalidCommission(_) => (-32033, "INVALID_COMMISSION"),
            RewardError::NotATarget { .. } => (-32034, "NOT_A_TARGET"),
            RewardError::NoDefaultRecipient { .. } => (-32035, "NO_DEFAULT_RECIPIENT"),
            RewardError::Transfer(_) | RewardError::Mint(_) => (-32036, "SETTLEMENT_FAILED"),
            RewardError::Overflow => return RpcError::internal_error(&detail),
        };
        RpcError::domain(code, name, &detail)
    }
}

impl From<EngineError> for RpcError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Oracle(inner) => inner.into(),
            EngineError::Reward(inner) => inner.into(),
            EngineError::NotFeeder(caller) => {
                RpcError::unauthorized(&format!("caller {caller} is not a feeder"))
            }
            EngineError::Db(inner) => {
                error!("storage failure: {inner}");
                RpcError::internal_error(&format!("db error: {inner}"))
            }
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch_request(&state, request).await,
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub async fn dispatch_request(state: &Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }
    let method = request.method.as_str();
    let params = &request.params;

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Oracle writes
        "store_feed_data" => commands::oracle::store_feed_data(state, params).await,
        "submit_state_root" => commands::oracle::submit_state_root(state, params).await,
        "ingest_feeds" => commands::oracle::ingest_feeds(state, params).await,

        // Oracle reads
        "get_validator" => commands::oracle::get_validator(state, params).await,
        "get_collateral_ownership" => {
            commands::oracle::get_collateral_ownership(state, params).await
        }
        "get_ownership_twab" => commands::oracle::get_ownership_twab(state, params).await,
        "get_ownerships_twab" => commands::oracle::get_ownerships_twab(state, params).await,
        "get_total_twab" => commands::oracle::get_total_twab(state, params).await,
        "get_historical_owners" => commands::oracle::get_historical_owners(state, params).await,
        "get_last_feed_timestamp" => {
            commands::oracle::get_last_feed_timestamp(state, params).await
        }
        "get_validators" => commands::oracle::get_validators(state).await,

        // Rewards
        "get_current_epoch" => commands::rewards::get_current_epoch(state).await,
        "deposit_rewards" => commands::rewards::deposit_rewards(state, params).await,
        "finalize_epoch" => commands::rewards::finalize_epoch(state, params).await,
        "get_epoch_reward" => commands::rewards::get_epoch_reward(state, params).await,
        "set_distribution_config" => {
            commands::rewards::set_distribution_config(state, params).await
        }
        "get_distribution_config" => {
            commands::rewards::get_distribution_config(state, params).await
        }
        "claim_rewards" => commands::rewards::claim_rewards(state, params).await,
        "claim_for_non_targets" => commands::rewards::claim_for_non_targets(state, params).await,
        "get_claimable_rewards" => commands::rewards::get_claimable_rewards(state, params).await,
        "get_balance" => commands::rewards::get_balance(state, params).await,

        // Event log
        "get_events" => commands::events::get_events(state, params).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(e) => RpcResponse::error(id, e),
    }
}
