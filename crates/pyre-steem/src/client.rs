//! Steem condenser_api JSON-RPC client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{Account, BroadcastResult, DynamicGlobalProperties, SignedTransaction, SteemError};

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// JSON-RPC client for Steem nodes.
///
/// Holds no endpoint of its own; every call names the node it talks to so
/// the caller can fail over between nodes.
pub struct SteemRpc {
    http: Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl SteemRpc {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let http = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the chain head used for transaction references.
    pub async fn dynamic_global_properties(
        &self,
        endpoint: &str,
    ) -> Result<DynamicGlobalProperties, SteemError> {
        self.call(
            endpoint,
            "condenser_api.get_dynamic_global_properties",
            serde_json::json!([]),
        )
        .await
    }

    /// Look up accounts by name. Unknown names are simply absent.
    pub async fn get_accounts(
        &self,
        endpoint: &str,
        names: &[&str],
    ) -> Result<Vec<Account>, SteemError> {
        self.call(endpoint, "condenser_api.get_accounts", serde_json::json!([names]))
            .await
    }

    /// Broadcast a signed transaction and wait for block inclusion.
    pub async fn broadcast_transaction_synchronous(
        &self,
        endpoint: &str,
        transaction: &SignedTransaction,
    ) -> Result<BroadcastResult, SteemError> {
        self.call(
            endpoint,
            "condenser_api.broadcast_transaction_synchronous",
            serde_json::json!([transaction]),
        )
        .await
    }

    async fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: &str,
        params: P,
    ) -> Result<T, SteemError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(endpoint, method, id, "rpc call");

        let response = self
            .http
            .post(endpoint)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            warn!(endpoint, method, ?retry_after_secs, "rate limited by node");
            return Err(SteemError::RateLimited { retry_after_secs });
        }

        let text = response.text().await.map_err(|e| {
            SteemError::InvalidResponse(format!(
                "{} failed ({}): failed to read response: {}",
                method, status, e
            ))
        })?;

        // Nodes report RPC errors with either 200 or 5xx; check the body first.
        if let Ok(parsed) = serde_json::from_str::<RpcResponse<T>>(&text) {
            if let Some(error) = parsed.error {
                return Err(SteemError::Rpc {
                    code: error.code,
                    message: error.message,
                });
            }
            if status.is_success() {
                return parsed.result.ok_or_else(|| {
                    SteemError::InvalidResponse(format!("{} returned no result", method))
                });
            }
        }

        if !status.is_success() {
            return Err(SteemError::InvalidResponse(format!(
                "{} failed ({}): {}",
                method, status, text
            )));
        }

        let parsed: RpcResponse<T> = serde_json::from_str(&text)?;
        parsed
            .result
            .ok_or_else(|| SteemError::InvalidResponse(format!("{} returned no result", method)))
    }
}
