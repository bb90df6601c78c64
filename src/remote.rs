//! Remote MCP collaborator boundary
//!
//! The document-management service is reached over Smithery's streamable
//! HTTP transport speaking JSON-RPC 2.0. The core only depends on the
//! [`RemoteToolClient`] trait: one handshake that yields the available
//! tool set, and one `invoke` call per tool use. Connection lifecycle
//! (retry, circuit breaking) lives in [`crate::resilience`], not here.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "toolchat";

/// Remote call errors, classified for the retry loop
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error("MCP 서버 연결 타임아웃")]
    Timeout,

    #[error("MCP 서버 연결 실패: {0}")]
    Refused(String),

    #[error("MCP 리소스를 찾을 수 없습니다: {0}")]
    NotFound(String),

    #[error("MCP 서버 접근 권한이 없습니다: {0}")]
    PermissionDenied(String),

    #[error("MCP 프로토콜 오류: {0}")]
    Protocol(String),

    #[error("예상치 못한 MCP 오류: {0}")]
    Other(String),
}

impl RemoteError {
    /// Whether the connect loop should keep retrying after this error.
    /// Missing resources and permission problems never fix themselves.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::PermissionDenied(_))
    }

    /// Connectivity-class errors trigger an immediate reconnect attempt
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Timeout | Self::Refused(_))
    }
}

/// A tool advertised by the remote service during the handshake
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Capability boundary of the remote document service
#[async_trait]
pub trait RemoteToolClient: Send + Sync {
    /// One-time handshake; returns the advertised tool set
    async fn handshake(&self) -> Result<Vec<RemoteToolInfo>, RemoteError>;

    /// Invoke a remote tool by name
    async fn invoke(&self, tool: &str, params: Value) -> Result<Value, RemoteError>;
}

/// JSON-RPC client for a Smithery-hosted MCP server
pub struct SmitheryClient {
    http: Client,
    endpoint: String,
    request_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl SmitheryClient {
    /// Build a client from configuration. Fails when credentials are
    /// missing; callers treat that as "run on local tools only".
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("SMITHERY_API_KEY is not set"))?;
        let profile = config
            .profile
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("SMITHERY_PROFILE is not set"))?;

        let http = Client::builder()
            .timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: Self::endpoint_url(&config.mcp_url, api_key, profile),
            request_id: AtomicU64::new(1),
        })
    }

    fn endpoint_url(base: &str, api_key: &str, profile: &str) -> String {
        format!("{base}?api_key={api_key}&profile={profile}")
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, "sending MCP request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&frame)
            .send()
            .await
            .map_err(classify_transport_error)?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(RemoteError::NotFound(status_with_body(response).await))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(RemoteError::PermissionDenied(
                    status_with_body(response).await,
                ))
            }
            s => return Err(RemoteError::Other(format!("HTTP {s}"))),
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(RemoteError::Protocol(format!(
                "{} (code {})",
                err.message, err.code
            )));
        }

        body.result
            .ok_or_else(|| RemoteError::Protocol("missing result".to_string()))
    }
}

fn classify_transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else if e.is_connect() {
        RemoteError::Refused(e.to_string())
    } else {
        RemoteError::Other(e.to_string())
    }
}

async fn status_with_body(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.is_empty() => format!("{status}: {body}"),
        _ => status.to_string(),
    }
}

#[async_trait]
impl RemoteToolClient for SmitheryClient {
    async fn handshake(&self) -> Result<Vec<RemoteToolInfo>, RemoteError> {
        self.rpc(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": CLIENT_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
        .await?;

        let listing = self.rpc("tools/list", json!({})).await?;

        let tools = listing
            .get("tools")
            .and_then(Value::as_array)
            .map(|tools| {
                tools
                    .iter()
                    .filter_map(|t| serde_json::from_value(t.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(tools)
    }

    async fn invoke(&self, tool: &str, params: Value) -> Result<Value, RemoteError> {
        self.rpc(
            "tools/call",
            json!({
                "name": tool,
                "arguments": params,
            }),
        )
        .await
    }
}
