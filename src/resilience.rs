//! Connection resilience
//!
//! Owns the remote connection state machine: retry with exponential
//! backoff on connect, a consecutive-failure circuit breaker with timed
//! auto-reset, and the guarded-call policy that keeps remote failures
//! from ever reaching the orchestrator as raw errors.
//!
//! All `ConnectionState` fields change together under one mutex; the
//! circuit-breaker invariant (`circuit_open` implies `circuit_opened_at`
//! set) would not survive partial updates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::remote::{RemoteError, RemoteToolClient};
use crate::tools::ToolRegistry;

/// Knobs for the connection state machine
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub connect_timeout: Duration,
    pub circuit_threshold: u32,
    pub circuit_cooldown: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            circuit_threshold: 5,
            circuit_cooldown: Duration::from_secs(300),
        }
    }
}

impl ResilienceConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
            connect_timeout: config.connect_timeout,
            circuit_threshold: config.circuit_threshold,
            circuit_cooldown: config.circuit_cooldown,
        }
    }
}

/// Derived connection phase for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    CircuitOpen,
}

/// Point-in-time snapshot of the connection state
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub phase: ConnectionPhase,
    pub connected: bool,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub circuit_open: bool,
    pub circuit_opened_at: Option<DateTime<Utc>>,
}

/// Mutable connection state, only ever touched under the manager's mutex
struct ConnState {
    connected: bool,
    connecting: bool,
    last_error: Option<String>,
    last_error_time: Option<DateTime<Utc>>,
    consecutive_errors: u32,
    circuit_open: bool,
    /// Monotonic clock driving the cooldown check
    circuit_opened_at: Option<Instant>,
    /// Wall clock mirror of `circuit_opened_at` for status reporting
    circuit_opened_time: Option<DateTime<Utc>>,
}

impl ConnState {
    fn new() -> Self {
        Self {
            connected: false,
            connecting: false,
            last_error: None,
            last_error_time: None,
            consecutive_errors: 0,
            circuit_open: false,
            circuit_opened_at: None,
            circuit_opened_time: None,
        }
    }

    fn phase(&self) -> ConnectionPhase {
        if self.circuit_open {
            ConnectionPhase::CircuitOpen
        } else if self.connected {
            ConnectionPhase::Connected
        } else if self.connecting {
            ConnectionPhase::Connecting
        } else {
            ConnectionPhase::Disconnected
        }
    }
}

/// Resilience controller for the remote tool connection
///
/// Created disconnected; lives for the process lifetime. Without a
/// client (missing credentials) every connect attempt short-circuits and
/// the agent degrades to local tools.
pub struct ConnectionManager {
    client: Option<Arc<dyn RemoteToolClient>>,
    registry: Arc<ToolRegistry>,
    config: ResilienceConfig,
    state: Mutex<ConnState>,
}

impl ConnectionManager {
    pub fn new(
        client: Option<Arc<dyn RemoteToolClient>>,
        registry: Arc<ToolRegistry>,
        config: ResilienceConfig,
    ) -> Self {
        Self {
            client,
            registry,
            config,
            state: Mutex::new(ConnState::new()),
        }
    }

    /// Attempt the handshake, retrying with exponential backoff.
    ///
    /// Not-found and permission errors abort immediately; everything
    /// else retries until the budget is exhausted. Returns whether the
    /// connection is up afterwards.
    pub async fn connect(&self) -> bool {
        let Some(client) = self.client.clone() else {
            let mut s = self.state.lock().await;
            s.connected = false;
            s.last_error = Some("Smithery API 키 또는 프로필이 설정되지 않았습니다".to_string());
            warn!("remote credentials missing, skipping connection");
            return false;
        };

        {
            let mut s = self.state.lock().await;
            s.connecting = true;
        }

        let mut delay = self.config.backoff_base;
        let mut last_error: Option<RemoteError> = None;

        for attempt in 1..=self.config.max_retries {
            info!(attempt, max = self.config.max_retries, "connecting to remote tool service");

            match tokio::time::timeout(self.config.connect_timeout, client.handshake()).await {
                Ok(Ok(tools)) => {
                    self.registry.register_remote(&tools);
                    let mut s = self.state.lock().await;
                    s.connected = true;
                    s.connecting = false;
                    s.consecutive_errors = 0;
                    s.last_error = None;
                    s.last_error_time = None;
                    info!(tool_count = tools.len(), "remote tool service connected");
                    return true;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, attempt, "handshake failed");
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
                Err(_) => {
                    warn!(attempt, timeout = ?self.config.connect_timeout, "handshake timed out");
                    last_error = Some(RemoteError::Timeout);
                }
            }

            if attempt < self.config.max_retries {
                debug!(delay = ?delay, "backing off before retry");
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, self.config.backoff_cap);
            }
        }

        self.registry.clear_remote();
        let mut s = self.state.lock().await;
        s.connected = false;
        s.connecting = false;
        s.last_error = Some(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "모든 연결 시도가 실패했습니다".to_string()),
        );
        s.last_error_time = Some(Utc::now());
        error!("remote tool service unreachable, local tools only");
        false
    }

    /// Drop the current connection and run the full connect loop again
    pub async fn reconnect(&self) -> bool {
        info!("reconnect requested");
        {
            let mut s = self.state.lock().await;
            s.connected = false;
        }
        self.registry.clear_remote();
        self.connect().await
    }

    /// Run a remote operation under the circuit/connection policy.
    ///
    /// `None` means declined: circuit open, not connected, or the
    /// operation failed (the failure is routed to [`Self::report_error`]
    /// and only its description is retained, in `last_error`).
    pub async fn guarded_call<T, F, Fut>(&self, op: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        {
            let mut s = self.state.lock().await;
            if s.circuit_open {
                let cooled_down = s
                    .circuit_opened_at
                    .map(|opened| opened.elapsed() >= self.config.circuit_cooldown)
                    .unwrap_or(false);
                if !cooled_down {
                    warn!("circuit breaker open, remote call skipped");
                    return None;
                }
                s.circuit_open = false;
                s.circuit_opened_at = None;
                s.circuit_opened_time = None;
                s.consecutive_errors = 0;
                info!("circuit breaker auto-reset after cooldown");
            }

            if !s.connected {
                warn!("remote tool service not connected, call skipped");
                return None;
            }
        }

        match op().await {
            Ok(value) => {
                let mut s = self.state.lock().await;
                s.consecutive_errors = 0;
                Some(value)
            }
            Err(e) => {
                self.report_error(&e).await;
                None
            }
        }
    }

    /// Invoke a remote tool through the guarded-call policy
    pub async fn invoke_remote(&self, tool: &str, params: serde_json::Value) -> Option<serde_json::Value> {
        let client = self.client.clone()?;
        let tool = tool.to_string();
        self.guarded_call(move || async move { client.invoke(&tool, params).await })
            .await
    }

    /// Record a remote failure and apply the breaker policy.
    ///
    /// Connectivity-class errors trigger one immediate reconnect attempt
    /// while the circuit is still closed; a successful reconnect resets
    /// the consecutive-error count. The connection is marked down and
    /// the error recorded regardless of the reconnect outcome.
    pub async fn report_error(&self, err: &RemoteError) {
        error!(error = %err, "remote tool error");

        let should_reconnect = {
            let mut s = self.state.lock().await;
            s.consecutive_errors += 1;
            s.last_error_time = Some(Utc::now());

            if s.consecutive_errors >= self.config.circuit_threshold && !s.circuit_open {
                s.circuit_open = true;
                s.circuit_opened_at = Some(Instant::now());
                s.circuit_opened_time = Some(Utc::now());
                warn!(
                    consecutive_errors = s.consecutive_errors,
                    cooldown = ?self.config.circuit_cooldown,
                    "circuit breaker opened"
                );
            }

            !s.circuit_open && err.is_connectivity()
        };

        if should_reconnect {
            info!("connectivity error, attempting immediate reconnect");
            self.connect().await;
        }

        let mut s = self.state.lock().await;
        s.connected = false;
        s.last_error = Some(err.to_string());
        drop(s);
        self.registry.clear_remote();
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// Snapshot for health reporting
    pub async fn status(&self) -> ConnectionStatus {
        let s = self.state.lock().await;
        ConnectionStatus {
            phase: s.phase(),
            connected: s.connected,
            last_error: s.last_error.clone(),
            last_error_time: s.last_error_time,
            consecutive_errors: s.consecutive_errors,
            circuit_open: s.circuit_open,
            circuit_opened_at: s.circuit_opened_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::remote::RemoteToolInfo;

    /// Scripted remote endpoint: fails the first `fail_handshakes`
    /// handshakes with the given error, then succeeds.
    struct ScriptedClient {
        fail_handshakes: u32,
        handshake_error: RemoteError,
        handshakes: AtomicU32,
        invokes: AtomicU32,
        invoke_error: Option<RemoteError>,
    }

    impl ScriptedClient {
        fn healthy() -> Self {
            Self::failing_first(0, RemoteError::Timeout)
        }

        fn failing_first(n: u32, error: RemoteError) -> Self {
            Self {
                fail_handshakes: n,
                handshake_error: error,
                handshakes: AtomicU32::new(0),
                invokes: AtomicU32::new(0),
                invoke_error: None,
            }
        }

        fn with_invoke_error(mut self, error: RemoteError) -> Self {
            self.invoke_error = Some(error);
            self
        }
    }

    #[async_trait]
    impl RemoteToolClient for ScriptedClient {
        async fn handshake(&self) -> Result<Vec<RemoteToolInfo>, RemoteError> {
            let n = self.handshakes.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_handshakes {
                Err(self.handshake_error.clone())
            } else {
                Ok(vec![RemoteToolInfo {
                    name: "search".into(),
                    description: "Search Notion pages".into(),
                }])
            }
        }

        async fn invoke(&self, _tool: &str, _params: Value) -> Result<Value, RemoteError> {
            self.invokes.fetch_add(1, Ordering::SeqCst);
            match &self.invoke_error {
                Some(e) => Err(e.clone()),
                None => Ok(json!({"content": []})),
            }
        }
    }

    fn manager(client: Arc<ScriptedClient>) -> ConnectionManager {
        ConnectionManager::new(
            Some(client),
            Arc::new(ToolRegistry::new()),
            ResilienceConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success_first_attempt() {
        let client = Arc::new(ScriptedClient::healthy());
        let manager = manager(client.clone());

        assert!(manager.connect().await);
        assert!(manager.is_connected().await);
        assert_eq!(client.handshakes.load(Ordering::SeqCst), 1);

        let status = manager.status().await;
        assert_eq!(status.phase, ConnectionPhase::Connected);
        assert!(status.last_error.is_none());
        assert_eq!(status.consecutive_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_with_backoff() {
        let client = Arc::new(ScriptedClient::failing_first(
            2,
            RemoteError::Refused("connection refused".into()),
        ));
        let manager = manager(client.clone());

        let started = Instant::now();
        assert!(manager.connect().await);

        // Backoff sequence between the three attempts is 2s then 4s.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert_eq!(client.handshakes.load(Ordering::SeqCst), 3);
        assert!(manager.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_exhausts_retry_budget() {
        let client = Arc::new(ScriptedClient::failing_first(
            10,
            RemoteError::Refused("connection refused".into()),
        ));
        let manager = manager(client.clone());

        assert!(!manager.connect().await);
        assert_eq!(client.handshakes.load(Ordering::SeqCst), 3);

        let status = manager.status().await;
        assert_eq!(status.phase, ConnectionPhase::Disconnected);
        assert!(status.last_error.unwrap().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_aborts_on_not_found() {
        let client = Arc::new(ScriptedClient::failing_first(
            10,
            RemoteError::NotFound("no such server".into()),
        ));
        let manager = manager(client.clone());

        let started = Instant::now();
        assert!(!manager.connect().await);

        // No retries, no backoff sleeps.
        assert_eq!(client.handshakes.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_aborts_on_permission_denied() {
        let client = Arc::new(ScriptedClient::failing_first(
            10,
            RemoteError::PermissionDenied("forbidden".into()),
        ));
        let manager = manager(client.clone());

        assert!(!manager.connect().await);
        assert_eq!(client.handshakes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_client_degrades() {
        let manager = ConnectionManager::new(
            None,
            Arc::new(ToolRegistry::new()),
            ResilienceConfig::default(),
        );

        assert!(!manager.connect().await);
        let status = manager.status().await;
        assert!(status.last_error.unwrap().contains("설정되지"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_after_five_consecutive_errors() {
        let client = Arc::new(ScriptedClient::healthy());
        let manager = manager(client.clone());
        manager.connect().await;

        for i in 1..=5u32 {
            manager.report_error(&RemoteError::Protocol("bad frame".into())).await;
            let status = manager.status().await;
            assert_eq!(status.consecutive_errors, i);
            assert_eq!(status.circuit_open, i >= 5, "after error {i}");
        }

        let status = manager.status().await;
        assert_eq!(status.phase, ConnectionPhase::CircuitOpen);
        assert!(status.circuit_opened_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_declines_without_invoking() {
        let client = Arc::new(ScriptedClient::healthy().with_invoke_error(
            RemoteError::Protocol("bad frame".into()),
        ));
        let manager = manager(client.clone());
        manager.connect().await;

        for _ in 0..5 {
            manager.report_error(&RemoteError::Protocol("bad frame".into())).await;
        }

        let result = manager.invoke_remote("search", json!({"query": "x"})).await;
        assert!(result.is_none());
        assert_eq!(client.invokes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_resets_after_cooldown() {
        let client = Arc::new(ScriptedClient::healthy());
        let manager = manager(client.clone());
        manager.connect().await;

        for _ in 0..5 {
            manager.report_error(&RemoteError::Protocol("bad frame".into())).await;
        }
        assert!(manager.status().await.circuit_open);

        // Just short of the cooldown: still declined, still open.
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(manager.guarded_call(|| async { Ok::<_, RemoteError>(1) }).await.is_none());
        assert!(manager.status().await.circuit_open);

        // Past the cooldown the reset succeeds; the call is still
        // declined because the connection is down, but the circuit is
        // closed and the error count cleared.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(manager.guarded_call(|| async { Ok::<_, RemoteError>(1) }).await.is_none());
        let status = manager.status().await;
        assert!(!status.circuit_open);
        assert_eq!(status.consecutive_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_call_success_resets_error_count() {
        let client = Arc::new(ScriptedClient::healthy());
        let manager = manager(client.clone());
        manager.connect().await;

        for _ in 0..3 {
            manager.report_error(&RemoteError::Protocol("bad frame".into())).await;
        }
        // report_error marks the connection down; bring it back.
        manager.connect().await;

        let result = manager.guarded_call(|| async { Ok::<_, RemoteError>(42) }).await;
        assert_eq!(result, Some(42));
        assert_eq!(manager.status().await.consecutive_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_call_declines_when_disconnected() {
        let client = Arc::new(ScriptedClient::healthy());
        let manager = manager(client.clone());

        let called = Arc::new(AtomicU32::new(0));
        let called_in = called.clone();
        let result = manager
            .guarded_call(move || async move {
                called_in.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RemoteError>(1)
            })
            .await;

        assert!(result.is_none());
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_error_triggers_reconnect() {
        let client = Arc::new(
            ScriptedClient::healthy().with_invoke_error(RemoteError::Refused("reset".into())),
        );
        let manager = manager(client.clone());
        manager.connect().await;
        assert_eq!(client.handshakes.load(Ordering::SeqCst), 1);

        let result = manager.invoke_remote("search", json!({"query": "x"})).await;
        assert!(result.is_none());

        // The failed invoke reported a connectivity error, which ran the
        // connect loop again. The reconnect succeeded and cleared the
        // error count, but the connection is still recorded as down with
        // the triggering error retained.
        assert_eq!(client.handshakes.load(Ordering::SeqCst), 2);
        let status = manager.status().await;
        assert_eq!(status.consecutive_errors, 0);
        assert!(!status.connected);
        assert!(status.last_error.unwrap().contains("reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_connectivity_error_does_not_reconnect() {
        let client = Arc::new(ScriptedClient::healthy());
        let manager = manager(client.clone());
        manager.connect().await;
        assert_eq!(client.handshakes.load(Ordering::SeqCst), 1);

        manager.report_error(&RemoteError::Protocol("bad frame".into())).await;
        assert_eq!(client.handshakes.load(Ordering::SeqCst), 1);
        assert!(!manager.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_recovers() {
        let client = Arc::new(ScriptedClient::healthy());
        let manager = manager(client.clone());
        manager.connect().await;
        manager.report_error(&RemoteError::Protocol("bad frame".into())).await;
        assert!(!manager.is_connected().await);

        assert!(manager.reconnect().await);
        assert!(manager.is_connected().await);
        assert_eq!(manager.status().await.consecutive_errors, 0);
    }
}
