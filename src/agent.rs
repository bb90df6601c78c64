//! Agent orchestration
//!
//! Composes Selector → Executor → Integrator per inbound message and
//! fronts the resilience controller for the host: initialization,
//! reconnect, health, statistics, and log export. One instance per
//! session, owned by the host; there is no ambient singleton.
//!
//! `handle_message` is total: every path returns a reply string and no
//! fault propagates past this boundary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::{ExecutionLog, ExecutionLogEntry, LogFormat, UsageStats};
use crate::config::Config;
use crate::error::ErrorKind;
use crate::executor::{ExecutionResult, Executor};
use crate::integrator;
use crate::remote::{RemoteToolClient, SmitheryClient};
use crate::resilience::{ConnectionManager, ConnectionStatus, ResilienceConfig};
use crate::selector::{self, REMOTE_SEARCH_TOOL};
use crate::tools::{ToolInventory, ToolRegistry};

const EMPTY_MESSAGE_REPLY: &str = "메시지를 입력해주세요.";
const TOO_LONG_REPLY: &str = "메시지가 너무 깁니다. 10,000자 이하로 입력해주세요.";
const REQUEST_TIMEOUT_REPLY: &str = "요청 처리 시간이 초과되었습니다. 잠시 후 다시 시도해주세요.";

const FALLBACK_DEGRADED: &str = "죄송합니다. 현재 일부 기능이 제한되어 있습니다.\n\
    사용 가능한 기능: 날짜 조회, 수학 계산\n\
    예시: '오늘 날짜 알려줘', '15 + 25는 얼마야?'";
const FALLBACK_NORMAL: &str = "죄송합니다. 요청을 처리할 수 있는 적절한 기능을 찾지 못했습니다.\n\
    사용 가능한 기능:\n\
    • 날짜 조회: '오늘 날짜 알려줘'\n\
    • 수학 계산: '15 + 25는 얼마야?'";

const ERROR_DIVIDE_BY_ZERO: &str = "계산 오류: 0으로 나눌 수 없습니다.";
const ERROR_VALIDATION: &str = "입력 오류: 올바른 숫자를 입력해주세요.";
const ERROR_TIMEOUT: &str = "처리 시간이 초과되었습니다. 잠시 후 다시 시도해주세요.";
const ERROR_GENERIC: &str = "요청 처리 중 오류가 발생했습니다. 다른 방식으로 시도해보세요.";

/// System health snapshot for the host
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub local_tools: usize,
    pub remote_tools: usize,
    pub remote_connected: bool,
    pub circuit_open: bool,
    pub log_entries: usize,
    /// Failures among the last ten executions
    pub recent_errors: usize,
    pub average_elapsed_ms: f64,
}

/// The tool-dispatch agent
pub struct Agent {
    config: Config,
    registry: Arc<ToolRegistry>,
    connection: Arc<ConnectionManager>,
    executor: Executor,
    log: ExecutionLog,
}

impl Agent {
    /// Build an agent around an explicit remote client (or none, for a
    /// local-tools-only agent)
    pub fn new(config: Config, client: Option<Arc<dyn RemoteToolClient>>) -> Self {
        let registry = Arc::new(ToolRegistry::new());
        let connection = Arc::new(ConnectionManager::new(
            client,
            registry.clone(),
            ResilienceConfig::from_config(&config),
        ));
        let executor = Executor::new(registry.clone(), connection.clone(), config.tool_timeout);

        Self {
            config,
            registry,
            connection,
            executor,
            log: ExecutionLog::new(),
        }
    }

    /// Build an agent from environment configuration, wiring the
    /// Smithery client when credentials are present
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Config::from_env();
        let client: Option<Arc<dyn RemoteToolClient>> = if config.has_credentials() {
            Some(Arc::new(SmitheryClient::from_config(&config)?))
        } else {
            warn!("Smithery credentials not set, remote tools disabled");
            None
        };
        Ok(Self::new(config, client))
    }

    /// Connect to the remote service. Failure is not fatal: the agent
    /// keeps running on local tools.
    pub async fn initialize(&self) {
        info!("agent initializing");
        let connected = self.connection.connect().await;
        if connected && !self.registry.has_remote(REMOTE_SEARCH_TOOL) {
            warn!(
                tool = REMOTE_SEARCH_TOOL,
                "remote service connected but search tool not advertised"
            );
        }
        info!(remote_connected = connected, "agent initialized");
    }

    /// Handle one inbound message; always returns a reply string
    pub async fn handle_message(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return EMPTY_MESSAGE_REPLY.to_string();
        }
        if text.chars().count() > self.config.max_message_chars {
            warn!(length = text.chars().count(), "message over length ceiling");
            return TOO_LONG_REPLY.to_string();
        }

        match tokio::time::timeout(self.config.request_timeout, self.run_pipeline(text)).await {
            Ok(reply) => reply,
            Err(_) => {
                warn!(timeout = ?self.config.request_timeout, "request deadline exceeded");
                REQUEST_TIMEOUT_REPLY.to_string()
            }
        }
    }

    async fn run_pipeline(&self, text: &str) -> String {
        let remote_available = self.connection.is_connected().await;
        let candidates = selector::select(text, remote_available);

        info!(
            candidate_count = candidates.len(),
            remote_available,
            tools = ?candidates.iter().map(|c| c.tool_name.as_str()).collect::<Vec<_>>(),
            "tool selection complete"
        );
        for candidate in &candidates {
            debug!(
                tool = %candidate.tool_name,
                kind = candidate.kind.as_str(),
                rationale = %candidate.rationale,
                "candidate"
            );
        }

        if candidates.is_empty() {
            return self.no_candidate_reply().await;
        }

        let results = self.executor.execute(&candidates).await;
        for result in &results {
            self.log.record(result);
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - succeeded;

        if succeeded == 0 {
            warn!(failed, "every candidate failed");
            return all_failed_reply(&results).to_string();
        }

        let reply = integrator::integrate(&results);
        info!(
            total = results.len(),
            succeeded,
            failed,
            reply_length = reply.chars().count(),
            "message handled"
        );
        reply
    }

    /// Capability reminder when no rule matched; wording reflects
    /// whether the remote side is degraded
    async fn no_candidate_reply(&self) -> String {
        let status = self.connection.status().await;
        if !status.connected && status.last_error.is_some() {
            FALLBACK_DEGRADED.to_string()
        } else {
            FALLBACK_NORMAL.to_string()
        }
    }

    // ========== Host-facing surface ==========

    /// Try to re-establish the remote connection
    pub async fn reconnect(&self) -> bool {
        self.connection.reconnect().await
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        self.connection.status().await
    }

    pub fn usage_statistics(&self) -> UsageStats {
        self.log.statistics()
    }

    pub fn export_log(&self, format: LogFormat) -> String {
        self.log.export(format)
    }

    pub fn recent_activity(&self, limit: usize) -> Vec<ExecutionLogEntry> {
        self.log.recent(limit)
    }

    pub fn clear_log(&self) {
        self.log.clear();
        info!("execution log cleared");
    }

    pub async fn available_tools(&self) -> ToolInventory {
        self.registry
            .inventory(self.connection.is_connected().await)
    }

    pub async fn health_report(&self) -> HealthReport {
        let status = self.connection.status().await;
        let stats = self.log.statistics();

        HealthReport {
            timestamp: Utc::now(),
            local_tools: self.registry.local_count(),
            remote_tools: self.registry.remote_count(),
            remote_connected: status.connected,
            circuit_open: status.circuit_open,
            log_entries: self.log.len(),
            recent_errors: self.log.recent_failures(10),
            average_elapsed_ms: stats.average_elapsed_ms,
        }
    }
}

/// Pick the all-failures reply from the most telling error kind present
fn all_failed_reply(results: &[ExecutionResult]) -> &'static str {
    let kinds: Vec<ErrorKind> = results.iter().filter_map(|r| r.error_kind()).collect();

    if kinds.contains(&ErrorKind::DomainError) {
        ERROR_DIVIDE_BY_ZERO
    } else if kinds.contains(&ErrorKind::Validation) {
        ERROR_VALIDATION
    } else if kinds.contains(&ErrorKind::Timeout) {
        ERROR_TIMEOUT
    } else {
        ERROR_GENERIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_agent() -> Agent {
        Agent::new(Config::default(), None)
    }

    #[tokio::test]
    async fn test_blank_message_prompt() {
        let agent = local_agent();
        assert_eq!(agent.handle_message("").await, EMPTY_MESSAGE_REPLY);
        assert_eq!(agent.handle_message("   \n\t ").await, EMPTY_MESSAGE_REPLY);
        assert!(agent.log.is_empty());
    }

    #[tokio::test]
    async fn test_over_length_message_rejected_before_selection() {
        let agent = local_agent();
        let long = "ㅁ".repeat(10_001);

        assert_eq!(agent.handle_message(&long).await, TOO_LONG_REPLY);
        assert!(agent.log.is_empty());
        assert_eq!(agent.usage_statistics().total_executions, 0);
    }

    #[tokio::test]
    async fn test_exact_ceiling_passes_validation() {
        let agent = local_agent();
        let message = "ㅁ".repeat(10_000);
        // 10,000 chars exactly: validated through, no rule matches.
        assert_eq!(agent.handle_message(&message).await, FALLBACK_NORMAL);
    }

    #[tokio::test]
    async fn test_arithmetic_end_to_end() {
        let agent = local_agent();
        let reply = agent.handle_message("15 + 25는 얼마야?").await;
        assert!(reply.contains("15 + 25 = 40"), "{reply}");
        assert_eq!(agent.usage_statistics().total_executions, 1);
    }

    #[tokio::test]
    async fn test_divide_by_zero_reply() {
        let agent = local_agent();
        let reply = agent.handle_message("100 나누기 0").await;
        assert_eq!(reply, ERROR_DIVIDE_BY_ZERO);
    }

    #[tokio::test]
    async fn test_no_candidates_without_degradation() {
        let agent = local_agent();
        // Fresh agent: disconnected but no recorded error yet.
        assert_eq!(agent.handle_message("안녕하세요").await, FALLBACK_NORMAL);
    }

    #[tokio::test]
    async fn test_no_candidates_when_degraded() {
        let agent = local_agent();
        // A failed connect records the degradation reason.
        agent.initialize().await;
        assert_eq!(agent.handle_message("안녕하세요").await, FALLBACK_DEGRADED);
    }

    #[tokio::test]
    async fn test_mixed_results_keep_successes() {
        let agent = local_agent();
        let reply = agent.handle_message("1 + 2 하고 5 / 0").await;
        assert!(reply.contains("1 + 2 = 3"), "{reply}");
        assert!(reply.contains("divide"), "{reply}");
    }

    #[tokio::test]
    async fn test_health_report() {
        let agent = local_agent();
        agent.handle_message("1 + 2").await;

        let health = agent.health_report().await;
        assert_eq!(health.local_tools, 5);
        assert_eq!(health.log_entries, 1);
        assert!(!health.remote_connected);
        assert_eq!(health.recent_errors, 0);
    }

    #[test]
    fn test_all_failed_reply_priority() {
        use crate::executor::Outcome;
        use crate::tools::{ToolKind, ToolParams};
        use std::time::Duration;

        let failure = |kind: ErrorKind| ExecutionResult {
            tool_name: "t".to_string(),
            kind: ToolKind::Local,
            parameters: ToolParams::new(),
            outcome: Outcome::Failure {
                kind,
                message: "x".to_string(),
            },
            elapsed: Duration::ZERO,
            rationale: String::new(),
        };

        assert_eq!(
            all_failed_reply(&[failure(ErrorKind::Timeout), failure(ErrorKind::DomainError)]),
            ERROR_DIVIDE_BY_ZERO
        );
        assert_eq!(
            all_failed_reply(&[failure(ErrorKind::Validation)]),
            ERROR_VALIDATION
        );
        assert_eq!(
            all_failed_reply(&[failure(ErrorKind::Timeout)]),
            ERROR_TIMEOUT
        );
        assert_eq!(
            all_failed_reply(&[failure(ErrorKind::Unavailable)]),
            ERROR_GENERIC
        );
    }
}
