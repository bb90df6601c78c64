//! Candidate execution
//!
//! Runs a candidate list strictly in order, one result per candidate.
//! Failures are isolated per call: a tool error, timeout, or declined
//! remote call becomes a `Failure` outcome and the remaining candidates
//! still run. Nothing a tool raises escapes past this module.

use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::{ErrorKind, ToolError};
use crate::resilience::ConnectionManager;
use crate::selector::Candidate;
use crate::tools::{ToolKind, ToolParams, ToolRegistry};

/// Rendered-result size past which a warning is logged
const RESULT_SIZE_WARN: usize = 10_000;

/// Execution time past which a warning is logged
const SLOW_CALL_WARN: Duration = Duration::from_secs(1);

/// Terminal outcome of one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failure { kind: ErrorKind, message: String },
}

/// One execution record, produced per candidate in submission order
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub tool_name: String,
    pub kind: ToolKind,
    pub parameters: ToolParams,
    pub outcome: Outcome,
    pub elapsed: Duration,
    pub rationale: String,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// Dispatches candidates to local callables or the guarded remote path
pub struct Executor {
    registry: Arc<ToolRegistry>,
    connection: Arc<ConnectionManager>,
    tool_timeout: Duration,
}

impl Executor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        connection: Arc<ConnectionManager>,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            connection,
            tool_timeout,
        }
    }

    /// Execute every candidate, in order, isolating failures per call.
    /// The output has exactly one entry per input candidate.
    pub async fn execute(&self, candidates: &[Candidate]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            results.push(self.execute_one(candidate).await);
        }
        results
    }

    async fn execute_one(&self, candidate: &Candidate) -> ExecutionResult {
        info!(
            tool = %candidate.tool_name,
            kind = candidate.kind.as_str(),
            rationale = %candidate.rationale,
            "executing tool"
        );

        let started = Instant::now();
        let outcome = match candidate.kind {
            ToolKind::Local => self.run_local(candidate).await,
            ToolKind::Remote => self.run_remote(candidate).await,
        };
        let elapsed = started.elapsed();

        match &outcome {
            Outcome::Success(value) => {
                info!(tool = %candidate.tool_name, elapsed = ?elapsed, "tool succeeded");
                let rendered = value.to_string();
                if rendered.len() > RESULT_SIZE_WARN {
                    warn!(
                        tool = %candidate.tool_name,
                        result_size = rendered.len(),
                        threshold = RESULT_SIZE_WARN,
                        "oversized tool result"
                    );
                }
            }
            Outcome::Failure { kind, message } => {
                warn!(
                    tool = %candidate.tool_name,
                    error_kind = kind.as_str(),
                    error = %message,
                    "tool failed"
                );
            }
        }

        if elapsed > SLOW_CALL_WARN {
            warn!(
                tool = %candidate.tool_name,
                elapsed = ?elapsed,
                threshold = ?SLOW_CALL_WARN,
                "slow tool execution"
            );
        }

        ExecutionResult {
            tool_name: candidate.tool_name.clone(),
            kind: candidate.kind,
            parameters: candidate.parameters.clone(),
            outcome,
            elapsed,
            rationale: candidate.rationale.clone(),
        }
    }

    async fn run_local(&self, candidate: &Candidate) -> Outcome {
        let Some(invoke) = self.registry.local_fn(&candidate.tool_name) else {
            return failure(ToolError::UnknownTool(candidate.tool_name.clone()));
        };

        let params = candidate.parameters.clone();
        match tokio::time::timeout(self.tool_timeout, async move { invoke(&params) }).await {
            Ok(Ok(value)) => Outcome::Success(value),
            Ok(Err(e)) => failure(e),
            Err(_) => failure(ToolError::Timeout(self.tool_timeout)),
        }
    }

    /// Remote calls go through the guarded path; a decline (circuit
    /// open, disconnected, or remote failure) surfaces uniformly as
    /// Unavailable while the controller keeps the diagnostic detail.
    async fn run_remote(&self, candidate: &Candidate) -> Outcome {
        let params = Value::Object(candidate.parameters.clone());
        match self.connection.invoke_remote(&candidate.tool_name, params).await {
            Some(value) => Outcome::Success(value),
            None => failure(ToolError::Unavailable),
        }
    }
}

fn failure(error: ToolError) -> Outcome {
    Outcome::Failure {
        kind: error.kind(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::resilience::ResilienceConfig;

    fn executor() -> Executor {
        let registry = Arc::new(ToolRegistry::new());
        let connection = Arc::new(ConnectionManager::new(
            None,
            registry.clone(),
            ResilienceConfig::default(),
        ));
        Executor::new(registry, connection, Duration::from_secs(10))
    }

    fn local_candidate(tool: &str, a: Value, b: Value) -> Candidate {
        let mut parameters = ToolParams::new();
        parameters.insert("a".into(), a);
        parameters.insert("b".into(), b);
        Candidate {
            tool_name: tool.to_string(),
            kind: ToolKind::Local,
            parameters,
            rationale: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_local_success() {
        let results = executor()
            .execute(&[local_candidate("add", json!(15), json!(25))])
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, Outcome::Success(json!(40)));
        assert_eq!(results[0].tool_name, "add");
    }

    #[tokio::test]
    async fn test_divide_by_zero_is_domain_error() {
        let results = executor()
            .execute(&[local_candidate("divide", json!(100), json!(0))])
            .await;

        assert_eq!(results[0].error_kind(), Some(ErrorKind::DomainError));
        match &results[0].outcome {
            Outcome::Failure { message, .. } => {
                assert_eq!(message, "0으로 나눌 수 없습니다")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_remaining_candidates() {
        let candidates = vec![
            local_candidate("divide", json!(1), json!(0)),
            local_candidate("add", json!(1), json!(2)),
            local_candidate("multiply", json!(3), json!(4)),
        ];

        let results = executor().execute(&candidates).await;

        assert_eq!(results.len(), 3);
        assert!(!results[0].is_success());
        assert_eq!(results[1].outcome, Outcome::Success(json!(3)));
        assert_eq!(results[2].outcome, Outcome::Success(json!(12)));
    }

    #[tokio::test]
    async fn test_results_preserve_submission_order() {
        let candidates = vec![
            local_candidate("subtract", json!(50), json!(30)),
            local_candidate("add", json!(1), json!(1)),
        ];

        let results = executor().execute(&candidates).await;
        let names: Vec<_> = results.iter().map(|r| r.tool_name.as_str()).collect();
        assert_eq!(names, vec!["subtract", "add"]);
    }

    #[tokio::test]
    async fn test_unknown_local_tool() {
        let results = executor()
            .execute(&[local_candidate("frobnicate", json!(1), json!(2))])
            .await;

        assert_eq!(results[0].error_kind(), Some(ErrorKind::Unknown));
    }

    #[tokio::test]
    async fn test_remote_declined_without_connection() {
        let mut parameters = ToolParams::new();
        parameters.insert("query".into(), json!("회의록"));
        let candidate = Candidate {
            tool_name: "search".to_string(),
            kind: ToolKind::Remote,
            parameters,
            rationale: "test".to_string(),
        };

        let results = executor().execute(&[candidate]).await;
        assert_eq!(results[0].error_kind(), Some(ErrorKind::Unavailable));
    }

    #[tokio::test]
    async fn test_empty_candidate_list() {
        let results = executor().execute(&[]).await;
        assert!(results.is_empty());
    }
}
