//! Execution audit log
//!
//! Append-only record of every tool execution, kept for the process
//! lifetime. Feeds usage statistics and log export; never consulted for
//! control decisions.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::ErrorKind;
use crate::executor::{ExecutionResult, Outcome};
use crate::integrator::format_value;
use crate::tools::{ToolKind, ToolParams};

/// One executed tool call, as recorded
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub kind: ToolKind,
    pub parameters: ToolParams,
    pub elapsed_ms: u64,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    /// Rendered success value, or the failure message
    pub result: String,
    pub rationale: String,
}

impl ExecutionLogEntry {
    fn from_result(result: &ExecutionResult) -> Self {
        let (success, error_kind, rendered) = match &result.outcome {
            Outcome::Success(value) => (true, None, format_value(value)),
            Outcome::Failure { kind, message } => (false, Some(*kind), message.clone()),
        };

        Self {
            timestamp: Utc::now(),
            tool_name: result.tool_name.clone(),
            kind: result.kind,
            parameters: result.parameters.clone(),
            elapsed_ms: result.elapsed.as_millis() as u64,
            success,
            error_kind,
            result: rendered,
            rationale: result.rationale.clone(),
        }
    }
}

/// Export formats for the execution log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Csv,
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "text" => Ok(Self::Text),
            other => Err(format!("지원하지 않는 형식: {other}")),
        }
    }
}

/// Per-tool usage aggregate
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolUsage {
    pub count: usize,
    pub successes: usize,
    pub failures: usize,
    pub total_elapsed_ms: u64,
    pub average_elapsed_ms: f64,
    pub success_rate: f64,
}

/// Aggregate usage statistics over the whole log
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageStats {
    pub total_executions: usize,
    pub success_rate: f64,
    pub average_elapsed_ms: f64,
    pub per_tool: HashMap<String, ToolUsage>,
    pub error_summary: HashMap<&'static str, usize>,
    pub first_execution: Option<DateTime<Utc>>,
    pub last_execution: Option<DateTime<Utc>>,
}

/// Append-only execution log
pub struct ExecutionLog {
    entries: RwLock<Vec<ExecutionLogEntry>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn record(&self, result: &ExecutionResult) {
        self.entries
            .write()
            .push(ExecutionLogEntry::from_result(result));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Most recent entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<ExecutionLogEntry> {
        let entries = self.entries.read();
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Failures among the most recent `window` entries
    pub fn recent_failures(&self, window: usize) -> usize {
        let entries = self.entries.read();
        entries
            .iter()
            .rev()
            .take(window)
            .filter(|e| !e.success)
            .count()
    }

    pub fn statistics(&self) -> UsageStats {
        let entries = self.entries.read();
        if entries.is_empty() {
            return UsageStats::default();
        }

        let mut per_tool: HashMap<String, ToolUsage> = HashMap::new();
        let mut error_summary: HashMap<&'static str, usize> = HashMap::new();
        let mut total_elapsed: u64 = 0;
        let mut successes = 0usize;

        for entry in entries.iter() {
            let usage = per_tool.entry(entry.tool_name.clone()).or_default();
            usage.count += 1;
            usage.total_elapsed_ms += entry.elapsed_ms;
            total_elapsed += entry.elapsed_ms;

            if entry.success {
                usage.successes += 1;
                successes += 1;
            } else {
                usage.failures += 1;
                if let Some(kind) = entry.error_kind {
                    *error_summary.entry(kind.as_str()).or_default() += 1;
                }
            }
        }

        for usage in per_tool.values_mut() {
            usage.average_elapsed_ms = usage.total_elapsed_ms as f64 / usage.count as f64;
            usage.success_rate = usage.successes as f64 / usage.count as f64;
        }

        UsageStats {
            total_executions: entries.len(),
            success_rate: successes as f64 / entries.len() as f64,
            average_elapsed_ms: total_elapsed as f64 / entries.len() as f64,
            per_tool,
            error_summary,
            first_execution: entries.first().map(|e| e.timestamp),
            last_execution: entries.last().map(|e| e.timestamp),
        }
    }

    /// Render the whole log in the requested format
    pub fn export(&self, format: LogFormat) -> String {
        let entries = self.entries.read();
        if entries.is_empty() {
            return "실행 로그가 없습니다.".to_string();
        }

        match format {
            LogFormat::Json => {
                serde_json::to_string_pretty(&*entries).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
            }
            LogFormat::Csv => export_csv(&entries),
            LogFormat::Text => export_text(&entries),
        }
    }
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new()
    }
}

fn export_csv(entries: &[ExecutionLogEntry]) -> String {
    let mut lines = vec!["timestamp,tool_name,tool_type,elapsed_ms,success,parameters,result".to_string()];
    for entry in entries {
        let params = serde_json::to_string(&entry.parameters).unwrap_or_default();
        lines.push(format!(
            "{},{},{},{},{},\"{}\",\"{}\"",
            entry.timestamp.to_rfc3339(),
            entry.tool_name,
            entry.kind.as_str(),
            entry.elapsed_ms,
            entry.success,
            csv_escape(&params),
            csv_escape(&entry.result),
        ));
    }
    lines.join("\n")
}

fn csv_escape(field: &str) -> String {
    field.replace('"', "\"\"")
}

fn export_text(entries: &[ExecutionLogEntry]) -> String {
    let mut lines = vec!["=== 툴 실행 로그 ===".to_string(), String::new()];
    for (i, entry) in entries.iter().enumerate() {
        let params = serde_json::to_string(&entry.parameters).unwrap_or_default();
        lines.push(format!(
            "{}. [{}] {} ({}) - {}ms",
            i + 1,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.tool_name,
            entry.kind.as_str(),
            entry.elapsed_ms,
        ));
        lines.push(format!("   매개변수: {params}"));
        lines.push(format!("   결과: {}", entry.result));
        lines.push(String::new());
    }
    lines.join("\n")
}
