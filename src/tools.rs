//! Tool registry
//!
//! Static registration table for the local tools plus the remote
//! descriptors learned from the MCP handshake. Local descriptors are
//! registered once at startup and never removed; remote descriptors are
//! populated after a successful handshake and cleared on disconnect.

use chrono::Local;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::ToolError;
use crate::remote::RemoteToolInfo;

/// Where a tool executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ToolKind {
    Local,
    Remote,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Parameter map passed to a tool callable
pub type ToolParams = serde_json::Map<String, Value>;

/// Signature of a local tool callable
pub type LocalToolFn = fn(&ToolParams) -> Result<Value, ToolError>;

/// A registered tool
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub kind: ToolKind,
    pub description: String,
    invoke: Option<LocalToolFn>,
}

impl ToolDescriptor {
    fn local(name: &str, description: &str, invoke: LocalToolFn) -> Self {
        Self {
            name: name.to_string(),
            kind: ToolKind::Local,
            description: description.to_string(),
            invoke: Some(invoke),
        }
    }

    fn remote(info: &RemoteToolInfo) -> Self {
        Self {
            name: info.name.clone(),
            kind: ToolKind::Remote,
            description: info.description.clone(),
            invoke: None,
        }
    }
}

/// Listing of everything currently callable
#[derive(Debug, Clone, Serialize)]
pub struct ToolInventory {
    pub local: Vec<ToolSummary>,
    pub remote: Vec<ToolSummary>,
    pub remote_connected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

/// Registry of local and remote tools
pub struct ToolRegistry {
    local: Vec<ToolDescriptor>,
    remote: RwLock<Vec<ToolDescriptor>>,
}

impl ToolRegistry {
    /// Build the registry with the fixed local tool set
    pub fn new() -> Self {
        let local = vec![
            ToolDescriptor::local(
                "current_date",
                "현재 날짜를 YYYY-MM-DD 형식으로 반환합니다",
                current_date,
            ),
            ToolDescriptor::local("add", "두 숫자를 더합니다", add),
            ToolDescriptor::local("subtract", "첫 번째 숫자에서 두 번째 숫자를 뺍니다", subtract),
            ToolDescriptor::local("multiply", "두 숫자를 곱합니다", multiply),
            ToolDescriptor::local("divide", "첫 번째 숫자를 두 번째 숫자로 나눕니다", divide),
        ];

        info!(
            tool_count = local.len(),
            tools = ?local.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "local tools registered"
        );

        Self {
            local,
            remote: RwLock::new(Vec::new()),
        }
    }

    /// Look up the callable for a local tool
    pub fn local_fn(&self, name: &str) -> Option<LocalToolFn> {
        self.local
            .iter()
            .find(|t| t.name == name)
            .and_then(|t| t.invoke)
    }

    pub fn local_count(&self) -> usize {
        self.local.len()
    }

    /// Replace the remote descriptor set after a successful handshake
    pub fn register_remote(&self, tools: &[RemoteToolInfo]) {
        let mut remote = self.remote.write();
        *remote = tools.iter().map(ToolDescriptor::remote).collect();
        info!(tool_count = remote.len(), "remote tools registered");
    }

    /// Drop all remote descriptors (connection lost)
    pub fn clear_remote(&self) {
        let mut remote = self.remote.write();
        if !remote.is_empty() {
            info!(tool_count = remote.len(), "remote tools cleared");
        }
        remote.clear();
    }

    /// A remote tool with this name is currently registered
    pub fn has_remote(&self, name: &str) -> bool {
        self.remote.read().iter().any(|t| t.name == name)
    }

    pub fn remote_count(&self) -> usize {
        self.remote.read().len()
    }

    pub fn inventory(&self, remote_connected: bool) -> ToolInventory {
        ToolInventory {
            local: self
                .local
                .iter()
                .map(|t| ToolSummary {
                    name: t.name.clone(),
                    description: t.description.clone(),
                })
                .collect(),
            remote: self
                .remote
                .read()
                .iter()
                .map(|t| ToolSummary {
                    name: t.name.clone(),
                    description: t.description.clone(),
                })
                .collect(),
            remote_connected,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Local tool callables ==========

fn current_date(_params: &ToolParams) -> Result<Value, ToolError> {
    Ok(Value::String(Local::now().format("%Y-%m-%d").to_string()))
}

fn add(params: &ToolParams) -> Result<Value, ToolError> {
    let (a, b) = operands(params)?;
    Ok(number_value(a + b))
}

fn subtract(params: &ToolParams) -> Result<Value, ToolError> {
    let (a, b) = operands(params)?;
    Ok(number_value(a - b))
}

fn multiply(params: &ToolParams) -> Result<Value, ToolError> {
    let (a, b) = operands(params)?;
    Ok(number_value(a * b))
}

fn divide(params: &ToolParams) -> Result<Value, ToolError> {
    let (a, b) = operands(params)?;
    if b == 0.0 {
        return Err(ToolError::DivideByZero);
    }
    Ok(number_value(a / b))
}

/// Pull the two numeric operands out of a parameter map
fn operands(params: &ToolParams) -> Result<(f64, f64), ToolError> {
    let get = |key: &str| -> Result<f64, ToolError> {
        params
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::InvalidParameter(key.to_string()))
    };
    Ok((get("a")?, get("b")?))
}

/// Render a numeric result, preferring integers when exact
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}
