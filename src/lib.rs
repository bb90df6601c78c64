//! toolchat
//!
//! Pattern-routed chat agent: free-text messages are matched against a
//! fixed rule set and dispatched to deterministic local tools, with one
//! remote document-search tool reached over a Smithery-hosted MCP
//! connection when it is healthy.
//!
//! # Features
//!
//! - **Tool Registry**: static local tool table plus handshake-derived
//!   remote descriptors
//! - **Selector**: pure lexical matching, Korean and symbolic operators
//! - **Executor**: ordered execution, per-call timeout, full failure
//!   isolation
//! - **Resilience**: retry with exponential backoff, consecutive-error
//!   circuit breaker, graceful degradation to local tools
//! - **Integrator**: deterministic per-tool reply templates
//! - **Audit**: append-only execution log, usage statistics, export
//!
//! # Architecture
//!
//! ```text
//! Host (CLI / UI) ──► Agent ──► Selector ──► Executor ──► Integrator
//!                      │                       │
//!                      │                       ├── local tools (date, arithmetic)
//!                      │                       └── guarded remote call
//!                      │                               │
//!                      └── ConnectionManager ──────────┘
//!                            (retry / circuit breaker / state)
//! ```

pub mod agent;
pub mod audit;
pub mod config;
pub mod error;
pub mod executor;
pub mod integrator;
pub mod remote;
pub mod resilience;
pub mod selector;
pub mod tools;

pub use agent::{Agent, HealthReport};
pub use audit::{ExecutionLog, ExecutionLogEntry, LogFormat, UsageStats};
pub use config::Config;
pub use error::{ErrorKind, ToolError};
pub use executor::{ExecutionResult, Executor, Outcome};
pub use integrator::integrate;
pub use remote::{RemoteError, RemoteToolClient, RemoteToolInfo, SmitheryClient};
pub use resilience::{ConnectionManager, ConnectionPhase, ConnectionStatus, ResilienceConfig};
pub use selector::{select, Candidate};
pub use tools::{ToolDescriptor, ToolInventory, ToolKind, ToolRegistry};
