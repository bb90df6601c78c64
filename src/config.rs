//! Configuration management

use std::time::Duration;

/// Agent configuration
///
/// All numeric knobs carry fixed defaults and can be overridden from the
/// environment. Credentials have no default: without them the remote
/// connection is skipped and the agent runs on local tools only.
#[derive(Debug, Clone)]
pub struct Config {
    /// Smithery API key for the remote MCP service
    pub api_key: Option<String>,

    /// Smithery profile identifier
    pub profile: Option<String>,

    /// Base URL of the Smithery Notion MCP server
    pub mcp_url: String,

    /// Handshake timeout per connection attempt
    pub connect_timeout: Duration,

    /// Wall-clock timeout per tool call
    pub tool_timeout: Duration,

    /// Overall deadline for one handle_message call
    pub request_timeout: Duration,

    /// Connection attempts before giving up
    pub max_retries: u32,

    /// Initial backoff between connection attempts
    pub backoff_base: Duration,

    /// Backoff ceiling
    pub backoff_cap: Duration,

    /// Consecutive remote errors before the circuit opens
    pub circuit_threshold: u32,

    /// Cooldown before an open circuit may auto-reset
    pub circuit_cooldown: Duration,

    /// Inbound message length ceiling (characters)
    pub max_message_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            profile: None,
            mcp_url: "https://server.smithery.ai/@smithery/notion/mcp".to_string(),
            connect_timeout: Duration::from_secs(30),
            tool_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(30),
            circuit_threshold: 5,
            circuit_cooldown: Duration::from_secs(300),
            max_message_chars: 10_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_key: std::env::var("SMITHERY_API_KEY").ok().filter(|v| !v.is_empty()),
            profile: std::env::var("SMITHERY_PROFILE").ok().filter(|v| !v.is_empty()),
            mcp_url: std::env::var("TOOLCHAT_MCP_URL").unwrap_or(defaults.mcp_url),
            connect_timeout: env_secs("TOOLCHAT_CONNECT_TIMEOUT", defaults.connect_timeout),
            tool_timeout: env_secs("TOOLCHAT_TOOL_TIMEOUT", defaults.tool_timeout),
            request_timeout: env_secs("TOOLCHAT_REQUEST_TIMEOUT", defaults.request_timeout),
            max_retries: env_num("TOOLCHAT_MAX_RETRIES", defaults.max_retries),
            backoff_base: env_secs("TOOLCHAT_BACKOFF_BASE", defaults.backoff_base),
            backoff_cap: env_secs("TOOLCHAT_BACKOFF_CAP", defaults.backoff_cap),
            circuit_threshold: env_num("TOOLCHAT_CIRCUIT_THRESHOLD", defaults.circuit_threshold),
            circuit_cooldown: env_secs("TOOLCHAT_CIRCUIT_COOLDOWN", defaults.circuit_cooldown),
            max_message_chars: env_num("TOOLCHAT_MAX_MESSAGE_CHARS", defaults.max_message_chars),
        }
    }

    /// Both credential pieces present
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.profile.is_some()
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
