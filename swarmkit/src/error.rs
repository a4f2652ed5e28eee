//! Error taxonomy.
//!
//! Each kind maps to a distinct `thiserror` variant so callers can match on it; the chat
//! engine converts most of these into assistant-role messages rather than letting them
//! escape `ask()`.

use thiserror::Error;

/// Configuration errors: fail fast at build time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("agent name '{0}' is reserved: '@' is used for delegation instance names")]
    ReservedName(String),
    #[error("timeout must be positive, got {0}")]
    NonPositiveTimeout(i64),
    #[error("delegation cycle detected: {0}")]
    DelegationCycle(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("tool '{0}' is forbidden: filesystem tools are disabled for this process")]
    ForbiddenTool(String),
    #[error("duplicate agent name: {0}")]
    DuplicateAgent(String),
    #[error("primary agent '{0}' referenced by delegation does not exist")]
    UnknownDelegationTarget(String),
}

/// Classification of a provider (LLM HTTP client) error.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    /// 4xx other than the tool-history case, or a programming error (type/argument/name).
    #[error("{error_type} ({status}): {message}")]
    NonRetryable {
        error_type: String,
        status: u16,
        message: String,
    },
    /// 5xx, 429, or transient transport failure.
    #[error("retryable provider error ({status:?}): {message}")]
    Retryable { status: Option<u16>, message: String },
    /// A 400 whose body matches one of the tool-history recovery phrases.
    #[error("tool-history error: {message}")]
    ToolHistory { message: String },
}

impl ProviderError {
    /// Phrases that trigger orphan-tool-call pruning instead of normal non-retryable handling.
    pub const TOOL_HISTORY_PHRASES: [&'static str; 3] = [
        "tool_use block must have corresponding tool_result",
        "tool_use_id not found",
        "must immediately follow",
    ];

    /// Classifies a raw HTTP status + body into a `ProviderError`.
    pub fn classify(status: u16, body: &str) -> Self {
        if status == 400 {
            if let Some(phrase) = Self::TOOL_HISTORY_PHRASES
                .iter()
                .find(|p| body.contains(**p))
            {
                return ProviderError::ToolHistory {
                    message: format!("{phrase}: {body}"),
                };
            }
        }
        match status {
            429 | 500..=599 | 529 => ProviderError::Retryable {
                status: Some(status),
                message: body.to_string(),
            },
            400..=499 => ProviderError::NonRetryable {
                error_type: Self::error_type_for_status(status),
                status,
                message: body.to_string(),
            },
            _ => ProviderError::NonRetryable {
                error_type: "Unknown".into(),
                status,
                message: body.to_string(),
            },
        }
    }

    fn error_type_for_status(status: u16) -> String {
        match status {
            401 => "Unauthorized",
            402 => "PaymentRequired",
            403 => "Forbidden",
            404 => "NotFound",
            422 => "UnprocessableEntity",
            429 => "RateLimited",
            _ => "ClientError",
        }
        .to_string()
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Retryable { .. })
    }
}

/// A hook halted execution, surfaced as a user-facing error.
#[derive(Debug, Error, Clone)]
#[error("hook halted: {0}")]
pub struct HookHaltError(pub String);

/// Permission denial for a tool call. Surfaced as a tool result, not an engine-level failure.
#[derive(Debug, Error, Clone)]
#[error("permission denied for tool '{tool}': {reason}")]
pub struct PermissionError {
    pub tool: String,
    pub reason: String,
}

/// Top-level error type covering every failure mode that can escape engine internals.
/// Cancellation is deliberately not a variant here: it surfaces as `None` from an external
/// `wait()`, never as an `Err`.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Hook(#[from] HookHaltError),
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error("tool '{0}' missing required parameter '{1}'")]
    MissingParameter(String, String),
    #[error("tool '{0}' not found in registry")]
    ToolNotFound(String),
    #[error("execution timed out after {0}s")]
    ExecutionTimeout(u64),
    #[error("turn timed out after {0}s")]
    TurnTimeout(u64),
    #[error("workflow error: {0}")]
    Workflow(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SwarmError>;
