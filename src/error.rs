//! Unified error types for the harness.

use std::fmt;

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Errors from the HTTP API layer.
#[derive(Debug)]
pub enum ApiError {
    /// Network / reqwest-level error.
    Http(reqwest::Error),
    /// Non-2xx status from the API.
    ///
    /// Displays as `"<Provider> API error (<status>): <body>"`, the raw form
    /// the worker's error normalization recognizes.
    Status {
        /// Vendor label derived from the base URL (`"OpenRouter"`, ...).
        provider: String,
        code: u16,
        body: String,
        /// Parsed `Retry-After` header, when the response carried one.
        retry_after_secs: Option<u64>,
    },
    /// The API returned a payload the client could not interpret
    /// (malformed SSE chunk, undecodable JSON).
    InvalidResponse(String),
}

impl ApiError {
    /// Build a status error for a failed response.
    pub fn status(
        provider: impl Into<String>,
        code: u16,
        body: String,
        retry_after_secs: Option<u64>,
    ) -> Self {
        Self::Status {
            provider: provider.into(),
            code,
            body,
            retry_after_secs,
        }
    }

    /// HTTP status code when this error carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// `Retry-After` delay in seconds when the response provided one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Status {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Status {
                provider,
                code,
                body,
                ..
            } => write!(f, "{provider} API error ({code}): {body}"),
            Self::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// Errors arising from tool registration and execution.
#[derive(Debug)]
pub enum ToolError {
    /// The model supplied arguments the tool couldn't use.
    InvalidArguments(String),
    /// The tool ran but encountered a failure.
    ExecutionFailed(String),
    /// A tool with this name is already registered.
    DuplicateName(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
            Self::ExecutionFailed(msg) => write!(f, "execution failed: {msg}"),
            Self::DuplicateName(name) => write!(f, "duplicate tool name: {name}"),
        }
    }
}

impl std::error::Error for ToolError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// AgentError: failures that escape the agent loop
// ---------------------------------------------------------------------------

/// Errors that terminate an agent run.
///
/// Recoverable tool failures never reach this type; they are converted into
/// result strings and fed back to the model. Only infrastructure failures
/// and unknown-tool dispatch escape the loop.
#[derive(Debug)]
pub enum AgentError {
    Api(ApiError),
    /// The model asked for a tool that is not registered.
    UnknownTool(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(e) => write!(f, "{e}"),
            Self::UnknownTool(name) => write!(f, "unknown tool: {name}"),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<ApiError> for AgentError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verifies the status display matches the raw form the normalizer expects.
    #[test]
    fn api_status_error_display_is_normalizable_raw_form() {
        let e = ApiError::status("OpenRouter", 500, r#"{"error":"x"}"#.to_string(), None);
        assert_eq!(e.to_string(), r#"OpenRouter API error (500): {"error":"x"}"#);
        assert_eq!(e.status_code(), Some(500));
    }

    #[test]
    fn retry_after_is_only_reported_for_status_errors() {
        let e = ApiError::status("Provider", 429, String::new(), Some(7));
        assert_eq!(e.retry_after_secs(), Some(7));
        let e = ApiError::InvalidResponse("bad".into());
        assert_eq!(e.retry_after_secs(), None);
    }

    #[test]
    fn tool_error_display() {
        assert_eq!(
            ToolError::InvalidArguments("bad json".into()).to_string(),
            "invalid arguments: bad json"
        );
        assert_eq!(
            ToolError::ExecutionFailed("timeout".into()).to_string(),
            "execution failed: timeout"
        );
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = ConfigError::from(io_err);
        let s = e.to_string();
        assert!(s.starts_with("io:"), "got: {s}");
        assert!(s.contains("file not found"));
    }

    #[test]
    fn config_error_from_toml() {
        let toml_err: toml::de::Error = toml::from_str::<toml::Value>("x = [unclosed").unwrap_err();
        let e = ConfigError::from(toml_err);
        assert!(e.to_string().starts_with("toml:"));
    }

    #[test]
    fn agent_error_passes_api_display_through() {
        let e = AgentError::from(ApiError::status("OpenRouter", 429, "slow down".into(), None));
        assert_eq!(e.to_string(), "OpenRouter API error (429): slow down");
        assert_eq!(
            AgentError::UnknownTool("frobnicate".into()).to_string(),
            "unknown tool: frobnicate"
        );
    }
}
