//! Error types for the lingomerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// The API credential could not be found in the env file or environment.
    #[error("required credential '{var}' is not set (looked in {source_desc})")]
    CredentialMissing { var: String, source_desc: String },

    /// The dotenv credential file could not be read.
    #[error("failed to read credential file '{path}': {detail}")]
    CredentialFile { path: String, detail: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Scan errors
// ---------------------------------------------------------------------------

/// Errors from walking the codebase and reading candidate files.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The codebase root does not exist or is not a directory.
    #[error("codebase root not found or not a directory: {0}")]
    RootNotFound(String),

    /// Directory traversal failed.
    #[error("failed to walk '{path}': {detail}")]
    WalkFailed { path: String, detail: String },

    /// Generic I/O wrapper.
    #[error("scan I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// LLM errors
// ---------------------------------------------------------------------------

/// Errors from the LLM translation API.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("LLM HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("LLM API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// The response carried no usable choice or content.
    #[error("invalid response from LLM API: {0}")]
    InvalidResponse(String),

    /// The closeness verdict could not be interpreted.
    #[error("could not interpret closeness verdict: {0}")]
    VerdictParse(String),

    /// The translated text still looks like the source language.
    #[error("translation failed {language} validation: output still looks like English")]
    ValidationFailed { language: String },
}

// ---------------------------------------------------------------------------
// Resolve errors
// ---------------------------------------------------------------------------

/// Errors from rendering and writing resolved files.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The number of resolutions does not match the number of conflict blocks.
    #[error("expected {expected} resolutions, got {actual}")]
    ResolutionCountMismatch { expected: usize, actual: usize },

    /// Writing the resolved file failed.
    #[error("failed to write '{path}': {detail}")]
    WriteFailed { path: String, detail: String },

    /// Generic I/O wrapper.
    #[error("resolve I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// CoreError implements `std::error::Error` via `thiserror`, which means
// `anyhow::Error: From<CoreError>` is already provided by the blanket impl
// in `anyhow`.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ConfigError::CredentialMissing {
            var: "OPENAI_API_KEY".into(),
            source_desc: "process environment".into(),
        };
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = LlmError::ApiError {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "LLM API error (HTTP 429): rate limited");

        let err = ResolveError::ResolutionCountMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "expected 3 resolutions, got 2");

        let err = LlmError::ValidationFailed {
            language: "French".into(),
        };
        assert!(err.to_string().contains("French"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = ScanError::RootNotFound("/nope".into()).into();
        assert!(matches!(core_err, CoreError::Scan(_)));

        let core_err: CoreError = LlmError::InvalidResponse("no choices".into()).into();
        assert!(matches!(core_err, CoreError::Llm(_)));
    }
}
