//! Error types for the load testing engine.
//!
//! Defines [`LoadTestError`] for configuration and setup errors and
//! [`RequestError`] for failures of individual HTTP requests issued by
//! virtual users.

/// Errors that occur during profile parsing, validation, file I/O or setup.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the profile contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse profile TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// TOML serialization failure while writing a profile.
    #[error("Failed to serialize profile TOML: {source}")]
    ConfigSerialize {
        #[from]
        source: toml::ser::Error,
    },

    /// Semantic validation failure -- the profile parsed successfully but
    /// contains invalid values (e.g., no tasks, zero total weight).
    #[error("Profile validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the profile could not be read from disk.
    #[error("Failed to read profile '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// The target host or a rendered request URL is not a valid http(s) URL.
    #[error("Invalid target URL '{url}': {message}")]
    InvalidTarget { url: String, message: String },

    /// The per-user HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {message}")]
    Client { message: String },
}

/// Failure of a single GET request against the target server.
///
/// Each variant is a distinct error category that the metrics pipeline
/// counts and reports separately. Request errors are recorded as-is; they
/// are never retried and never abort the iteration they occur in.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The server answered with a non-2xx status code.
    #[error("HTTP {status}")]
    Http { status: u16 },

    /// The request exceeded the configured per-request timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS resolution, TCP connect, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Any other transport failure (body read, redirect loop, ...).
    #[error("Request failed: {message}")]
    Other { message: String },
}

impl RequestError {
    /// Returns the error category as a static string for metrics classification.
    ///
    /// Categories: `"http"`, `"timeout"`, `"connection"`, `"other"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::Other { .. } => "other",
        }
    }

    /// Returns `true` for 4xx responses.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Http { status } if (400..500).contains(status))
    }

    /// Returns `true` for 5xx responses.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Http { status } if *status >= 500)
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`RequestError`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else {
            Self::Other {
                message: err.to_string(),
            }
        }
    }
}
