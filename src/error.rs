//! Error types for the WordPress publishing server.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for publishing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types surfaced by the registry, the REST clients and the tool boundary
#[derive(Debug, Error)]
pub enum Error {
    /// Requested site id is not present in the registry
    #[error("Site not found: {0}")]
    SiteNotFound(String),

    /// WordPress rejected the credentials (401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Connection failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Media upload rejected by WordPress or the hosting layer
    #[error("Upload failed ({status}): {message}")]
    Upload { status: u16, message: String },

    /// Post creation rejected by WordPress
    #[error("Publish failed ({status}): {message}")]
    Publish { status: u16, message: String },

    /// Unexpected non-success response from a read or taxonomy write
    #[error("WordPress API error ({status}): {message}")]
    RemoteApi { status: u16, message: String },

    /// Image API call failed at runtime
    #[error("Image generation failed: {0}")]
    ImageGeneration(String),

    /// No usable image API credential is configured
    #[error("Image generation unavailable: {0}")]
    ImageGenerationUnavailable(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid tool parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Unknown tool name
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Unknown JSON-RPC method
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire form of an error returned across the tool boundary
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl Error {
    /// Stable error kind name exposed to the assistant client
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SiteNotFound(_) => "SiteNotFound",
            Error::Authentication(_) => "AuthenticationError",
            Error::Network(_) => "NetworkError",
            Error::Upload { .. } => "UploadError",
            Error::Publish { .. } => "PublishError",
            Error::RemoteApi { .. } => "RemoteApiError",
            Error::ImageGeneration(_) => "ImageGenerationError",
            Error::ImageGenerationUnavailable(_) => "ImageGenerationUnavailable",
            Error::Configuration(_) => "ConfigurationError",
            Error::InvalidParams(_) => "InvalidParams",
            Error::ToolNotFound(_) => "ToolNotFound",
            Error::MethodNotFound(_) => "MethodNotFound",
            Error::Json(_) => "SerializationError",
            Error::Io(_) => "IoError",
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Upload { status, .. }
            | Error::Publish { status, .. }
            | Error::RemoteApi { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Convert error to JSON-RPC error code
    pub fn to_json_rpc_code(&self) -> i32 {
        match self {
            Error::Json(_) => -32700,
            Error::MethodNotFound(_) => -32601,
            Error::InvalidParams(_) | Error::ToolNotFound(_) => -32602,
            Error::Io(_) => -32603,
            _ => -32000,
        }
    }

    /// Structured `{kind, message}` report
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind().to_string(),
            message: self.to_string(),
            status: self.status(),
        }
    }

    /// Operator-facing hint appended to tool error text
    pub fn diagnosis(&self) -> Option<&'static str> {
        match self {
            Error::Upload { status: 406, .. } => Some(
                "The hosting provider's security layer (e.g. ModSecurity) blocked the upload; ask them to allow REST API media uploads.",
            ),
            Error::Authentication(_) => {
                Some("Check the site's username and Application Password and the user's role.")
            }
            Error::Network(_) => Some("Check that the site URL is reachable and not timing out."),
            Error::ImageGeneration(_) | Error::ImageGenerationUnavailable(_) => {
                Some("Check the image API key and the account's remaining credits.")
            }
            Error::SiteNotFound(_) => Some("Use list_wordpress_sites to see the configured site ids."),
            _ => None,
        }
    }

    /// Classify a reqwest transport failure
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Network(format!("request timed out: {}", err))
        } else if err.is_connect() {
            Error::Network(format!("connection failed: {}", err))
        } else {
            Error::Network(err.to_string())
        }
    }
}
