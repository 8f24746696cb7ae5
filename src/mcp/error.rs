use crate::mcp::JsonRpcError;
use thiserror::Error;

/// Protocol-level failures. Domain failures travel inside tool results.
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        match self {
            McpError::Parse(_) => -32700,
            McpError::InvalidRequest(_) => -32600,
            McpError::MethodNotFound(_) => -32601,
            McpError::InvalidParams(_) | McpError::ToolNotFound(_) => -32602,
            McpError::Internal(_) | McpError::Serialization(_) => -32603,
        }
    }
}

impl From<crate::error::Error> for McpError {
    fn from(err: crate::error::Error) -> Self {
        use crate::error::Error;
        match err {
            Error::InvalidParams(msg) => McpError::InvalidParams(msg),
            Error::ToolNotFound(name) => McpError::ToolNotFound(name),
            Error::MethodNotFound(name) => McpError::MethodNotFound(name),
            Error::Json(e) => McpError::Serialization(e),
            other => McpError::Internal(other.to_string()),
        }
    }
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        JsonRpcError {
            code: err.code(),
            message: err.to_string(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(McpError::Parse("x".into()).code(), -32700);
        assert_eq!(McpError::MethodNotFound("x".into()).code(), -32601);
        let rpc: JsonRpcError = McpError::ToolNotFound("nope".into()).into();
        assert_eq!(rpc.code, -32602);
        assert!(rpc.message.contains("nope"));
    }

    #[test]
    fn test_domain_error_mapping() {
        let err: McpError = crate::error::Error::InvalidParams("title is required".into()).into();
        assert!(matches!(err, McpError::InvalidParams(_)));
        let err: McpError = crate::error::Error::Network("down".into()).into();
        assert_eq!(err.code(), -32603);
    }
}
