use thiserror::Error;

/// Errors raised by the node query surface
///
/// `Clone` so a single in-flight head fetch can be shared by several waiters.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// Non-success HTTP status from the node
    #[error("RPC response error: status {status} (endpoint: {endpoint}): {body}")]
    Response {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Body could not be decoded into the expected shape
    #[error("Decode error (endpoint: {endpoint}): {message}")]
    Decode { endpoint: String, message: String },

    /// Resource does not exist on chain
    #[error("Not found: {resource}")]
    NotFound { resource: String },
}

pub type RpcResult<T> = Result<T, RpcError>;

impl RpcError {
    /// Advisory only: the library never retries on its own
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Timeout { .. } => true,
            RpcError::Response { status, .. } => *status >= 500 && *status < 600,
            RpcError::Decode { .. } => false,
            RpcError::NotFound { .. } => false,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcError::Transport { endpoint, .. } => Some(endpoint),
            RpcError::Timeout { endpoint, .. } => Some(endpoint),
            RpcError::Response { endpoint, .. } => Some(endpoint),
            RpcError::Decode { endpoint, .. } => Some(endpoint),
            RpcError::NotFound { .. } => None,
        }
    }

    /// Classify a reqwest failure against the endpoint that produced it
    pub fn from_reqwest(err: reqwest::Error, endpoint: &str, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            RpcError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms,
            }
        } else if err.is_decode() {
            RpcError::Decode {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            RpcError::Response {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            RpcError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(RpcError::Transport {
            endpoint: "test".to_string(),
            message: "connection refused".to_string(),
        }
        .is_retryable());

        assert!(RpcError::Response {
            endpoint: "test".to_string(),
            status: 502,
            body: String::new(),
        }
        .is_retryable());

        assert!(!RpcError::Response {
            endpoint: "test".to_string(),
            status: 400,
            body: String::new(),
        }
        .is_retryable());

        assert!(!RpcError::NotFound {
            resource: "contract".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_endpoint() {
        let err = RpcError::Timeout {
            endpoint: "https://node.example".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(err.endpoint(), Some("https://node.example"));
        assert_eq!(
            RpcError::NotFound {
                resource: "x".into()
            }
            .endpoint(),
            None
        );
    }
}
