use thiserror::Error;

/// Errors raised while loading or querying the network model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid IPv4 address: {0}")]
    InvalidIp(String),
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),
    #[error("duplicate router name: {0}")]
    DuplicateRouter(String),
    #[error("unknown router: {0}")]
    UnknownRouter(String),
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("unknown {kind} `{value}`")]
    UnknownOption { kind: &'static str, value: String },
    #[error("malformed network description: {0}")]
    Json(#[from] serde_json::Error),
}
