use thiserror::Error;

/// Validation failures for mutating operations.
///
/// Returned before any write is attempted; a validation failure never leaves
/// partially-applied state behind.
#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error("missing required parameter: {name}")]
    MissingParameter { name: String },

    #[error("parameter '{key}' is not modifiable for function '{function}'")]
    DisallowedParameter { key: String, function: String },

    #[error("expiry window must be between {min} and {max} minutes, got {minutes}")]
    InvalidExpiryWindow { minutes: i64, min: i64, max: i64 },

    #[error("invalid address: {value}")]
    InvalidAddress { value: String },

    #[error("invalid wei amount: {value}")]
    InvalidAmount { value: String },

    #[error("strategy must define 2 to 3 functions, got {count}")]
    InvalidFunctionCount { count: usize },

    #[error("strategy '{strategy}' has no function '{name}'")]
    UnknownFunction { name: String, strategy: String },

    #[error("parameters must be a JSON object")]
    ParametersNotObject,
}

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("expired: {0}")]
    Expired(String),

    #[error("transient infrastructure error: {0}")]
    Transient(String),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] with the given resource kind and id.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(err))
    }
}
