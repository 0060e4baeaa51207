use thiserror::Error;

/// Transport-layer failures talking to the gateway or an external probe target.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("http error: {0}")]
    Http(String),
}

/// Errors surfaced while polling the gateway and decoding its payload.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to parse gateway payload: {0}")]
    Parse(String),

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl GatewayError {
    /// The taxonomy tag from spec.md §4.1 / §7, used for log lines and the
    /// HTTP error body's `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Transport(TransportError::Timeout) => "timeout",
            GatewayError::Transport(TransportError::ConnectionRefused) => "connection_refused",
            GatewayError::Transport(TransportError::Http(_)) => "http_error",
            GatewayError::Parse(_) => "parse_error",
            GatewayError::CircuitOpen => "unknown",
            GatewayError::Storage(_) => "unknown",
        }
    }
}

/// Errors from the storage contract (§4.2, §7).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("insert failed: {0}")]
    InsertFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("failed to read row: {0}")]
    ParseRow(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Errors from the speedtest orchestrator (§4.5, §7).
#[derive(Error, Debug)]
pub enum SpeedtestError {
    #[error("no speedtest tool is available")]
    NoTool,

    #[error("orchestrator is already running a test")]
    Busy,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from the scheduler facade (§4.6, §7).
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler is not running")]
    NotRunning,

    #[error("invalid scheduler configuration: {0}")]
    Config(String),
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
