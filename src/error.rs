use thiserror::Error;

/// Error taxonomy for the geofence sync core.
///
/// `Validation` is always caught before any network call. `Network` and
/// 5xx `Server` errors are transient; 4xx `Server` errors are user-fixable.
/// `Reconciliation` means a mutation succeeded but the confirming re-list
/// failed, so the UI must not claim success.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server error ({status}): {message}")]
    Server {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("reconciliation failed after successful mutation: {0}")]
    Reconciliation(String),

    #[error("a submission is already in flight for this draft")]
    SubmissionInFlight,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a retry of the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Network(_) => true,
            AppError::Server { status, .. } => *status >= 500,
            AppError::Reconciliation(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_status() {
            AppError::Server {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                code: None,
                message: err.to_string(),
            }
        } else {
            AppError::Network(err.to_string())
        }
    }
}
