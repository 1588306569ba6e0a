use reqwest::StatusCode;

/// Failure of a single upstream call. Nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Could not connect, timed out, or the connection broke down.
    #[error("Failed to connect to Home Assistant: {0}")]
    ConnectionFailure(String),

    /// The API responded with a non-2xx status.
    #[error("Home Assistant API error: {} - {body}", .status.as_u16())]
    UpstreamError { status: StatusCode, body: String },

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl Error {
    /// Classify a failure to send the request.
    pub fn from_transport(error: reqwest::Error) -> Self {
        if error.is_builder() {
            Self::UnexpectedError(describe(error))
        } else {
            Self::ConnectionFailure(describe(error))
        }
    }

    /// Classify a failure to read or decode the response body.
    pub fn from_body(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            Self::ConnectionFailure(describe(error))
        } else {
            Self::UnexpectedError(describe(error))
        }
    }
}

/// Render the whole cause chain, the way `anyhow` does it.
fn describe(error: reqwest::Error) -> String {
    format!("{:#}", anyhow::Error::from(error))
}
