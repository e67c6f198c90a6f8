/// A failed call to the Plaid API, classified by what the caller can do about it
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Network error while talking to Plaid: {0}")]
    Network(String),

    #[error("Plaid rejected the API credentials (HTTP {status}): {detail}")]
    Unauthorized { status: u16, detail: String },

    #[error("Plaid rejected the request (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Plaid is temporarily unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    #[error("Unexpected response from Plaid: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    pub fn from_status(status: u16, detail: String) -> Self {
        match status {
            401 | 403 => UpstreamError::Unauthorized { status, detail },
            // Plaid reports bad keys as a 400 with a dedicated error code
            400 if detail.contains("INVALID_API_KEYS") => {
                UpstreamError::Unauthorized { status, detail }
            }
            429 | 500..=599 => UpstreamError::Unavailable { status },
            _ => UpstreamError::Rejected { status, detail },
        }
    }

    /// Whether retrying the same request later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamError::Network(_) | UpstreamError::Unavailable { .. }
        )
    }
}

impl From<httpclient::InMemoryError> for UpstreamError {
    fn from(err: httpclient::InMemoryError) -> Self {
        match err {
            httpclient::Error::Protocol(err) => UpstreamError::Network(format!("{err:?}")),
            httpclient::Error::HttpError(response) => UpstreamError::from_status(
                response.status().as_u16(),
                format!("{:?}", response.body()),
            ),
        }
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        UpstreamError::InvalidResponse(err.to_string())
    }
}
