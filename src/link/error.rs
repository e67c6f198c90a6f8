use uuid::Uuid;

use super::LinkPhase;
use crate::credentials::{InstitutionId, StoreError};
use crate::plaid_api::UpstreamError;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Failed to start the local link server: {0}")]
    ServerBind(String),

    #[error("Plaid refused to create a link token, check PLAID_CLIENT_ID, the secret and PLAID_ENV")]
    UpstreamAuth(#[source] UpstreamError),

    #[error("Rejected a link callback that did not belong to this session ({0})")]
    CallbackIntegrity(&'static str),

    #[error("Failed to exchange the public token for an access token")]
    Exchange(#[source] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid link session transition {from} -> {to}")]
    InvalidTransition { from: LinkPhase, to: LinkPhase },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedInstitution {
    pub institution_id: InstitutionId,
    pub institution_name: Option<String>,
    pub item_id: String,
}

/// How a link session ended, if it didn't fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked(LinkedInstitution),
    /// The user cancelled on the page or interrupted the process
    Cancelled,
    /// Nothing happened before the wait timed out
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub session_id: Uuid,
    pub outcome: LinkOutcome,
    pub history: Vec<LinkPhase>,
}
