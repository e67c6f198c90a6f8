use std::process::ExitCode;

use crate::config::ConfigError;
use crate::credentials::StoreError;
use crate::link::LinkError;
use crate::plaid_api::UpstreamError;

pub const GENERIC_FAILURE: u8 = 1;
pub const CONFIGURATION_ERROR: u8 = 3;
pub const UPSTREAM_ERROR: u8 = 4;
pub const STORE_ERROR: u8 = 5;
pub const LINK_CANCELLED: u8 = 6;
pub const LINK_TIMED_OUT: u8 = 7;

/// How a command ended when it didn't fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Success,
    LinkCancelled,
    LinkTimedOut,
}

impl Termination {
    pub fn code(self) -> u8 {
        match self {
            Termination::Success => 0,
            Termination::LinkCancelled => LINK_CANCELLED,
            Termination::LinkTimedOut => LINK_TIMED_OUT,
        }
    }
}

impl From<Termination> for ExitCode {
    fn from(termination: Termination) -> Self {
        ExitCode::from(termination.code())
    }
}

/// Exit code for a failed command, from the outermost domain error in the chain
pub fn for_error(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.is::<ConfigError>() {
            return CONFIGURATION_ERROR;
        }
        if cause.is::<UpstreamError>() {
            return UPSTREAM_ERROR;
        }
        if cause.is::<StoreError>() {
            return STORE_ERROR;
        }
        if let Some(err) = cause.downcast_ref::<LinkError>() {
            return match err {
                LinkError::UpstreamAuth(_)
                | LinkError::Exchange(_)
                | LinkError::CallbackIntegrity(_) => UPSTREAM_ERROR,
                LinkError::Store(_) => STORE_ERROR,
                LinkError::ServerBind(_) | LinkError::InvalidTransition { .. } => GENERIC_FAILURE,
            };
        }
    }
    GENERIC_FAILURE
}
