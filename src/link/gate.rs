use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use tokio::sync::oneshot;

use super::LinkError;
use crate::plaid_api::{LinkToken, PublicToken};

/// What the hand-off page reported back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Completed(CallbackPayload),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    pub public_token: PublicToken,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Accepted,
    /// A result was already delivered, this one was dropped
    AlreadyCompleted,
}

/// Shared between the HTTP handlers and the controller. Checks the state token of
/// incoming callbacks and delivers at most one event to the controller.
#[derive(Debug)]
pub struct CallbackGate {
    state_token: String,
    link_token: RwLock<Option<LinkToken>>,
    sender: Mutex<Option<oneshot::Sender<PageEvent>>>,
    rejected: AtomicUsize,
}

impl CallbackGate {
    pub fn new(state_token: String) -> (CallbackGate, oneshot::Receiver<PageEvent>) {
        let (sender, receiver) = oneshot::channel();
        let gate = CallbackGate {
            state_token,
            link_token: RwLock::new(None),
            sender: Mutex::new(Some(sender)),
            rejected: AtomicUsize::new(0),
        };
        (gate, receiver)
    }

    pub fn state_token(&self) -> &str {
        &self.state_token
    }

    pub fn issue_link_token(&self, link_token: LinkToken) {
        *self
            .link_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(link_token);
    }

    pub fn link_token(&self) -> Option<LinkToken> {
        self.link_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn submit(&self, state: Option<&str>, event: PageEvent) -> Result<Acceptance, LinkError> {
        let Some(state) = state else {
            return Err(self.reject("missing state"));
        };
        if !constant_time_eq(state.as_bytes(), self.state_token.as_bytes()) {
            return Err(self.reject("state mismatch"));
        }

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => {
                if sender.send(event).is_err() {
                    log::debug!("Link session stopped waiting before the callback arrived");
                    return Ok(Acceptance::AlreadyCompleted);
                }
                Ok(Acceptance::Accepted)
            }
            None => {
                log::info!("Ignoring duplicate link callback");
                Ok(Acceptance::AlreadyCompleted)
            }
        }
    }

    /// Stop accepting events. Later callbacks are acknowledged and dropped.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    fn reject(&self, reason: &'static str) -> LinkError {
        self.rejected.fetch_add(1, Ordering::SeqCst);
        log::warn!("Rejected link callback: {reason}");
        LinkError::CallbackIntegrity(reason)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
