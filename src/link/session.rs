use std::fmt::{Display, Formatter};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore as _};
use uuid::Uuid;

use super::LinkError;

const STATE_TOKEN_BYTES: usize = 32;

/// Where a link session is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Idle,
    ServerStarted,
    TokenIssued,
    AwaitingCallback,
    Exchanging,
    Persisted,
    Errored,
    Stopped,
}

impl LinkPhase {
    pub fn can_transition_to(self, next: LinkPhase) -> bool {
        use LinkPhase::*;
        match (self, next) {
            (Stopped, _) => false,
            (Errored, Stopped) => true,
            (Errored, _) => false,
            (_, Errored) | (_, Stopped) => true,
            (Idle, ServerStarted)
            | (ServerStarted, TokenIssued)
            | (TokenIssued, AwaitingCallback)
            | (AwaitingCallback, Exchanging)
            | (Exchanging, Persisted) => true,
            _ => false,
        }
    }
}

impl Display for LinkPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LinkPhase::Idle => "IDLE",
            LinkPhase::ServerStarted => "SERVER_STARTED",
            LinkPhase::TokenIssued => "TOKEN_ISSUED",
            LinkPhase::AwaitingCallback => "AWAITING_CALLBACK",
            LinkPhase::Exchanging => "EXCHANGING",
            LinkPhase::Persisted => "PERSISTED",
            LinkPhase::Errored => "ERRORED",
            LinkPhase::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// One in-memory attempt to link an institution. Never persisted.
#[derive(Debug)]
pub struct LinkSession {
    session_id: Uuid,
    created_at: DateTime<Utc>,
    state_token: String,
    phase: LinkPhase,
    history: Vec<LinkPhase>,
}

impl LinkSession {
    pub fn new() -> Self {
        let mut state_bytes = [0; STATE_TOKEN_BYTES];
        OsRng.fill_bytes(&mut state_bytes);
        Self {
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            state_token: URL_SAFE_NO_PAD.encode(state_bytes),
            phase: LinkPhase::Idle,
            history: vec![LinkPhase::Idle],
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state_token(&self) -> &str {
        &self.state_token
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    /// All phases this session went through, in order
    pub fn history(&self) -> &[LinkPhase] {
        &self.history
    }

    pub fn advance(&mut self, next: LinkPhase) -> Result<(), LinkError> {
        if !self.phase.can_transition_to(next) {
            return Err(LinkError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        log::debug!(
            "Link session {}: {} -> {}",
            self.session_id,
            self.phase,
            next
        );
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to ERRORED unless the session already is there or beyond
    pub fn fail(&mut self) {
        if self.phase.can_transition_to(LinkPhase::Errored) {
            // can_transition_to was checked, this can't fail
            let _ = self.advance(LinkPhase::Errored);
        }
    }

    pub fn stop(&mut self) {
        if self.phase.can_transition_to(LinkPhase::Stopped) {
            let _ = self.advance(LinkPhase::Stopped);
        }
    }
}

impl Default for LinkSession {
    fn default() -> Self {
        Self::new()
    }
}
