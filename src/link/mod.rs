//! Linking a new institution: a short-lived loopback server hosts Plaid Link, the
//! controller walks a [LinkSession] through its phases and stores the resulting
//! credential.

mod api;
mod controller;
mod error;
mod gate;
mod link_http_server;
mod session;

pub use api::{ExchangedItem, LinkApi};
pub use controller::{
    BrowserHandOff, HandOff, LinkController, LinkOptions, RetryPolicy, DEFAULT_TIMEOUT,
};
pub use error::{LinkError, LinkOutcome, LinkReport, LinkedInstitution};
pub use gate::{Acceptance, CallbackGate, CallbackPayload, PageEvent};
pub use link_http_server::LinkHttpServer;
pub use session::{LinkPhase, LinkSession};
