use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use console::style;
use tokio::sync::oneshot;

use super::gate::{CallbackGate, CallbackPayload, PageEvent};
use super::link_http_server::LinkHttpServer;
use super::{
    ExchangedItem, LinkApi, LinkError, LinkOutcome, LinkPhase, LinkReport, LinkSession,
    LinkedInstitution,
};
use crate::config::Environment;
use crate::credentials::{Credential, CredentialStore, InstitutionId, StoreError};
use crate::plaid_api::PublicToken;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    /// Port of the loopback server, `0` picks a free one
    pub port: u16,
    pub timeout: Duration,
    pub exchange_retry: RetryPolicy,
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions {
            port: 0,
            timeout: DEFAULT_TIMEOUT,
            exchange_retry: RetryPolicy::default(),
        }
    }
}

/// Gets the user to the link page once it is ready
pub trait HandOff {
    fn hand_off(&self, url: &str);
}

pub struct BrowserHandOff {
    pub open_browser: bool,
}

impl HandOff for BrowserHandOff {
    fn hand_off(&self, url: &str) {
        println!("Starting in-browser link flow.");
        println!("If it doesn't open automatically, please open the following URL in your browser:");
        println!("{}", style(url).cyan().italic());
        if self.open_browser {
            if let Err(err) = open::that(url) {
                log::warn!("Failed to open the browser: {err}");
            }
        }
    }
}

/// Drives one link session from server start to a stored credential
pub struct LinkController<'a, A: LinkApi, H: HandOff> {
    api: &'a A,
    store: &'a CredentialStore,
    hand_off: H,
    environment: Environment,
    options: LinkOptions,
}

impl<'a, A: LinkApi, H: HandOff> LinkController<'a, A, H> {
    pub fn new(
        api: &'a A,
        store: &'a CredentialStore,
        hand_off: H,
        environment: Environment,
        options: LinkOptions,
    ) -> Self {
        LinkController {
            api,
            store,
            hand_off,
            environment,
            options,
        }
    }

    /// Run a full link session that Ctrl-C cancels in any phase.
    /// The loopback server is always stopped before this returns.
    pub async fn run(&self) -> Result<LinkReport, LinkError> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::warn!("Failed to listen for Ctrl-C: {err}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run a full link session that ends as cancelled once `interrupt` completes
    pub async fn run_until(
        &self,
        interrupt: impl Future<Output = ()>,
    ) -> Result<LinkReport, LinkError> {
        let mut session = LinkSession::new();
        log::info!("Starting link session {}", session.session_id());

        let (gate, events) = CallbackGate::new(session.state_token().to_string());
        let gate = Arc::new(gate);

        let result = match LinkHttpServer::start(self.options.port, gate.clone()).await {
            Ok(server) => {
                let result = tokio::select! {
                    result = self.drive(&mut session, &server, &gate, events) => result,
                    () = interrupt => {
                        log::info!("Link session interrupted");
                        Ok(LinkOutcome::Cancelled)
                    }
                };
                gate.close();
                server.stop().await;
                result
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(outcome) => {
                if !matches!(outcome, LinkOutcome::Linked(_)) {
                    session.fail();
                }
                session.stop();
                log::info!(
                    "Link session {} finished: {:?}",
                    session.session_id(),
                    outcome
                );
                Ok(LinkReport {
                    session_id: session.session_id(),
                    outcome,
                    history: session.history().to_vec(),
                })
            }
            Err(err) => {
                session.fail();
                session.stop();
                log::error!("Link session {} failed: {err}", session.session_id());
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        session: &mut LinkSession,
        server: &LinkHttpServer,
        gate: &CallbackGate,
        events: oneshot::Receiver<PageEvent>,
    ) -> Result<LinkOutcome, LinkError> {
        session.advance(LinkPhase::ServerStarted)?;

        let link_token = self
            .api
            .create_link_token(&session.session_id().to_string())
            .await
            .map_err(LinkError::UpstreamAuth)?;
        gate.issue_link_token(link_token);
        session.advance(LinkPhase::TokenIssued)?;

        self.hand_off.hand_off(&server.url());
        session.advance(LinkPhase::AwaitingCallback)?;

        let event = tokio::select! {
            event = events => event.unwrap_or(PageEvent::Cancelled),
            _ = tokio::time::sleep(self.options.timeout) => {
                if gate.rejected_count() > 0 {
                    return Err(LinkError::CallbackIntegrity("no valid callback before the timeout"));
                }
                log::warn!("Timed out after {:?} waiting for the link callback", self.options.timeout);
                return Ok(LinkOutcome::TimedOut);
            }
        };

        let payload = match event {
            PageEvent::Completed(payload) => payload,
            PageEvent::Cancelled => {
                log::info!("Link was cancelled on the page");
                return Ok(LinkOutcome::Cancelled);
            }
        };

        session.advance(LinkPhase::Exchanging)?;
        let exchanged = self.exchange(&payload.public_token).await?;
        let institution_id = self.institution_key(&exchanged, &payload).await?;

        let credential = Credential {
            institution_id: institution_id.clone(),
            item_id: exchanged.item_id.clone(),
            access_token: exchanged.access_token,
            institution_name: payload.institution_name.clone(),
            environment: self.environment,
            linked_at: Utc::now(),
        };
        self.store.put(&credential).await?;
        session.advance(LinkPhase::Persisted)?;

        Ok(LinkOutcome::Linked(LinkedInstitution {
            institution_id,
            institution_name: payload.institution_name,
            item_id: exchanged.item_id,
        }))
    }

    /// Exchange with exponential backoff. Only transient failures are retried, an
    /// expired or already used public token fails right away.
    async fn exchange(&self, public_token: &PublicToken) -> Result<ExchangedItem, LinkError> {
        let policy = self.options.exchange_retry;
        let mut backoff = policy.initial_backoff;
        let mut attempt = 0;
        loop {
            match self.api.exchange_public_token(public_token).await {
                Ok(exchanged) => return Ok(exchanged),
                Err(err) if err.is_transient() && attempt < policy.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Exchanging the public token failed ({err}), retry {attempt}/{} in {backoff:?}",
                        policy.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => return Err(LinkError::Exchange(err)),
            }
        }
    }

    /// Prefer what Plaid says about the item, then what the page reported, then the item id
    async fn institution_key(
        &self,
        exchanged: &ExchangedItem,
        payload: &CallbackPayload,
    ) -> Result<InstitutionId, LinkError> {
        let from_item = match self.api.item_institution_id(&exchanged.access_token).await {
            Ok(id) => id,
            Err(err) => {
                log::warn!("Failed to look up the institution of the new item: {err}");
                None
            }
        };
        let candidates = [
            from_item,
            payload.institution_id.clone(),
            Some(exchanged.item_id.clone()),
        ];
        let mut last_err = None;
        for candidate in candidates.into_iter().flatten() {
            match InstitutionId::new(candidate) {
                Ok(id) => return Ok(id),
                Err(err) => {
                    log::warn!("Unusable institution id: {err}");
                    last_err = Some(err);
                }
            }
        }
        Err(LinkError::Store(
            last_err.unwrap_or_else(|| StoreError::InvalidInstitutionId(String::new())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::*;
    use crate::credentials::AccessToken;
    use crate::plaid_api::{LinkToken, UpstreamError};

    const FAST_RETRY: RetryPolicy = RetryPolicy {
        max_retries: 3,
        initial_backoff: Duration::from_millis(10),
    };

    struct FakeApi {
        link_token: Mutex<Option<Result<LinkToken, UpstreamError>>>,
        exchange_results: Mutex<VecDeque<Result<ExchangedItem, UpstreamError>>>,
        exchange_calls: AtomicUsize,
        exchange_delay: Duration,
        link_token_delay: Duration,
        institution: Option<String>,
    }

    impl FakeApi {
        fn new() -> Self {
            FakeApi {
                link_token: Mutex::new(Some(Ok(LinkToken("link-sandbox-1".to_string())))),
                exchange_results: Mutex::new(VecDeque::from([Ok(exchanged())])),
                exchange_calls: AtomicUsize::new(0),
                exchange_delay: Duration::ZERO,
                link_token_delay: Duration::ZERO,
                institution: Some("ins_109508".to_string()),
            }
        }

        fn with_exchange_results(
            self,
            results: impl IntoIterator<Item = Result<ExchangedItem, UpstreamError>>,
        ) -> Self {
            *self.exchange_results.lock().unwrap() = results.into_iter().collect();
            self
        }

        fn exchange_calls(&self) -> usize {
            self.exchange_calls.load(Ordering::SeqCst)
        }
    }

    impl LinkApi for FakeApi {
        async fn create_link_token(&self, _client_user_id: &str) -> Result<LinkToken, UpstreamError> {
            tokio::time::sleep(self.link_token_delay).await;
            self.link_token
                .lock()
                .unwrap()
                .take()
                .expect("link token requested twice")
        }

        async fn exchange_public_token(
            &self,
            public_token: &PublicToken,
        ) -> Result<ExchangedItem, UpstreamError> {
            assert_eq!("public-sandbox-1", public_token.0);
            self.exchange_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.exchange_delay).await;
            self.exchange_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected exchange call")
        }

        async fn item_institution_id(
            &self,
            _access_token: &AccessToken,
        ) -> Result<Option<String>, UpstreamError> {
            Ok(self.institution.clone())
        }
    }

    fn exchanged() -> ExchangedItem {
        ExchangedItem {
            item_id: "item-1".to_string(),
            access_token: AccessToken::new("access-sandbox-1".to_string()),
        }
    }

    struct ChannelHandOff(mpsc::UnboundedSender<String>);

    impl HandOff for ChannelHandOff {
        fn hand_off(&self, url: &str) {
            self.0.send(url.to_string()).unwrap();
        }
    }

    struct Fixture {
        _tempdir: tempfile::TempDir,
        store: CredentialStore,
    }

    fn fixture() -> Fixture {
        let tempdir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tempdir.path().join("secrets"));
        Fixture {
            _tempdir: tempdir,
            store,
        }
    }

    fn options(timeout: Duration) -> LinkOptions {
        LinkOptions {
            port: 0,
            timeout,
            exchange_retry: FAST_RETRY,
        }
    }

    async fn post_callback(url: &str, state: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{url}/callback"))
            .form(&[
                ("state", state),
                ("public_token", "public-sandbox-1"),
                ("institution_id", "ins_from_page"),
                ("institution_name", "First Platypus Bank"),
            ])
            .send()
            .await
            .unwrap()
    }

    /// Reads the state token the page would use out of the served HTML
    async fn page_state(url: &str) -> String {
        let body = reqwest::get(url).await.unwrap().text().await.unwrap();
        let start = body.find("fields.state = '").unwrap() + "fields.state = '".len();
        let end = start + body[start..].find('\'').unwrap();
        body[start..end].to_string()
    }

    fn port_of(url: &str) -> u16 {
        url.rsplit(':').next().unwrap().parse().unwrap()
    }

    const FULL_HISTORY: &[LinkPhase] = &[
        LinkPhase::Idle,
        LinkPhase::ServerStarted,
        LinkPhase::TokenIssued,
        LinkPhase::AwaitingCallback,
        LinkPhase::Exchanging,
        LinkPhase::Persisted,
        LinkPhase::Stopped,
    ];

    #[tokio::test]
    async fn links_and_persists_credential() {
        let fixture = fixture();
        let api = FakeApi::new();
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            options(Duration::from_secs(30)),
        );

        let (report, url) = tokio::join!(controller.run(), async {
            let url = urls.recv().await.unwrap();
            let state = page_state(&url).await;
            assert_eq!(200, post_callback(&url, &state).await.status().as_u16());
            url
        });
        let report = report.unwrap();

        let institution_id = InstitutionId::new("ins_109508").unwrap();
        assert_eq!(
            LinkOutcome::Linked(LinkedInstitution {
                institution_id: institution_id.clone(),
                institution_name: Some("First Platypus Bank".to_string()),
                item_id: "item-1".to_string(),
            }),
            report.outcome
        );
        assert_eq!(FULL_HISTORY, report.history.as_slice());

        let credential = fixture.store.get(&institution_id).await.unwrap();
        assert_eq!("access-sandbox-1", credential.access_token.get());
        assert_eq!(Environment::Sandbox, credential.environment);

        assert!(std::net::TcpStream::connect(("127.0.0.1", port_of(&url))).is_err());
    }

    #[tokio::test]
    async fn forged_callback_is_rejected_and_session_continues() {
        let fixture = fixture();
        let mut api = FakeApi::new();
        api.exchange_delay = Duration::from_millis(300);
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            options(Duration::from_secs(30)),
        );

        let (report, _) = tokio::join!(controller.run(), async {
            let url = urls.recv().await.unwrap();
            assert_eq!(403, post_callback(&url, "forged").await.status().as_u16());

            let state = page_state(&url).await;
            assert_eq!(200, post_callback(&url, &state).await.status().as_u16());

            // Still exchanging, so the server is up and drops the duplicate
            let duplicate = post_callback(&url, &state).await;
            assert_eq!(200, duplicate.status().as_u16());
            assert!(duplicate.text().await.unwrap().contains("already completed"));
        });

        assert!(matches!(report.unwrap().outcome, LinkOutcome::Linked(_)));
        assert_eq!(1, api.exchange_calls());
    }

    #[tokio::test]
    async fn times_out_without_callback() {
        let fixture = fixture();
        let api = FakeApi::new();
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            options(Duration::from_millis(300)),
        );

        let report = controller.run().await.unwrap();
        let url = urls.recv().await.unwrap();

        assert_eq!(LinkOutcome::TimedOut, report.outcome);
        assert_eq!(
            &[LinkPhase::Errored, LinkPhase::Stopped],
            &report.history[report.history.len() - 2..]
        );
        assert!(std::net::TcpStream::connect(("127.0.0.1", port_of(&url))).is_err());
        assert_eq!(0, api.exchange_calls());
        assert!(fixture.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn timeout_after_forged_callback_is_integrity_failure() {
        let fixture = fixture();
        let api = FakeApi::new();
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            options(Duration::from_millis(500)),
        );

        let (result, _) = tokio::join!(controller.run(), async {
            let url = urls.recv().await.unwrap();
            assert_eq!(403, post_callback(&url, "forged").await.status().as_u16());
        });

        assert!(matches!(result, Err(LinkError::CallbackIntegrity(_))));
        assert_eq!(0, api.exchange_calls());
    }

    #[tokio::test]
    async fn cancel_on_page() {
        let fixture = fixture();
        let api = FakeApi::new();
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            options(Duration::from_secs(30)),
        );

        let (report, _) = tokio::join!(controller.run(), async {
            let url = urls.recv().await.unwrap();
            let state = page_state(&url).await;
            let response = reqwest::Client::new()
                .post(format!("{url}/cancel"))
                .form(&[("state", state.as_str())])
                .send()
                .await
                .unwrap();
            assert_eq!(200, response.status().as_u16());
        });

        assert_eq!(LinkOutcome::Cancelled, report.unwrap().outcome);
        assert_eq!(0, api.exchange_calls());
    }

    #[tokio::test]
    async fn failing_link_token_is_upstream_auth_error() {
        let fixture = fixture();
        let api = FakeApi::new();
        *api.link_token.lock().unwrap() = Some(Err(UpstreamError::from_status(
            400,
            "INVALID_API_KEYS".to_string(),
        )));
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            options(Duration::from_secs(30)),
        );

        let result = controller.run().await;

        assert!(matches!(result, Err(LinkError::UpstreamAuth(_))));
        assert!(urls.try_recv().is_err());
    }

    #[tokio::test]
    async fn transient_exchange_failures_are_retried() {
        let fixture = fixture();
        let api = FakeApi::new().with_exchange_results([
            Err(UpstreamError::Network("connection reset".to_string())),
            Err(UpstreamError::from_status(503, String::new())),
            Ok(exchanged()),
        ]);
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Production,
            options(Duration::from_secs(30)),
        );

        let (report, _) = tokio::join!(controller.run(), async {
            let url = urls.recv().await.unwrap();
            let state = page_state(&url).await;
            post_callback(&url, &state).await;
        });

        assert!(matches!(report.unwrap().outcome, LinkOutcome::Linked(_)));
        assert_eq!(3, api.exchange_calls());
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let fixture = fixture();
        let api = FakeApi::new().with_exchange_results(
            (0..4).map(|_| Err(UpstreamError::Network("timeout".to_string()))),
        );
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            options(Duration::from_secs(30)),
        );

        let (result, _) = tokio::join!(controller.run(), async {
            let url = urls.recv().await.unwrap();
            let state = page_state(&url).await;
            post_callback(&url, &state).await;
        });

        assert!(matches!(result, Err(LinkError::Exchange(UpstreamError::Network(_)))));
        assert_eq!(4, api.exchange_calls());
    }

    #[tokio::test]
    async fn expired_public_token_is_not_retried() {
        let fixture = fixture();
        let api = FakeApi::new().with_exchange_results([Err(UpstreamError::from_status(
            400,
            "INVALID_PUBLIC_TOKEN".to_string(),
        ))]);
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            options(Duration::from_secs(30)),
        );

        let (result, _) = tokio::join!(controller.run(), async {
            let url = urls.recv().await.unwrap();
            let state = page_state(&url).await;
            post_callback(&url, &state).await;
        });

        assert!(matches!(result, Err(LinkError::Exchange(UpstreamError::Rejected { .. }))));
        assert_eq!(1, api.exchange_calls());
        assert!(fixture.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_page_institution_id() {
        let fixture = fixture();
        let mut api = FakeApi::new();
        api.institution = None;
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            options(Duration::from_secs(30)),
        );

        let (report, _) = tokio::join!(controller.run(), async {
            let url = urls.recv().await.unwrap();
            let state = page_state(&url).await;
            post_callback(&url, &state).await;
        });

        let LinkOutcome::Linked(linked) = report.unwrap().outcome else {
            panic!("expected a linked institution");
        };
        assert_eq!("ins_from_page", linked.institution_id.as_str());
    }

    #[tokio::test]
    async fn occupied_port_is_bind_error() {
        let fixture = fixture();
        let api = FakeApi::new();
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let (url_sender, _urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            LinkOptions {
                port: occupied.local_addr().unwrap().port(),
                ..options(Duration::from_secs(30))
            },
        );

        assert!(matches!(controller.run().await, Err(LinkError::ServerBind(_))));
    }

    #[tokio::test]
    async fn interrupt_while_creating_link_token_stops_server() {
        let fixture = fixture();
        let mut api = FakeApi::new();
        api.link_token_delay = Duration::from_secs(30);
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            options(Duration::from_secs(30)),
        );

        let report = controller
            .run_until(tokio::time::sleep(Duration::from_millis(200)))
            .await
            .unwrap();

        assert_eq!(LinkOutcome::Cancelled, report.outcome);
        assert_eq!(
            &[
                LinkPhase::Idle,
                LinkPhase::ServerStarted,
                LinkPhase::Errored,
                LinkPhase::Stopped
            ],
            report.history.as_slice()
        );
        assert!(urls.try_recv().is_err());
    }

    #[tokio::test]
    async fn interrupt_while_exchanging_cancels_and_stores_nothing() {
        let fixture = fixture();
        let mut api = FakeApi::new();
        api.exchange_delay = Duration::from_secs(30);
        let (url_sender, mut urls) = mpsc::unbounded_channel();
        let (interrupt_sender, interrupt) = oneshot::channel::<()>();
        let controller = LinkController::new(
            &api,
            &fixture.store,
            ChannelHandOff(url_sender),
            Environment::Sandbox,
            options(Duration::from_secs(30)),
        );

        let (report, url) = tokio::join!(
            controller.run_until(async {
                let _ = interrupt.await;
            }),
            async {
                let url = urls.recv().await.unwrap();
                let state = page_state(&url).await;
                assert_eq!(200, post_callback(&url, &state).await.status().as_u16());
                while api.exchange_calls() == 0 {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                interrupt_sender.send(()).unwrap();
                url
            }
        );
        let report = report.unwrap();

        assert_eq!(LinkOutcome::Cancelled, report.outcome);
        assert_eq!(
            &[LinkPhase::Exchanging, LinkPhase::Errored, LinkPhase::Stopped],
            &report.history[report.history.len() - 3..]
        );
        assert!(std::net::TcpStream::connect(("127.0.0.1", port_of(&url))).is_err());
        assert!(fixture.store.list().await.unwrap().is_empty());
    }
}
