use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use rocket::{
    fairing::AdHoc,
    form::Form,
    get,
    http::Status,
    post,
    response::content::RawHtml,
    routes, Config, FromForm, Ignite, Rocket, Shutdown, State,
};
use tokio::{sync::oneshot, task::JoinHandle};

use super::gate::{Acceptance, CallbackGate, CallbackPayload, PageEvent};
use super::LinkError;
use crate::plaid_api::PublicToken;

const LISTEN_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

struct ServerState {
    gate: Arc<CallbackGate>,
}

/// Loopback server that hosts the Plaid Link page and receives its result
pub struct LinkHttpServer {
    port: u16,
    shutdown: Shutdown,
    task: JoinHandle<Result<Rocket<Ignite>, rocket::Error>>,
}

impl LinkHttpServer {
    /// Bind to `port` on the loopback interface, `0` picks a free port
    pub async fn start(port: u16, gate: Arc<CallbackGate>) -> Result<LinkHttpServer, LinkError> {
        let (port_sender, port_receiver) = oneshot::channel();
        let server = rocket::custom(Config {
            log_level: rocket::config::LogLevel::Critical,
            address: LISTEN_ADDR,
            port,
            keep_alive: 0,
            shutdown: rocket::config::Shutdown {
                ctrlc: false,
                grace: 1,
                mercy: 1,
                ..Default::default()
            },
            ..Config::default()
        })
        .manage(ServerState { gate })
        .mount(
            "/",
            routes![show_auth_page, submit_token_api, cancel_api, favicon],
        )
        .attach(AdHoc::on_liftoff("Bound port", move |rocket| {
            Box::pin(async move {
                let _ = port_sender.send(rocket.config().port);
            })
        }))
        .ignite()
        .await
        .map_err(|err| LinkError::ServerBind(err.kind().to_string()))?;

        let shutdown = server.shutdown();
        let task = tokio::spawn(server.launch());

        // The sender is dropped without sending if launching fails
        let port = match port_receiver.await {
            Ok(port) => port,
            Err(_) => {
                let reason = match task.await {
                    Ok(Err(err)) => err.kind().to_string(),
                    Ok(Ok(_)) => "server stopped before it was ready".to_string(),
                    Err(err) => err.to_string(),
                };
                return Err(LinkError::ServerBind(reason));
            }
        };
        log::info!("Link server listening on {LISTEN_ADDR}:{port}");

        Ok(LinkHttpServer {
            port,
            shutdown,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://{LISTEN_ADDR}:{}", self.port)
    }

    /// Shut down and wait until the listening socket is closed
    pub async fn stop(self) {
        self.shutdown.notify();
        match self.task.await {
            Ok(Ok(_)) => log::info!("Link server stopped"),
            Ok(Err(err)) => log::warn!("Link server stopped with error: {}", err.kind()),
            Err(err) => log::warn!("Link server task failed: {err}"),
        }
    }
}

#[derive(FromForm)]
struct CallbackForm<'r> {
    state: Option<&'r str>,
    public_token: Option<&'r str>,
    institution_id: Option<&'r str>,
    institution_name: Option<&'r str>,
}

#[derive(FromForm)]
struct CancelForm<'r> {
    state: Option<&'r str>,
}

#[get("/")]
fn show_auth_page(state: &State<ServerState>) -> (Status, RawHtml<String>) {
    match state.gate.link_token() {
        Some(link_token) => (
            Status::Ok,
            RawHtml(auth_page(&link_token.0, state.gate.state_token())),
        ),
        None => (
            Status::ServiceUnavailable,
            RawHtml(message_page("Not ready", "Reload this page in a moment.")),
        ),
    }
}

#[post("/callback", data = "<form>")]
fn submit_token_api(
    form: Form<CallbackForm<'_>>,
    state: &State<ServerState>,
) -> (Status, RawHtml<String>) {
    let Some(public_token) = form.public_token.filter(|token| !token.is_empty()) else {
        return (
            Status::BadRequest,
            RawHtml(message_page("Error", "The callback carried no public token.")),
        );
    };
    let event = PageEvent::Completed(CallbackPayload {
        public_token: PublicToken(public_token.to_string()),
        institution_id: non_empty(form.institution_id),
        institution_name: non_empty(form.institution_name),
    });
    respond(state.gate.submit(form.state, event))
}

#[post("/cancel", data = "<form>")]
fn cancel_api(form: Form<CancelForm<'_>>, state: &State<ServerState>) -> (Status, RawHtml<String>) {
    respond(state.gate.submit(form.state, PageEvent::Cancelled))
}

#[get("/favicon.ico")]
fn favicon() -> Status {
    Status::NoContent
}

fn respond(result: Result<Acceptance, LinkError>) -> (Status, RawHtml<String>) {
    match result {
        Ok(Acceptance::Accepted) => (
            Status::Ok,
            RawHtml(message_page("Done", "You can close this page now.")),
        ),
        Ok(Acceptance::AlreadyCompleted) => (
            Status::Ok,
            RawHtml(message_page(
                "Done",
                "This link session was already completed. You can close this page now.",
            )),
        ),
        Err(_) => (
            Status::Forbidden,
            RawHtml(message_page("Rejected", "This request does not belong to the current link session.")),
        ),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}

fn auth_page(link_token: &str, state_token: &str) -> String {
    format!(
        r#"
        <html>
            <head><title>yapcli</title></head>
            <body>
                <p id="status">Opening Plaid Link...</p>
                <script src="https://cdn.plaid.com/link/v2/stable/link-initialize.js"></script>
                <script>
                    function report(path, fields) {{
                        fields.state = '{state_token}';
                        return fetch(path, {{
                            method: 'POST',
                            headers: {{ 'Content-Type': 'application/x-www-form-urlencoded' }},
                            body: new URLSearchParams(fields).toString(),
                        }}).then(function(response) {{
                            return response.text();
                        }}).then(function(html) {{
                            document.open();
                            document.write(html);
                            document.close();
                        }});
                    }}
                    var linkHandler = Plaid.create({{
                        token: '{link_token}',
                        onLoad: function() {{
                            linkHandler.open();
                        }},
                        onSuccess: function(public_token, metadata) {{
                            var institution = metadata.institution || {{}};
                            report('/callback', {{
                                public_token: public_token,
                                institution_id: institution.institution_id || '',
                                institution_name: institution.name || '',
                            }});
                        }},
                        onExit: function(err, metadata) {{
                            if (err != null) {{
                                console.log('Plaid Link exited with error: ' + JSON.stringify(err));
                            }}
                            report('/cancel', {{}});
                        }}
                    }});
                </script>
            </body>
        </html>
    "#
    )
}

fn message_page(title: &str, message: &str) -> String {
    format!(
        r#"
        <html>
            <body>
                <h1>{title}</h1>
                <p>{message}</p>
            </body>
        </html>
    "#
    )
}
