use plaid::{PlaidAuth, PlaidClient};

use super::PlaidSettings;

const PLAID_VERSION: &str = "2020-09-14";

pub struct Plaid {
    client: PlaidClient,
    settings: PlaidSettings,
}

impl Plaid {
    pub fn new(settings: PlaidSettings) -> Plaid {
        let http = httpclient::Client::new().base_url(settings.base_url());
        let auth = PlaidAuth::ClientId {
            client_id: settings.client_id.clone(),
            secret: settings.secret.clone(),
            plaid_version: PLAID_VERSION.to_string(),
        };
        Plaid {
            client: PlaidClient::new_with(http, auth),
            settings,
        }
    }

    pub(super) fn client(&self) -> &PlaidClient {
        &self.client
    }

    pub fn settings(&self) -> &PlaidSettings {
        &self.settings
    }
}
