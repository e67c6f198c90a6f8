use plaid::model::{LinkTokenCreateRequestUser, LinkTokenTransactions};
use plaid::request::LinkTokenCreateRequired;

use super::{client::Plaid, LinkToken, PlaidSettings, PublicToken, UpstreamError};
use crate::credentials::AccessToken;
use crate::link::{ExchangedItem, LinkApi};

const CLIENT_NAME: &str = "yapcli";
const LANGUAGE: &str = "en";

impl LinkApi for Plaid {
    async fn create_link_token(&self, client_user_id: &str) -> Result<LinkToken, UpstreamError> {
        let settings = self.settings();
        let country_codes: Vec<&str> = settings.country_codes.iter().map(String::as_str).collect();
        let products: Vec<&str> = settings.products.iter().map(String::as_str).collect();

        let mut request = self
            .client()
            .link_token_create(LinkTokenCreateRequired {
                client_name: CLIENT_NAME,
                country_codes: &country_codes,
                language: LANGUAGE,
                user: LinkTokenCreateRequestUser {
                    client_user_id: client_user_id.to_string(),
                    ..Default::default()
                },
            })
            .products(&products);
        if let Some(redirect_uri) = &settings.redirect_uri {
            request = request.redirect_uri(redirect_uri);
        }
        if let Some(transactions) = transactions_options(settings) {
            request = request.transactions(transactions);
        }
        let response = request.await?;
        log::info!("Created link token for products {}", products.join(","));
        Ok(LinkToken(response.link_token))
    }

    async fn exchange_public_token(
        &self,
        public_token: &PublicToken,
    ) -> Result<ExchangedItem, UpstreamError> {
        let response = self
            .client()
            .item_public_token_exchange(&public_token.0)
            .await?;
        log::info!("Exchanged public token for item {}", response.item_id);
        Ok(ExchangedItem {
            item_id: response.item_id,
            access_token: AccessToken::new(response.access_token),
        })
    }

    async fn item_institution_id(
        &self,
        access_token: &AccessToken,
    ) -> Result<Option<String>, UpstreamError> {
        let response = self.client().item_get(access_token.get()).await?;
        let response = serde_json::to_value(&response)?;
        Ok(response
            .pointer("/item/institution_id")
            .and_then(|id| id.as_str())
            .filter(|id| !id.is_empty())
            .map(str::to_string))
    }
}

/// How much transaction history to ask for, only sent when transactions are requested
fn transactions_options(settings: &PlaidSettings) -> Option<LinkTokenTransactions> {
    settings
        .products
        .iter()
        .any(|product| product == "transactions")
        .then(|| LinkTokenTransactions {
            days_requested: Some(i64::from(settings.days_requested)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{merge_layers, ConfigSource, Setting, SourceLayer};

    fn settings(values: &[(Setting, &str)]) -> PlaidSettings {
        let mut layer = SourceLayer::new(ConfigSource::Environment)
            .with(Setting::ClientId, "client")
            .with(Setting::Secret, "secret");
        for (setting, value) in values {
            layer = layer.with(*setting, *value);
        }
        PlaidSettings::from_config(&merge_layers([layer])).unwrap()
    }

    #[test]
    fn requests_a_year_of_transactions_by_default() {
        let transactions = transactions_options(&settings(&[])).unwrap();
        assert_eq!(
            serde_json::json!({"days_requested": 365}),
            serde_json::to_value(&transactions).unwrap()
        );
    }

    #[test]
    fn requests_configured_days() {
        let transactions =
            transactions_options(&settings(&[(Setting::DaysRequested, "30")])).unwrap();
        assert_eq!(Some(30), transactions.days_requested);
    }

    #[test]
    fn no_transactions_options_without_transactions_product() {
        assert!(transactions_options(&settings(&[(Setting::Products, "investments")])).is_none());
    }
}
