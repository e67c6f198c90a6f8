use crate::credentials::AccessToken;
use crate::plaid_api::{LinkToken, PublicToken, UpstreamError};

/// Result of exchanging a public token
#[derive(Debug, Clone)]
pub struct ExchangedItem {
    pub item_id: String,
    pub access_token: AccessToken,
}

/// The upstream calls a link session makes
#[allow(async_fn_in_trait)]
pub trait LinkApi {
    async fn create_link_token(&self, client_user_id: &str) -> Result<LinkToken, UpstreamError>;

    async fn exchange_public_token(
        &self,
        public_token: &PublicToken,
    ) -> Result<ExchangedItem, UpstreamError>;

    /// The institution an item belongs to, if Plaid knows it
    async fn item_institution_id(
        &self,
        access_token: &AccessToken,
    ) -> Result<Option<String>, UpstreamError>;
}
