use serde_json::Value;

use super::{client::Plaid, response::records, UpstreamError};
use crate::credentials::AccessToken;

/// Accounts of an item with cached balances
pub async fn get_accounts(
    client: &Plaid,
    access_token: &AccessToken,
) -> Result<Vec<Value>, UpstreamError> {
    log::info!("Requesting accounts...");
    let response = client.client().accounts_get(access_token.get()).await?;
    let accounts = records(&response, "accounts")?;
    log::info!("Requesting accounts...done ({} accounts)", accounts.len());
    Ok(accounts)
}

/// Accounts of an item with balances fetched live from the institution
pub async fn get_balances(
    client: &Plaid,
    access_token: &AccessToken,
) -> Result<Vec<Value>, UpstreamError> {
    log::info!("Requesting balances...");
    let response = client
        .client()
        .accounts_balance_get(access_token.get())
        .await?;
    let accounts = records(&response, "accounts")?;
    log::info!("Requesting balances...done ({} accounts)", accounts.len());
    Ok(accounts)
}
