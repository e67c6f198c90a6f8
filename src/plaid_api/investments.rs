use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use serde_json::Value;

use super::{client::Plaid, response::records, UpstreamError};
use crate::credentials::AccessToken;

pub const DEFAULT_DAYS: u32 = 30;

/// Holdings of an item, each with its security's name and ticker
pub async fn get_holdings(
    client: &Plaid,
    access_token: &AccessToken,
) -> Result<Vec<Value>, UpstreamError> {
    log::info!("Requesting holdings...");
    let response = client
        .client()
        .investments_holdings_get(access_token.get())
        .await?;
    let holdings = records(&response, "holdings")?;
    let securities = records(&response, "securities")?;
    log::info!("Requesting holdings...done ({} holdings)", holdings.len());
    Ok(join_securities(holdings, &securities))
}

/// Investment transactions between `today - days` and `today`
pub async fn get_investment_transactions(
    client: &Plaid,
    access_token: &AccessToken,
    today: NaiveDate,
    days: u32,
) -> Result<Vec<Value>, UpstreamError> {
    let start_date = today - Days::new(u64::from(days));
    log::info!("Requesting investment transactions from {start_date} to {today}...");
    let response = client
        .client()
        .investments_transactions_get(access_token.get(), today, start_date)
        .await?;
    let transactions = records(&response, "investment_transactions")?;
    let securities = records(&response, "securities")?;

    let total = serde_json::to_value(&response)?
        .get("total_investment_transactions")
        .and_then(Value::as_u64);
    if let Some(total) = total {
        if total > transactions.len() as u64 {
            log::warn!(
                "Plaid reported {total} investment transactions but returned {}",
                transactions.len()
            );
        }
    }
    log::info!(
        "Requesting investment transactions...done ({} transactions)",
        transactions.len()
    );
    Ok(join_securities(transactions, &securities))
}

/// Add `security_name` and `ticker_symbol` from the matching security to each record
pub fn join_securities(records: Vec<Value>, securities: &[Value]) -> Vec<Value> {
    let by_id: HashMap<&str, &Value> = securities
        .iter()
        .filter_map(|security| Some((security.get("security_id")?.as_str()?, security)))
        .collect();

    records
        .into_iter()
        .map(|mut record| {
            let security = record
                .get("security_id")
                .and_then(Value::as_str)
                .and_then(|id| by_id.get(id).copied());
            if let (Some(security), Value::Object(fields)) = (security, &mut record) {
                for (from, to) in [("name", "security_name"), ("ticker_symbol", "ticker_symbol")] {
                    let value = security.get(from).cloned().unwrap_or(Value::Null);
                    fields.insert(to.to_string(), value);
                }
            }
            record
        })
        .collect()
}
