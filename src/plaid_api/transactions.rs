use std::future::Future;
use std::time::Duration;

use plaid::model::TransactionsSyncRequestOptions;
use serde_json::Value;

use super::{client::Plaid, response::records, UpstreamError};
use crate::credentials::AccessToken;

/// How often an empty cursor is polled again before giving up
const EMPTY_CURSOR_RETRIES: u32 = 2;
const EMPTY_CURSOR_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub struct SyncPage {
    pub added: Vec<Value>,
    pub next_cursor: String,
    pub has_more: bool,
}

/// All transactions of an item, fetched from the start of its history
pub async fn get_transactions(
    client: &Plaid,
    access_token: &AccessToken,
) -> Result<Vec<Value>, UpstreamError> {
    log::info!("Requesting transactions...");
    let result = sync_all(
        |cursor| sync_transactions_page(client, access_token, cursor),
        EMPTY_CURSOR_DELAY,
    )
    .await?;
    log::info!("Requesting transactions...done ({} transactions)", result.len());
    Ok(result)
}

/// Follow the sync cursor until there is nothing more. An empty `next_cursor` means
/// Plaid hasn't prepared the data yet, that page is requested again after a delay.
pub async fn sync_all<F, Fut>(
    mut fetch_page: F,
    poll_delay: Duration,
) -> Result<Vec<Value>, UpstreamError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<SyncPage, UpstreamError>>,
{
    let mut result = Vec::new();
    let mut cursor = String::new();
    let mut empty_cursor_retries = 0;
    let mut pagenum = 0;
    loop {
        pagenum += 1;
        log::info!("Requesting transactions...page {pagenum}...");
        let page = fetch_page(cursor.clone()).await?;
        if page.next_cursor.is_empty() {
            if empty_cursor_retries >= EMPTY_CURSOR_RETRIES {
                return Err(UpstreamError::InvalidResponse(
                    "transactions are not ready yet, try again later".to_string(),
                ));
            }
            empty_cursor_retries += 1;
            log::info!("Transactions not ready yet, polling again in {poll_delay:?}");
            tokio::time::sleep(poll_delay).await;
            continue;
        }
        result.extend(page.added);
        cursor = page.next_cursor;
        if !page.has_more {
            return Ok(result);
        }
    }
}

async fn sync_transactions_page(
    client: &Plaid,
    access_token: &AccessToken,
    cursor: String,
) -> Result<SyncPage, UpstreamError> {
    let mut request = client
        .client()
        .transactions_sync(access_token.get())
        .options(TransactionsSyncRequestOptions {
            include_original_description: Some(true),
            ..Default::default()
        });
    if !cursor.is_empty() {
        request = request.cursor(&cursor);
    }
    let response = request.await?;

    if !response.modified.is_empty() || !response.removed.is_empty() {
        log::warn!(
            "Ignoring {} modified and {} removed transactions, only full syncs are supported",
            response.modified.len(),
            response.removed.len()
        );
    }
    Ok(SyncPage {
        added: records(&response, "added")?,
        next_cursor: response.next_cursor,
        has_more: response.has_more,
    })
}
