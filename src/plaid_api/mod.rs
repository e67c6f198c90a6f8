mod accounts;
mod client;
mod error;
mod investments;
mod link_account;
mod response;
mod settings;
mod tokens;
mod transactions;

pub use accounts::{get_accounts, get_balances};
pub use client::Plaid;
pub use error::UpstreamError;
pub use investments::{
    get_holdings, get_investment_transactions, join_securities, DEFAULT_DAYS,
};
pub use settings::{PlaidSettings, DEFAULT_DAYS_REQUESTED, MAX_DAYS_REQUESTED};
pub use tokens::{LinkToken, PublicToken};
pub use transactions::{get_transactions, sync_all, SyncPage};
