pub mod args;
pub mod atomic_file;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod exit_code;
pub mod export;
pub mod link;
pub mod logging;
pub mod plaid_api;
mod terminal;
