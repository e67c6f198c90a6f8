use std::collections::BTreeMap;

use clap::{Parser, Subcommand};

use crate::config::Setting;
use crate::plaid_api::{DEFAULT_DAYS, MAX_DAYS_REQUESTED};

/// Link financial institutions through Plaid and export their data to CSV files.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Default)]
pub struct GlobalArgs {
    /// Talk to the Plaid production environment
    #[arg(long, global = true, conflicts_with = "sandbox")]
    pub production: bool,

    /// Talk to the Plaid sandbox environment
    #[arg(long, global = true)]
    pub sandbox: bool,

    /// Directory linked credentials are stored in
    #[arg(long, global = true, value_name = "DIR")]
    pub secrets_dir: Option<String>,

    /// Directory exports are written to
    #[arg(long, global = true, value_name = "DIR")]
    pub out_dir: Option<String>,

    /// Directory log files are written to
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<String>,

    /// Where default directories live: `cwd` or `platform`
    #[arg(long, global = true, value_name = "MODE")]
    pub dir_mode: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Link a new institution through Plaid Link in the browser
    Link(LinkArgs),

    /// Export current account balances
    Balances(ExportArgs),

    /// Export all transactions
    Transactions(ExportArgs),

    /// Export investment holdings
    Holdings(ExportArgs),

    /// Export recent investment transactions
    #[command(name = "investment_transactions", alias = "investment-transactions")]
    InvestmentTransactions(InvestmentTransactionsArgs),

    /// List linked institutions and their accounts
    List,

    /// Inspect or edit the settings file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(clap::Args, Debug)]
pub struct LinkArgs {
    /// Port of the local link server, 0 picks a free one
    #[arg(long, default_value_t = 0)]
    pub port: u16,

    /// Seconds to wait for the browser to finish linking
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub timeout: u64,

    /// Only print the link URL instead of opening a browser
    #[arg(long)]
    pub no_open_browser: bool,

    /// Comma separated Plaid products to request, e.g. `transactions,investments`
    #[arg(long, value_name = "LIST")]
    pub products: Option<String>,

    /// Days of transaction history to request while linking [default: 365]
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..=MAX_DAYS_REQUESTED as i64))]
    pub days: Option<u32>,
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Institutions to export. Asks interactively if omitted.
    #[arg(value_name = "INSTITUTION_ID")]
    pub institution_ids: Vec<String>,

    /// Only export this account, can be repeated
    #[arg(long = "account", value_name = "ACCOUNT_ID")]
    pub accounts: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct InvestmentTransactionsArgs {
    #[command(flatten)]
    pub export: ExportArgs,

    /// How many days back to export
    #[arg(long, default_value_t = DEFAULT_DAYS)]
    pub days: u32,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show consulted settings files, resolved directories and every set value
    Paths,

    /// Set a key in the settings file
    Set { key: String, value: String },

    /// Interactively create the settings file
    Init {
        /// Start from an empty file instead of merging into the existing one
        #[arg(long)]
        force: bool,
    },
}

impl Command {
    /// Short name used as the log file prefix
    pub fn name(&self) -> &'static str {
        match self {
            Command::Link(_) => "link",
            Command::Balances(_) => "balances",
            Command::Transactions(_) => "transactions",
            Command::Holdings(_) => "holdings",
            Command::InvestmentTransactions(_) => "investment_transactions",
            Command::List => "list",
            Command::Config(_) => "config",
        }
    }
}

impl Args {
    /// The command line layer of the configuration
    pub fn config_overrides(&self) -> BTreeMap<Setting, String> {
        let mut result = BTreeMap::new();
        if self.global.production {
            result.insert(Setting::Environment, "production".to_string());
        } else if self.global.sandbox {
            result.insert(Setting::Environment, "sandbox".to_string());
        }
        let dirs = [
            (Setting::SecretsDir, &self.global.secrets_dir),
            (Setting::OutputDir, &self.global.out_dir),
            (Setting::LogDir, &self.global.log_dir),
            (Setting::DirMode, &self.global.dir_mode),
        ];
        for (setting, value) in dirs {
            if let Some(value) = value {
                result.insert(setting, value.clone());
            }
        }
        if let Command::Link(link) = &self.command {
            if let Some(products) = &link.products {
                result.insert(Setting::Products, products.clone());
            }
            if let Some(days) = link.days {
                result.insert(Setting::DaysRequested, days.to_string());
            }
        }
        result
    }
}

pub fn parse() -> Args {
    Args::parse()
}
