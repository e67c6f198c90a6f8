use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use chrono::Local;
use console::{style, StyledObject};
use indicatif::{MultiProgress, ProgressBar};
use serde_json::Value;

use crate::args::{Args, Command, ConfigCommand, ExportArgs, LinkArgs};
use crate::config::{settings_file, ConfigError, Context, DirectoryLayout, Environment, Setting};
use crate::credentials::{Credential, CredentialStore, InstitutionId};
use crate::exit_code::Termination;
use crate::export::{self, ExportKind};
use crate::link::{BrowserHandOff, LinkController, LinkOptions, LinkOutcome};
use crate::plaid_api::{self, Plaid, PlaidSettings, DEFAULT_DAYS};
use crate::terminal::{self, BulletPointPrinter};

const MASKED: &str = "*****";

pub async fn main(args: Args, context: Context) -> Result<Termination> {
    let cli = || Cli::new(context.clone());
    match args.command {
        Command::Link(link) => cli()?.main_link(&link).await,
        Command::Balances(export) => {
            cli()?
                .main_export(ExportKind::Balances, &export, DEFAULT_DAYS)
                .await
        }
        Command::Transactions(export) => {
            cli()?
                .main_export(ExportKind::Transactions, &export, DEFAULT_DAYS)
                .await
        }
        Command::Holdings(export) => {
            cli()?
                .main_export(ExportKind::Holdings, &export, DEFAULT_DAYS)
                .await
        }
        Command::InvestmentTransactions(args) => {
            cli()?
                .main_export(ExportKind::InvestmentTransactions, &args.export, args.days)
                .await
        }
        Command::List => cli()?.main_list().await,
        // Works without a valid directory layout so that a broken setting can be fixed
        Command::Config(command) => main_config(&context, command).await,
    }
}

async fn main_config(context: &Context, command: ConfigCommand) -> Result<Termination> {
    match command {
        ConfigCommand::Paths => main_config_paths(context),
        ConfigCommand::Set { key, value } => main_config_set(context, &key, &value).await,
        ConfigCommand::Init { force } => main_config_init(context, force).await,
    }
}

pub struct Cli {
    context: Context,
    layout: DirectoryLayout,
    store: CredentialStore,
}

impl Cli {
    pub fn new(context: Context) -> Result<Self, ConfigError> {
        let layout = context.layout()?.clone();
        let store = CredentialStore::new(layout.secrets_dir.clone());
        Ok(Self {
            context,
            layout,
            store,
        })
    }

    fn plaid(&self) -> Result<Plaid> {
        let settings = PlaidSettings::from_config(&self.context.config)?;
        log::info!("Using Plaid {}", settings.environment);
        Ok(Plaid::new(settings))
    }

    pub async fn main_link(&self, args: &LinkArgs) -> Result<Termination> {
        let plaid = self.plaid()?;
        let environment = plaid.settings().environment;
        let options = LinkOptions {
            port: args.port,
            timeout: Duration::from_secs(args.timeout),
            ..LinkOptions::default()
        };
        let hand_off = BrowserHandOff {
            open_browser: !args.no_open_browser,
        };
        let controller = LinkController::new(&plaid, &self.store, hand_off, environment, options);

        let report = controller.run().await?;
        match report.outcome {
            LinkOutcome::Linked(linked) => {
                println!();
                println!("{}", style_header("Linked institution:"));
                let printer = BulletPointPrinter::new_stdout();
                printer.print_item(style_institution(
                    linked.institution_id.as_str(),
                    linked.institution_name.as_deref(),
                ));
                let printer = printer.indent();
                printer.print_item(format!("item: {}", linked.item_id));
                printer.print_item(format!("environment: {environment}"));
                printer.print_item(format!(
                    "stored in: {}",
                    self.store.record_path(&linked.institution_id).display()
                ));
                Ok(Termination::Success)
            }
            LinkOutcome::Cancelled => {
                println!("{}", style("Linking was cancelled.").yellow());
                Ok(Termination::LinkCancelled)
            }
            LinkOutcome::TimedOut => {
                println!(
                    "{}",
                    style(format!(
                        "Timed out after {}s waiting for the browser.",
                        args.timeout
                    ))
                    .yellow()
                );
                Ok(Termination::LinkTimedOut)
            }
        }
    }

    pub async fn main_export(
        &self,
        kind: ExportKind,
        args: &ExportArgs,
        days: u32,
    ) -> Result<Termination> {
        let plaid = self.plaid()?;
        let institutions = self.select_institutions(&args.institution_ids).await?;

        println!("{}", style_header(&format!("Exporting {kind}:")));
        let mp = MultiProgress::new();
        let printer = BulletPointPrinter::new_multiprogress(&mp);
        for institution_id in institutions {
            let credential = self.store.get(&institution_id).await?;
            warn_on_environment_mismatch(&credential, plaid.settings().environment);

            let spinner = mp.add(ProgressBar::new_spinner());
            spinner.set_message(format!("Fetching {kind} for {}", institution_id.as_str()));
            spinner.enable_steady_tick(Duration::from_millis(100));
            let records = fetch(&plaid, kind, &credential, days).await;
            spinner.finish_and_clear();
            let records = records.with_context(|| {
                format!("Failed to fetch {kind} for {}", institution_id.as_str())
            })?;

            let records = export::filter_accounts(records, &args.accounts);
            let path = export::write_export(
                &self.layout.output_dir,
                kind,
                &institution_id,
                &records,
                Local::now(),
            )
            .await?;
            printer.print_item(format!(
                "{} {} rows -> {}",
                style_institution(institution_id.as_str(), credential.institution_name.as_deref()),
                records.len(),
                style(path.display()).italic()
            ));
        }
        Ok(Termination::Success)
    }

    pub async fn main_list(&self) -> Result<Termination> {
        println!("{}", style_header("Linked institutions:"));
        let institutions = self.store.list().await?;
        if institutions.is_empty() {
            println!("(none)");
            return Ok(Termination::Success);
        }
        let plaid = match self.plaid() {
            Ok(plaid) => Some(plaid),
            Err(err) => {
                println!(
                    "{}",
                    style(format!("Can't list accounts: {err:#}")).yellow()
                );
                None
            }
        };

        let printer = BulletPointPrinter::new_stdout();
        for institution_id in institutions {
            let credential = match self.store.get(&institution_id).await {
                Ok(credential) => credential,
                Err(err) => {
                    printer.print_item(style_institution(institution_id.as_str(), None));
                    printer.indent().print_item(style_error(&format!("{err:#}")));
                    continue;
                }
            };
            printer.print_item(style_institution(
                institution_id.as_str(),
                credential.institution_name.as_deref(),
            ));
            let Some(plaid) = &plaid else {
                continue;
            };
            let printer = printer.indent();
            match plaid_api::get_accounts(plaid, &credential.access_token).await {
                Ok(accounts) if accounts.is_empty() => {
                    printer.print_item(style("(no accounts)").italic())
                }
                Ok(accounts) => {
                    for account in &accounts {
                        printer.print_item(describe_account(account));
                    }
                }
                Err(err) => printer.print_item(style_error(&format!("{err:#}"))),
            }
        }
        Ok(Termination::Success)
    }

    /// Institutions named on the command line, otherwise the only linked one, otherwise
    /// whatever the user picks
    async fn select_institutions(&self, ids: &[String]) -> Result<Vec<InstitutionId>> {
        if !ids.is_empty() {
            return Ok(ids
                .iter()
                .map(|id| InstitutionId::new(id.as_str()))
                .collect::<Result<Vec<_>, _>>()?);
        }
        let linked = self.store.list().await?;
        match linked.len() {
            0 => bail!(
                "No linked institutions in {}, run `yapcli link` first",
                self.store.root().display()
            ),
            1 => Ok(linked),
            _ => {
                let names: Vec<&str> = linked.iter().map(InstitutionId::as_str).collect();
                let chosen = terminal::select_many("Institutions to export", &names)?;
                if chosen.is_empty() {
                    bail!("No institution selected");
                }
                Ok(chosen.into_iter().map(|index| linked[index].clone()).collect())
            }
        }
    }
}

fn main_config_paths(context: &Context) -> Result<Termination> {
    let config = &context.config;

    println!("{}", style_header("Settings files:"));
    let printer = BulletPointPrinter::new_stdout();
    for file in config.consulted_files() {
        let state = if file.exists { "found" } else { "missing" };
        printer.print_item(format!(
            "{}: {} ({state})",
            file.source,
            file.path.display()
        ));
    }

    println!();
    println!("{}", style_header("Directories:"));
    match context.layout() {
        Ok(layout) => {
            printer.print_item(format!("mode: {}", layout.mode.as_str()));
            printer.print_item(format!("environment: {}", layout.environment));
            printer.print_item(format!("config root: {}", layout.config_root.display()));
            printer.print_item(format!("settings file: {}", layout.settings_file().display()));
            printer.print_item(format!("secrets: {}", layout.secrets_dir.display()));
            printer.print_item(format!("logs: {}", layout.log_dir.display()));
            printer.print_item(format!("output: {}", layout.output_dir.display()));
        }
        Err(err) => {
            printer.print_item(style_error(&format!("{err}")));
            printer.print_item(format!(
                "settings file: {}",
                context.settings_file().display()
            ));
        }
    }

    println!();
    println!("{}", style_header("Settings:"));
    let mut any = false;
    for (setting, resolved) in config.iter() {
        any = true;
        printer.print_item(format!(
            "{}={} ({})",
            style(setting.key()).cyan(),
            display_value(setting, &resolved.value),
            resolved.source
        ));
    }
    if !any {
        println!("(none)");
    }
    Ok(Termination::Success)
}

async fn main_config_set(context: &Context, key: &str, value: &str) -> Result<Termination> {
    let setting: Setting = key.parse()?;
    let path = context.settings_file();
    let mut values: BTreeMap<String, String> =
        settings_file::read_entries(&path).into_iter().collect();
    values.insert(setting.key().to_string(), value.to_string());
    settings_file::write(&path, &values).await?;
    println!(
        "Set {}={} in {}",
        style(setting.key()).cyan(),
        display_value(setting, value),
        path.display()
    );
    Ok(Termination::Success)
}

async fn main_config_init(context: &Context, force: bool) -> Result<Termination> {
    let path = context.settings_file();
    if force
        && path.exists()
        && !terminal::confirm(&format!("Overwrite {}?", path.display()), false)?
    {
        return Ok(Termination::Success);
    }
    let mut values: BTreeMap<String, String> = if force {
        BTreeMap::new()
    } else {
        settings_file::read_entries(&path).into_iter().collect()
    };
    if !force && !values.is_empty() {
        println!("Updating {}", path.display());
    }
    let existing = |setting: Setting, values: &BTreeMap<String, String>| {
        values.get(setting.key()).cloned().unwrap_or_default()
    };

    let client_id = terminal::prompt_with_default(
        "Plaid client id",
        &existing(Setting::ClientId, &values),
    )?;

    let environments = [Environment::Sandbox, Environment::Production];
    let current = Environment::parse(&existing(Setting::Environment, &values))
        .unwrap_or(Environment::Sandbox);
    let environment = environments[terminal::select(
        "Plaid environment",
        &environments,
        environments
            .iter()
            .position(|environment| *environment == current)
            .unwrap_or(0),
    )?];

    let country_codes = terminal::prompt_with_default("Country codes", &{
        let current = existing(Setting::CountryCodes, &values);
        if current.is_empty() {
            "US".to_string()
        } else {
            current
        }
    })?;
    let sandbox_secret = terminal::password("Sandbox secret (empty keeps the current one)")?;
    let production_secret =
        terminal::password("Production secret (empty keeps the current one)")?;

    let mut set = |setting: Setting, value: String| {
        if !value.trim().is_empty() {
            values.insert(setting.key().to_string(), value.trim().to_string());
        }
    };
    set(Setting::ClientId, client_id);
    set(Setting::Environment, environment.to_string());
    set(Setting::CountryCodes, country_codes);
    set(Setting::SandboxSecret, sandbox_secret);
    set(Setting::ProductionSecret, production_secret);

    if values.get(Setting::ClientId.key()).is_none() {
        return Err(ConfigError::Missing {
            setting: Setting::ClientId,
            checked: "interactive input".to_string(),
        }
        .into());
    }

    settings_file::write(&path, &values).await?;
    println!("Wrote {}", style(path.display()).italic());
    Ok(Termination::Success)
}

async fn fetch(
    plaid: &Plaid,
    kind: ExportKind,
    credential: &Credential,
    days: u32,
) -> Result<Vec<Value>, plaid_api::UpstreamError> {
    let access_token = &credential.access_token;
    match kind {
        ExportKind::Balances => plaid_api::get_balances(plaid, access_token).await,
        ExportKind::Transactions => plaid_api::get_transactions(plaid, access_token).await,
        ExportKind::Holdings => plaid_api::get_holdings(plaid, access_token).await,
        ExportKind::InvestmentTransactions => {
            plaid_api::get_investment_transactions(
                plaid,
                access_token,
                Local::now().date_naive(),
                days,
            )
            .await
        }
    }
}

fn warn_on_environment_mismatch(credential: &Credential, environment: Environment) {
    if credential.environment != environment {
        log::warn!(
            "Institution {} was linked in {} but yapcli is using {}",
            credential.institution_id.as_str(),
            credential.environment,
            environment
        );
        println!(
            "{}",
            style(format!(
                "Warning: {} was linked in {}, not {}",
                credential.institution_id.as_str(),
                credential.environment,
                environment
            ))
            .yellow()
        );
    }
}

fn display_value(setting: Setting, value: &str) -> String {
    if setting.is_sensitive() && !value.is_empty() {
        MASKED.to_string()
    } else {
        format!("{value:?}")
    }
}

fn describe_account(account: &Value) -> String {
    let field = |name: &str| account.get(name).and_then(Value::as_str).unwrap_or("");
    let mut description = style(field("name")).magenta().to_string();
    let mask = field("mask");
    if !mask.is_empty() {
        description.push_str(&format!(" ••{mask}"));
    }
    let kind = [field("type"), field("subtype")]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if !kind.is_empty() {
        description.push_str(&format!(" [{kind}]"));
    }
    description.push_str(&format!(" {}", style(field("account_id")).dim()));
    description
}

fn style_header(header: &str) -> StyledObject<&str> {
    style(header).bold().underlined()
}

fn style_institution(institution_id: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{} ({institution_id})", style(name).cyan().bold()),
        None => style(institution_id).cyan().bold().to_string(),
    }
}

fn style_error(message: &str) -> StyledObject<&str> {
    style(message).red()
}
