use std::fmt::{Debug, Formatter};

use crate::config::{ConfigError, EffectiveConfig, Environment, Setting};

const DEFAULT_COUNTRY_CODES: &str = "US";
const DEFAULT_PRODUCTS: &str = "transactions";
const ALLOWED_PRODUCTS: &[&str] = &["investments", "transactions"];

/// Days of transaction history requested when linking, Plaid accepts 1 to 730
pub const DEFAULT_DAYS_REQUESTED: u32 = 365;
pub const MAX_DAYS_REQUESTED: u32 = 730;

/// Everything needed to talk to Plaid, validated from the effective configuration
#[derive(Clone)]
pub struct PlaidSettings {
    pub client_id: String,
    pub secret: String,
    pub environment: Environment,
    pub country_codes: Vec<String>,
    pub products: Vec<String>,
    pub redirect_uri: Option<String>,
    pub days_requested: u32,
}

impl PlaidSettings {
    pub fn from_config(config: &EffectiveConfig) -> Result<Self, ConfigError> {
        let environment = Environment::from_config(config)?;
        let client_id = config.require(Setting::ClientId)?.to_string();
        let secret = config
            .get_non_empty(Setting::Secret)
            .or_else(|| config.get_non_empty(environment.secret_setting()))
            .ok_or_else(|| ConfigError::MissingOneOf {
                settings: vec![Setting::Secret, environment.secret_setting()],
                checked: config.checked_sources(),
            })?
            .to_string();
        let country_codes = split_list(
            config
                .get_non_empty(Setting::CountryCodes)
                .unwrap_or(DEFAULT_COUNTRY_CODES),
        )
        .into_iter()
        .map(|code| code.to_ascii_uppercase())
        .collect();
        let products = parse_products(
            config
                .get_non_empty(Setting::Products)
                .unwrap_or(DEFAULT_PRODUCTS),
        )?;
        let redirect_uri = config
            .get_non_empty(Setting::RedirectUri)
            .map(str::to_string);
        let days_requested = parse_days_requested(config.get_non_empty(Setting::DaysRequested));

        Ok(Self {
            client_id,
            secret,
            environment,
            country_codes,
            products,
            redirect_uri,
            days_requested,
        })
    }

    pub fn base_url(&self) -> &'static str {
        match self.environment {
            Environment::Sandbox => "https://sandbox.plaid.com",
            Environment::Production => "https://production.plaid.com",
        }
    }
}

impl Debug for PlaidSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaidSettings")
            .field("client_id", &self.client_id)
            .field("secret", &"*****")
            .field("environment", &self.environment)
            .field("country_codes", &self.country_codes)
            .field("products", &self.products)
            .field("redirect_uri", &self.redirect_uri)
            .field("days_requested", &self.days_requested)
            .finish()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_days_requested(value: Option<&str>) -> u32 {
    let Some(value) = value else {
        return DEFAULT_DAYS_REQUESTED;
    };
    match value.trim().parse::<u32>() {
        Ok(days) if (1..=MAX_DAYS_REQUESTED).contains(&days) => days,
        _ => {
            log::warn!(
                "Ignoring {}={value:?}, expected 1 to {MAX_DAYS_REQUESTED}. Using {DEFAULT_DAYS_REQUESTED}.",
                Setting::DaysRequested
            );
            DEFAULT_DAYS_REQUESTED
        }
    }
}

fn parse_products(value: &str) -> Result<Vec<String>, ConfigError> {
    let mut products = Vec::new();
    for product in split_list(value) {
        let product = product.to_ascii_lowercase();
        if !ALLOWED_PRODUCTS.contains(&product.as_str()) {
            return Err(ConfigError::InvalidValue {
                setting: Setting::Products,
                value: value.to_string(),
                expected: "a comma separated list of: transactions, investments",
            });
        }
        if !products.contains(&product) {
            products.push(product);
        }
    }
    if products.is_empty() {
        products.push(DEFAULT_PRODUCTS.to_string());
    }
    Ok(products)
}
