use std::env;

use boutique_common::{helpers::parse_int_var, Eur, Secret};
use chrono::Duration;
use log::*;
use rand::{distributions::Alphanumeric, Rng};

const DEFAULT_BSS_HOST: &str = "127.0.0.1";
const DEFAULT_BSS_PORT: u16 = 8480;
const DEFAULT_PACKAGE_WINDOW_HOURS: i64 = 72;
const DEFAULT_CLOSING_WARNING_HOURS: i64 = 12;
const DEFAULT_RETURN_WINDOW_DAYS: i64 = 14;
const DEFAULT_GIFT_THRESHOLD_CENTS: i64 = 6_900;
const DEFAULT_WEIGHT_CAP_G: i64 = 20_000;
const DEFAULT_CASHBACK_RATE_BPS: i64 = 200;
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// All server tunables, read from the environment once at boot and passed into the components that need them.
/// Nothing here is consulted ambiently at call sites.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Length of the package aggregation window, fixed at open time.
    pub package_window: Duration,
    /// How far ahead of the deadline the closing-soon warning goes out.
    pub closing_warning: Duration,
    /// How long after delivery an order stays return-eligible.
    pub return_window: Duration,
    /// Order total above which the promotional gift is granted.
    pub gift_threshold: Eur,
    /// Display cap of the advisory weight gauge, in grams.
    pub weight_cap_g: i64,
    /// Cashback rate applied to each paid order, in basis points.
    pub cashback_rate_bps: i64,
    /// Seconds between sweep passes.
    pub sweep_interval_secs: u64,
    pub auth: AuthConfig,
    pub mailer: MailerConfig,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Key used to sign customer/staff bearer tokens.
    pub token_secret: Secret<String>,
    /// Shared key the storefront presents to mint tokens.
    pub service_key: Secret<String>,
    /// Key the payment processor signs webhook bodies with.
    pub webhook_secret: Secret<String>,
    pub token_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: Secret::new(String::default()),
            service_key: Secret::new(String::default()),
            webhook_secret: Secret::new(String::default()),
            token_ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MailerConfig {
    /// Base URL of the transactional mail API.
    pub base_url: String,
    pub api_key: Secret<String>,
    /// Sender address stamped on every notification.
    pub sender: String,
    /// When false, package events are logged instead of mailed.
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BSS_HOST.to_string(),
            port: DEFAULT_BSS_PORT,
            database_url: String::default(),
            package_window: Duration::hours(DEFAULT_PACKAGE_WINDOW_HOURS),
            closing_warning: Duration::hours(DEFAULT_CLOSING_WARNING_HOURS),
            return_window: Duration::days(DEFAULT_RETURN_WINDOW_DAYS),
            gift_threshold: Eur::from_cents(DEFAULT_GIFT_THRESHOLD_CENTS),
            weight_cap_g: DEFAULT_WEIGHT_CAP_G,
            cashback_rate_bps: DEFAULT_CASHBACK_RATE_BPS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            auth: AuthConfig::default(),
            mailer: MailerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    /// The slice of this configuration the package flow needs.
    pub fn flow_config(&self) -> boutique_engine::PackageFlowConfig {
        boutique_engine::PackageFlowConfig {
            window: self.package_window,
            weight_cap_g: self.weight_cap_g,
            cashback_rate_bps: self.cashback_rate_bps,
        }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("BSS_HOST").ok().unwrap_or_else(|| DEFAULT_BSS_HOST.into());
        let port = env::var("BSS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!("🪛️ {s} is not a valid port for BSS_PORT. {e} Using the default, {DEFAULT_BSS_PORT}.");
                    DEFAULT_BSS_PORT
                })
            })
            .unwrap_or(DEFAULT_BSS_PORT);
        let database_url = env::var("BSS_DATABASE_URL").unwrap_or_else(|_| {
            info!("🪛️ BSS_DATABASE_URL is not set. Using the default.");
            "sqlite://data/boutique_store.db".to_string()
        });
        let package_window =
            Duration::hours(parse_int_var(env::var("BSS_PACKAGE_WINDOW_HOURS").ok(), DEFAULT_PACKAGE_WINDOW_HOURS));
        let closing_warning =
            Duration::hours(parse_int_var(env::var("BSS_CLOSING_WARNING_HOURS").ok(), DEFAULT_CLOSING_WARNING_HOURS));
        let return_window =
            Duration::days(parse_int_var(env::var("BSS_RETURN_WINDOW_DAYS").ok(), DEFAULT_RETURN_WINDOW_DAYS));
        let gift_threshold =
            Eur::from_cents(parse_int_var(env::var("BSS_GIFT_THRESHOLD").ok(), DEFAULT_GIFT_THRESHOLD_CENTS));
        let weight_cap_g = parse_int_var(env::var("BSS_WEIGHT_CAP_G").ok(), DEFAULT_WEIGHT_CAP_G);
        let cashback_rate_bps = parse_int_var(env::var("BSS_CASHBACK_RATE_BPS").ok(), DEFAULT_CASHBACK_RATE_BPS);
        let sweep_interval_secs =
            parse_int_var(env::var("BSS_SWEEP_INTERVAL_SECS").ok(), DEFAULT_SWEEP_INTERVAL_SECS as i64).max(1) as u64;
        Self {
            host,
            port,
            database_url,
            package_window,
            closing_warning,
            return_window,
            gift_threshold,
            weight_cap_g,
            cashback_rate_bps,
            sweep_interval_secs,
            auth: AuthConfig::from_env_or_default(),
            mailer: MailerConfig::from_env_or_default(),
        }
    }

    /// Sanity checks run exactly once, at boot. Call sites can then trust the configuration.
    pub fn assert_valid(&self) -> Result<(), String> {
        if self.database_url.trim().is_empty() {
            return Err("BSS_DATABASE_URL must point at the storefront database".to_string());
        }
        if self.package_window <= Duration::zero() {
            return Err("BSS_PACKAGE_WINDOW_HOURS must be positive".to_string());
        }
        if self.return_window <= Duration::zero() {
            return Err("BSS_RETURN_WINDOW_DAYS must be positive".to_string());
        }
        if self.gift_threshold.is_negative() {
            return Err("BSS_GIFT_THRESHOLD must not be negative".to_string());
        }
        if !(0..=10_000).contains(&self.cashback_rate_bps) {
            return Err("BSS_CASHBACK_RATE_BPS must lie between 0 and 10000".to_string());
        }
        if self.mailer.enabled && self.mailer.base_url.trim().is_empty() {
            return Err("BSS_MAILER_URL is required when the mailer is enabled".to_string());
        }
        Ok(())
    }
}

impl AuthConfig {
    pub fn from_env_or_default() -> Self {
        Self {
            token_secret: secret_from_env("BSS_TOKEN_SECRET"),
            service_key: secret_from_env("BSS_SERVICE_KEY"),
            webhook_secret: secret_from_env("BSS_WEBHOOK_SECRET"),
            token_ttl: Duration::hours(parse_int_var(env::var("BSS_TOKEN_TTL_HOURS").ok(), DEFAULT_TOKEN_TTL_HOURS)),
        }
    }
}

impl MailerConfig {
    pub fn from_env_or_default() -> Self {
        let enabled = boutique_common::helpers::parse_boolean_flag(env::var("BSS_MAILER_ENABLED").ok(), false);
        Self {
            base_url: env::var("BSS_MAILER_URL").unwrap_or_default(),
            api_key: Secret::new(env::var("BSS_MAILER_API_KEY").unwrap_or_default()),
            sender: env::var("BSS_MAILER_SENDER").unwrap_or_else(|_| "bonjour@laboutique.example".to_string()),
            enabled,
        }
    }
}

/// Reads a secret from the environment, or generates a random one-boot value. Anything signed with a generated
/// secret dies with the process, which is fine for development and never acceptable in production — hence the
/// shouting.
fn secret_from_env(var: &str) -> Secret<String> {
    match env::var(var) {
        Ok(s) if !s.trim().is_empty() => Secret::new(s),
        _ => {
            let random: String = rand::thread_rng().sample_iter(&Alphanumeric).take(40).map(char::from).collect();
            warn!("🪛️ {var} is not set. Generated a random secret for this run. DO NOT run production like this.");
            Secret::new(random)
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let mut config = ServerConfig::default();
        config.database_url = "sqlite://data/test.db".to_string();
        assert!(config.assert_valid().is_ok());
        assert_eq!(config.package_window, Duration::hours(72));
        assert_eq!(config.return_window, Duration::days(14));
        assert_eq!(config.gift_threshold, Eur::from_cents(6_900));
    }

    #[test]
    fn invalid_configs_are_rejected_at_boot() {
        let config = ServerConfig::default();
        assert!(config.assert_valid().is_err(), "an empty database url must not validate");

        let mut config = ServerConfig::default();
        config.database_url = "sqlite://data/test.db".to_string();
        config.cashback_rate_bps = 20_000;
        assert!(config.assert_valid().is_err());

        let mut config = ServerConfig::default();
        config.database_url = "sqlite://data/test.db".to_string();
        config.mailer.enabled = true;
        assert!(config.assert_valid().is_err(), "an enabled mailer needs a base url");
    }
}
