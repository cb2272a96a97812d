use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;

use crate::poller::PollSettings;

/// Command line flags. Environment variables take precedence over them.
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "points-ledger", about = "Loyalty points ledger service")]
pub struct Flags {
    /// Address and port to serve HTTP on
    #[arg(short = 'a', long = "address")]
    pub run_address: Option<String>,
    /// Postgres connection string
    #[arg(short = 'd', long = "database-uri")]
    pub database_uri: Option<String>,
    /// Base address of the accrual service
    #[arg(short = 'r', long = "accrual-address")]
    pub accrual_system_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub run_address: String,
    pub database_url: String,
    pub database_pool_size: u32,
    pub accrual_system_address: String,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub poll: PollSettings,
    pub log_level: tracing::Level,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("invalid value for {key}: {value:?}")),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env(flags: &Flags) -> anyhow::Result<Self> {
        Self::from_lookup(flags, |key| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    pub fn from_lookup(flags: &Flags, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URI")
            .or_else(|| lookup("DATABASE_URL"))
            .or_else(|| flags.database_uri.clone())
            .context("DATABASE_URI (or DATABASE_URL, or -d) must be set")?;
        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET must be set")?;

        let bcrypt_cost = parse_or(&lookup, "BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(anyhow!("BCRYPT_COST must be between 4 and 31, got {bcrypt_cost}"));
        }
        let ttl_hours: u64 = parse_or(&lookup, "TOKEN_TTL_HOURS", 72)?;
        let token_ttl = ttl_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .with_context(|| format!("TOKEN_TTL_HOURS is too large: {ttl_hours}"))?;

        Ok(Self {
            run_address: lookup("RUN_ADDRESS")
                .or_else(|| flags.run_address.clone())
                .unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            database_url,
            database_pool_size: parse_or(&lookup, "DATABASE_POOL_SIZE", 10)?,
            accrual_system_address: lookup("ACCRUAL_SYSTEM_ADDRESS")
                .or_else(|| flags.accrual_system_address.clone())
                .unwrap_or_else(|| "http://127.0.0.1:8081".to_string()),
            jwt_secret,
            token_ttl,
            bcrypt_cost,
            poll: PollSettings {
                lifetime: Duration::from_secs(parse_or(&lookup, "ACCRUAL_POLL_LIFETIME_SECS", 60)?),
                request_timeout: Duration::from_millis(parse_or(&lookup, "ACCRUAL_REQUEST_TIMEOUT_MS", 5000)?),
                retry_interval: Duration::from_millis(parse_or(&lookup, "ACCRUAL_RETRY_INTERVAL_MS", 1000)?),
            },
            log_level: parse_or(&lookup, "LOG_LEVEL", tracing::Level::INFO)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(&Flags::default(), lookup(&[
            ("DATABASE_URL", "postgres://localhost/points"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.run_address, "127.0.0.1:8080");
        assert_eq!(config.database_url, "postgres://localhost/points");
        assert_eq!(config.database_pool_size, 10);
        assert_eq!(config.token_ttl, Duration::from_secs(72 * 3600));
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(config.poll.lifetime, Duration::from_secs(60));
        assert_eq!(config.poll.request_timeout, Duration::from_millis(5000));
        assert_eq!(config.log_level, tracing::Level::INFO);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(&Flags::default(), lookup(&[
            ("DATABASE_URI", "postgres://db/uri"),
            ("DATABASE_URL", "postgres://db/url"),
            ("JWT_SECRET", "secret"),
            ("RUN_ADDRESS", "0.0.0.0:9000"),
            ("ACCRUAL_SYSTEM_ADDRESS", "http://accrual:8080"),
            ("ACCRUAL_POLL_LIFETIME_SECS", "5"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "postgres://db/uri");
        assert_eq!(config.run_address, "0.0.0.0:9000");
        assert_eq!(config.accrual_system_address, "http://accrual:8080");
        assert_eq!(config.poll.lifetime, Duration::from_secs(5));
        assert_eq!(config.log_level, tracing::Level::DEBUG);
    }

    #[test]
    fn test_flags_fill_in_below_environment() {
        let flags = Flags::try_parse_from([
            "points-ledger",
            "-a",
            "0.0.0.0:7000",
            "-d",
            "postgres://flag/db",
            "-r",
            "http://flag-accrual:8080",
        ])
        .unwrap();

        let config = Config::from_lookup(&flags, lookup(&[("JWT_SECRET", "secret")])).unwrap();
        assert_eq!(config.run_address, "0.0.0.0:7000");
        assert_eq!(config.database_url, "postgres://flag/db");
        assert_eq!(config.accrual_system_address, "http://flag-accrual:8080");

        let config = Config::from_lookup(
            &flags,
            lookup(&[
                ("JWT_SECRET", "secret"),
                ("RUN_ADDRESS", "127.0.0.1:9999"),
                ("DATABASE_URI", "postgres://env/db"),
            ]),
        )
        .unwrap();
        assert_eq!(config.run_address, "127.0.0.1:9999");
        assert_eq!(config.database_url, "postgres://env/db");
        assert_eq!(config.accrual_system_address, "http://flag-accrual:8080");

        assert!(Flags::try_parse_from(["points-ledger", "-x", "1"]).is_err());
    }

    #[test]
    fn test_huge_token_ttl_is_an_error() {
        let err = Config::from_lookup(
            &Flags::default(),
            lookup(&[
                ("DATABASE_URL", "postgres://x"),
                ("JWT_SECRET", "secret"),
                ("TOKEN_TTL_HOURS", "18446744073709551615"),
            ]),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("TOKEN_TTL_HOURS"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(&Flags::default(), lookup(&[("JWT_SECRET", "secret")])).is_err());
        assert!(Config::from_lookup(&Flags::default(), lookup(&[("DATABASE_URL", "postgres://x")])).is_err());

        let err = Config::from_lookup(&Flags::default(), lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "secret"),
            ("DATABASE_POOL_SIZE", "many"),
        ]))
        .unwrap_err();
        assert!(format!("{err:#}").contains("DATABASE_POOL_SIZE"));

        assert!(Config::from_lookup(&Flags::default(), lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "secret"),
            ("BCRYPT_COST", "2"),
        ]))
        .is_err());
    }
}
