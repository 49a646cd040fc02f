use std::env;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::boost::manager::BoostPolicy;
use crate::error::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Storage {
    MongoDb,
    Memory,
}

/// Service configuration, read once at startup from `BOOST_*` environment
/// variables (a `.env` file is honored). Unset keys fall back to defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub storage: Storage,
    pub mongodb_uri: String,
    pub database: String,
    pub bind_address: String,
    pub daily_cost: Decimal,
    pub max_duration_days: i32,
    pub sweep_interval: Duration,
    pub sweep_batch_size: usize,
    pub allow_concurrent_boosts: bool,
    pub seed: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            storage: Storage::MongoDb,
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            database: "boosts".to_string(),
            bind_address: "127.0.0.1:8080".to_string(),
            daily_cost: Decimal::from(500),
            max_duration_days: 30,
            sweep_interval: Duration::from_secs(60),
            sweep_batch_size: 50,
            allow_concurrent_boosts: true,
            seed: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Settings, Error> {
        let _ = dotenvy::dotenv();

        Settings::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Settings, Error> {
        let defaults = Settings::default();

        let storage = match lookup("BOOST_STORAGE").as_deref() {
            None | Some("mongodb") => Storage::MongoDb,
            Some("memory") => Storage::Memory,
            Some(value) => {
                return Err(Error::InvalidConfig {
                    key: "BOOST_STORAGE",
                    value: value.to_string(),
                })
            }
        };

        let settings = Settings {
            storage,
            mongodb_uri: lookup("BOOST_MONGODB_URI").unwrap_or(defaults.mongodb_uri),
            database: lookup("BOOST_DATABASE").unwrap_or(defaults.database),
            bind_address: lookup("BOOST_BIND_ADDRESS").unwrap_or(defaults.bind_address),
            daily_cost: parse(&lookup, "BOOST_DAILY_COST")?.unwrap_or(defaults.daily_cost),
            max_duration_days: parse(&lookup, "BOOST_MAX_DURATION_DAYS")?
                .unwrap_or(defaults.max_duration_days),
            sweep_interval: parse(&lookup, "BOOST_SWEEP_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            sweep_batch_size: parse(&lookup, "BOOST_SWEEP_BATCH_SIZE")?
                .unwrap_or(defaults.sweep_batch_size),
            allow_concurrent_boosts: parse(&lookup, "BOOST_ALLOW_CONCURRENT_BOOSTS")?
                .unwrap_or(defaults.allow_concurrent_boosts),
            seed: parse(&lookup, "BOOST_SEED")?.unwrap_or(defaults.seed),
        };

        if settings.daily_cost < Decimal::ZERO {
            return Err(Error::InvalidConfig {
                key: "BOOST_DAILY_COST",
                value: settings.daily_cost.to_string(),
            });
        }
        if settings.max_duration_days < 1 {
            return Err(Error::InvalidConfig {
                key: "BOOST_MAX_DURATION_DAYS",
                value: settings.max_duration_days.to_string(),
            });
        }
        if settings.sweep_interval.is_zero() {
            return Err(Error::InvalidConfig {
                key: "BOOST_SWEEP_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        if settings.sweep_batch_size == 0 {
            return Err(Error::InvalidConfig {
                key: "BOOST_SWEEP_BATCH_SIZE",
                value: "0".to_string(),
            });
        }

        Ok(settings)
    }

    pub fn policy(&self) -> BoostPolicy {
        BoostPolicy {
            daily_cost: self.daily_cost,
            max_duration_days: self.max_duration_days,
            allow_concurrent_boosts: self.allow_concurrent_boosts,
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, Error> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig { key, value }),
    }
}
