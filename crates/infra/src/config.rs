//! Runtime configuration loaded from environment variables.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use boxoffice_observability::LogFormat;

pub const CART_TTL_MINUTES: &str = "BOXOFFICE_CART_TTL_MINUTES";
pub const ORDER_TTL_DAYS: &str = "BOXOFFICE_ORDER_TTL_DAYS";
pub const LOG_FORMAT: &str = "BOXOFFICE_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    NotPositive { key: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxOfficeConfig {
    /// How long a cart reservation holds stock.
    pub cart_ttl_minutes: u32,
    /// How long a pending order holds stock awaiting payment.
    pub order_ttl_days: u32,
    pub log_format: LogFormat,
}

impl Default for BoxOfficeConfig {
    fn default() -> Self {
        Self {
            cart_ttl_minutes: 30,
            order_ttl_days: 3,
            log_format: LogFormat::Json,
        }
    }
}

impl BoxOfficeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; absent keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cart_ttl_minutes = match lookup(CART_TTL_MINUTES) {
            Some(raw) => parse_positive(CART_TTL_MINUTES, &raw)?,
            None => {
                tracing::warn!(
                    key = CART_TTL_MINUTES,
                    default = defaults.cart_ttl_minutes,
                    "not set; using default"
                );
                defaults.cart_ttl_minutes
            }
        };

        let order_ttl_days = match lookup(ORDER_TTL_DAYS) {
            Some(raw) => parse_positive(ORDER_TTL_DAYS, &raw)?,
            None => {
                tracing::warn!(
                    key = ORDER_TTL_DAYS,
                    default = defaults.order_ttl_days,
                    "not set; using default"
                );
                defaults.order_ttl_days
            }
        };

        let log_format = match lookup(LOG_FORMAT) {
            Some(raw) => raw.parse::<LogFormat>().map_err(|_| ConfigError::Invalid {
                key: LOG_FORMAT,
                value: raw.clone(),
            })?,
            None => defaults.log_format,
        };

        Ok(Self {
            cart_ttl_minutes,
            order_ttl_days,
            log_format,
        })
    }

    pub fn cart_ttl(&self) -> Duration {
        Duration::minutes(i64::from(self.cart_ttl_minutes))
    }

    pub fn order_ttl(&self) -> Duration {
        Duration::days(i64::from(self.order_ttl_days))
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u32, ConfigError> {
    let value: u32 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })?;
    if value == 0 {
        return Err(ConfigError::NotPositive { key });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = BoxOfficeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BoxOfficeConfig::default());
        assert_eq!(config.cart_ttl(), Duration::minutes(30));
        assert_eq!(config.order_ttl(), Duration::days(3));
    }

    #[test]
    fn reads_every_key() {
        let config = BoxOfficeConfig::from_lookup(lookup(&[
            (CART_TTL_MINUTES, "15"),
            (ORDER_TTL_DAYS, "7"),
            (LOG_FORMAT, "pretty"),
        ]))
        .unwrap();

        assert_eq!(config.cart_ttl_minutes, 15);
        assert_eq!(config.order_ttl_days, 7);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            BoxOfficeConfig::from_lookup(lookup(&[(CART_TTL_MINUTES, "soon")])),
            Err(ConfigError::Invalid {
                key: CART_TTL_MINUTES,
                value: "soon".to_string()
            })
        );
        assert_eq!(
            BoxOfficeConfig::from_lookup(lookup(&[(ORDER_TTL_DAYS, "0")])),
            Err(ConfigError::NotPositive { key: ORDER_TTL_DAYS })
        );
        assert!(BoxOfficeConfig::from_lookup(lookup(&[(LOG_FORMAT, "xml")])).is_err());
    }

    #[test]
    fn deserializes_with_partial_input() {
        let config: BoxOfficeConfig =
            serde_json::from_str(r#"{ "cart_ttl_minutes": 10, "log_format": "pretty" }"#).unwrap();
        assert_eq!(config.cart_ttl_minutes, 10);
        assert_eq!(config.order_ttl_days, 3);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: every positive TTL is accepted as written.
            #[test]
            fn positive_ttls_are_accepted(minutes in 1u32..100_000, days in 1u32..1_000) {
                let (raw_minutes, raw_days) = (minutes.to_string(), days.to_string());
                let config = BoxOfficeConfig::from_lookup(lookup(&[
                    (CART_TTL_MINUTES, raw_minutes.as_str()),
                    (ORDER_TTL_DAYS, raw_days.as_str()),
                ]))
                .unwrap();
                prop_assert_eq!(config.cart_ttl(), Duration::minutes(i64::from(minutes)));
                prop_assert_eq!(config.order_ttl(), Duration::days(i64::from(days)));
            }
        }
    }
}
