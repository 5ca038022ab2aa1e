//! Configuration of a river. The settings arrive as a JSON object (base64 encoded when they come
//! from the environment) with a `simple` section for the generator and an `index` section for the
//! destination and bulk behavior:
//!
//! ```json
//! {
//!   "simple": { "number": 100, "field": "test", "poll": "60m" },
//!   "index": { "index": "my-river", "type": "simple_type", "bulk_size": 100, "bulk_threshold": 10 },
//!   "cycles": 3
//! }
//! ```
//!
//! Every key is optional; a missing key falls back to its default.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::message::{Destination, DocumentIdStrategy};

/// Environment variable carrying the base64 encoded [RiverSettings] JSON.
pub const ENV_RIVER_SETTINGS_OBJECT: &str = "RIVER_SETTINGS_OBJECT";

const DEFAULT_RECORDS_PER_CYCLE: usize = 100;
const DEFAULT_FIELD_NAME: &str = "test";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_TYPE_NAME: &str = "simple_type";
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_IN_FLIGHT_BATCHES: usize = 10;

/// Raw settings as supplied by the configuration source.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RiverSettings {
    #[serde(default)]
    pub simple: Option<SimpleSettings>,
    #[serde(default)]
    pub index: Option<IndexSettings>,
    /// Stop after this many completed cycles.
    #[serde(default)]
    pub cycles: Option<u64>,
}

/// Generator related settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SimpleSettings {
    pub number: Option<usize>,
    pub field: Option<String>,
    pub poll: Option<TimeValue>,
}

/// Destination and bulk related settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct IndexSettings {
    pub index: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub bulk_size: Option<usize>,
    pub bulk_threshold: Option<usize>,
    pub id_strategy: Option<DocumentIdStrategy>,
}

/// A duration given either as milliseconds or as a string with a unit suffix.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TimeValue {
    Millis(u64),
    Text(String),
}

impl TryFrom<TimeValue> for Duration {
    type Error = Error;

    fn try_from(value: TimeValue) -> Result<Self> {
        match value {
            TimeValue::Millis(ms) => Ok(Duration::from_millis(ms)),
            TimeValue::Text(text) => parse_time_value(&text),
        }
    }
}

/// Parses `"500ms"`, `"30s"`, `"60m"`, `"2h"`, `"1d"` and bare numbers (milliseconds).
pub fn parse_time_value(value: &str) -> Result<Duration> {
    let value = value.trim();
    let split_at = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split_at);

    let amount: u64 = digits
        .parse()
        .map_err(|_| Error::Config(format!("invalid time value {value:?}")))?;

    let millis_per_unit: u64 = match unit.trim() {
        "" | "ms" => 1,
        "s" => 1_000,
        "m" => 60 * 1_000,
        "h" => 60 * 60 * 1_000,
        "d" => 24 * 60 * 60 * 1_000,
        other => {
            return Err(Error::Config(format!(
                "unknown time unit {other:?} in {value:?}"
            )));
        }
    };

    amount
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| Error::Config(format!("time value {value:?} is out of range")))
}

/// Validated, immutable configuration of one river.
#[derive(Debug, Clone, PartialEq)]
pub struct RiverConfig {
    /// Name of the river, also the default index name.
    pub river_name: String,
    /// Number of records generated per cycle.
    pub records_per_cycle: usize,
    /// Field name attached to every generated record.
    pub field_name: String,
    /// Idle delay between cycles, zero disables the delay.
    pub poll_interval: Duration,
    /// Maximum number of documents per batch.
    pub batch_size: usize,
    /// Number of batches allowed in flight before submissions block.
    pub max_in_flight_batches: usize,
    pub destination: Destination,
    pub id_strategy: DocumentIdStrategy,
    /// Stop after this many completed cycles, `None` runs until closed.
    pub max_cycles: Option<u64>,
}

impl RiverConfig {
    /// Configuration with every setting at its default.
    pub fn new(river_name: impl Into<String>) -> Self {
        let river_name = river_name.into();
        Self {
            destination: Destination {
                index: river_name.clone(),
                type_name: DEFAULT_TYPE_NAME.to_string(),
            },
            river_name,
            records_per_cycle: DEFAULT_RECORDS_PER_CYCLE,
            field_name: DEFAULT_FIELD_NAME.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight_batches: DEFAULT_MAX_IN_FLIGHT_BATCHES,
            id_strategy: DocumentIdStrategy::default(),
            max_cycles: None,
        }
    }

    /// Loads the configuration from the environment. A missing settings object yields the
    /// defaults.
    pub fn load(
        river_name: impl Into<String>,
        env_vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Result<Self> {
        let env_vars: HashMap<String, String> = env_vars
            .into_iter()
            .map(|(key, val)| (key.into(), val.into()))
            .filter(|(key, _)| key == ENV_RIVER_SETTINGS_OBJECT)
            .collect();

        let settings = match env_vars.get(ENV_RIVER_SETTINGS_OBJECT) {
            Some(encoded) => {
                let decoded = BASE64_STANDARD.decode(encoded.trim()).map_err(|e| {
                    Error::Config(format!("failed to decode {ENV_RIVER_SETTINGS_OBJECT}: {e}"))
                })?;
                serde_json::from_slice(&decoded).map_err(|e| {
                    Error::Config(format!("failed to parse {ENV_RIVER_SETTINGS_OBJECT}: {e}"))
                })?
            }
            None => RiverSettings::default(),
        };

        Self::from_settings(river_name, settings)
    }

    /// Applies the raw settings on top of the defaults and validates the result.
    pub fn from_settings(river_name: impl Into<String>, settings: RiverSettings) -> Result<Self> {
        let mut config = Self::new(river_name);

        if let Some(simple) = settings.simple {
            if let Some(number) = simple.number {
                config.records_per_cycle = number;
            }
            if let Some(field) = simple.field {
                config.field_name = field;
            }
            if let Some(poll) = simple.poll {
                config.poll_interval = poll.try_into()?;
            }
        }

        if let Some(index) = settings.index {
            if let Some(name) = index.index {
                config.destination.index = name;
            }
            if let Some(type_name) = index.type_name {
                config.destination.type_name = type_name;
            }
            if let Some(bulk_size) = index.bulk_size {
                config.batch_size = bulk_size;
            }
            if let Some(bulk_threshold) = index.bulk_threshold {
                config.max_in_flight_batches = bulk_threshold;
            }
            if let Some(id_strategy) = index.id_strategy {
                config.id_strategy = id_strategy;
            }
        }

        config.max_cycles = settings.cycles;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.river_name.trim().is_empty() {
            return Err(Error::Config("river name must not be empty".to_string()));
        }
        if self.field_name.is_empty() {
            return Err(Error::Config("simple.field must not be empty".to_string()));
        }
        if self.destination.index.trim().is_empty() {
            return Err(Error::Config("index.index must not be empty".to_string()));
        }
        if self.destination.type_name.trim().is_empty() {
            return Err(Error::Config("index.type must not be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config(
                "index.bulk_size must be at least 1".to_string(),
            ));
        }
        if self.max_in_flight_batches == 0 {
            return Err(Error::Config(
                "index.bulk_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoded(value: serde_json::Value) -> String {
        BASE64_STANDARD.encode(value.to_string())
    }

    #[test]
    fn test_defaults_without_settings() {
        let config = RiverConfig::load("my-river", Vec::<(String, String)>::new()).unwrap();

        assert_eq!(config.records_per_cycle, 100);
        assert_eq!(config.field_name, "test");
        assert_eq!(config.poll_interval, Duration::from_secs(3600));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_in_flight_batches, 10);
        assert_eq!(config.destination.index, "my-river");
        assert_eq!(config.destination.type_name, "simple_type");
        assert_eq!(config.id_strategy, DocumentIdStrategy::Uuid);
        assert_eq!(config.max_cycles, None);
    }

    #[test]
    fn test_load_from_env_object() {
        let settings = json!({
            "simple": { "number": 10, "field": "value", "poll": "5s" },
            "index": {
                "index": "numbers",
                "type": "number",
                "bulk_size": 3,
                "bulk_threshold": 2,
                "id_strategy": "uuid_v7"
            },
            "cycles": 4
        });
        let env = vec![
            ("HOME", "/root".to_string()),
            (ENV_RIVER_SETTINGS_OBJECT, encoded(settings)),
        ];

        let config = RiverConfig::load("ignored", env).unwrap();
        assert_eq!(config.records_per_cycle, 10);
        assert_eq!(config.field_name, "value");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.max_in_flight_batches, 2);
        assert_eq!(config.destination.index, "numbers");
        assert_eq!(config.destination.type_name, "number");
        assert_eq!(config.id_strategy, DocumentIdStrategy::UuidV7);
        assert_eq!(config.max_cycles, Some(4));
    }

    #[test]
    fn test_poll_as_millis() {
        let settings: RiverSettings =
            serde_json::from_value(json!({ "simple": { "poll": 250 } })).unwrap();
        let config = RiverConfig::from_settings("r", settings).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_time_value() {
        assert_eq!(parse_time_value("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_time_value("750").unwrap(), Duration::from_millis(750));
        assert_eq!(parse_time_value("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_time_value("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_time_value("60m").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_time_value("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_time_value("1d").unwrap(), Duration::from_secs(86400));

        assert!(matches!(parse_time_value("5y"), Err(Error::Config(_))));
        assert!(matches!(parse_time_value("m"), Err(Error::Config(_))));
        assert!(matches!(parse_time_value(""), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_settings_fail_fast() {
        let zero_bulk: RiverSettings =
            serde_json::from_value(json!({ "index": { "bulk_size": 0 } })).unwrap();
        assert!(matches!(
            RiverConfig::from_settings("r", zero_bulk),
            Err(Error::Config(_))
        ));

        let zero_threshold: RiverSettings =
            serde_json::from_value(json!({ "index": { "bulk_threshold": 0 } })).unwrap();
        assert!(matches!(
            RiverConfig::from_settings("r", zero_threshold),
            Err(Error::Config(_))
        ));

        let empty_field: RiverSettings =
            serde_json::from_value(json!({ "simple": { "field": "" } })).unwrap();
        assert!(matches!(
            RiverConfig::from_settings("r", empty_field),
            Err(Error::Config(_))
        ));

        assert!(matches!(
            RiverConfig::from_settings(" ", RiverSettings::default()),
            Err(Error::Config(_))
        ));

        let bad_poll: RiverSettings =
            serde_json::from_value(json!({ "simple": { "poll": "soon" } })).unwrap();
        assert!(matches!(
            RiverConfig::from_settings("r", bad_poll),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_malformed_env_object() {
        let not_base64 = vec![(ENV_RIVER_SETTINGS_OBJECT, "%%%")];
        assert!(matches!(
            RiverConfig::load("r", not_base64),
            Err(Error::Config(_))
        ));

        let not_json = vec![(ENV_RIVER_SETTINGS_OBJECT, BASE64_STANDARD.encode("{oops"))];
        assert!(matches!(
            RiverConfig::load("r", not_json),
            Err(Error::Config(_))
        ));

        let negative = vec![(
            ENV_RIVER_SETTINGS_OBJECT,
            encoded(json!({ "simple": { "number": -1 } })),
        )];
        assert!(matches!(
            RiverConfig::load("r", negative),
            Err(Error::Config(_))
        ));
    }
}
