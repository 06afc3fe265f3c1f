//! Datastore configuration and per-operation read/write settings.
//!
//! Read preference, read concern and write concern are resolved through a three-tier
//! fallback: the explicit per-operation option, then the datastore default, then nothing
//! (leaving the choice to the driver and server).
//!
//! ```ignore
//! use docmap::config::{DatastoreConfig, WriteConcern, Acknowledgment};
//!
//! let config = DatastoreConfig::from_json(r#"{
//!     "write_concern": { "w": "majority", "journal": true },
//!     "enum_codec_strategy": "ordinal",
//!     "trace": true
//! }"#)?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::DatastoreResult, value::EnumCodecStrategy};

/// Which replica set members reads are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPreference {
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

/// Consistency and isolation of read operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadConcern {
    Local,
    Available,
    Majority,
    Linearizable,
    Snapshot,
}

/// The `w` component of a write concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acknowledgment {
    /// Acknowledged by the given number of nodes.
    Nodes(u32),
    Majority,
    /// A custom write concern name defined on the replica set.
    Custom(String),
}

/// Acknowledgment requested from the server for write operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConcern {
    pub w: Option<Acknowledgment>,
    pub journal: Option<bool>,
    #[serde(with = "duration_millis")]
    pub w_timeout: Option<Duration>,
}

impl WriteConcern {
    pub fn majority() -> Self {
        WriteConcern {
            w: Some(Acknowledgment::Majority),
            ..WriteConcern::default()
        }
    }

    pub fn nodes(count: u32) -> Self {
        WriteConcern {
            w: Some(Acknowledgment::Nodes(count)),
            ..WriteConcern::default()
        }
    }

    pub fn journal(mut self, journal: bool) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn w_timeout(mut self, timeout: Duration) -> Self {
        self.w_timeout = Some(timeout);
        self
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Serializable datastore-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    pub read_preference: Option<ReadPreference>,
    pub read_concern: Option<ReadConcern>,
    pub write_concern: Option<WriteConcern>,
    pub enum_codec_strategy: EnumCodecStrategy,
    /// Logs resolved collection names, filters, sorts and projections before each
    /// operation.
    pub trace: bool,
}

impl DatastoreConfig {
    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> DatastoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Per-operation overrides of the datastore defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationOptions {
    pub read_preference: Option<ReadPreference>,
    pub read_concern: Option<ReadConcern>,
    pub write_concern: Option<WriteConcern>,
}

impl OperationOptions {
    pub fn new() -> Self {
        OperationOptions::default()
    }

    pub fn read_preference(mut self, preference: ReadPreference) -> Self {
        self.read_preference = Some(preference);
        self
    }

    pub fn read_concern(mut self, concern: ReadConcern) -> Self {
        self.read_concern = Some(concern);
        self
    }

    pub fn write_concern(mut self, concern: WriteConcern) -> Self {
        self.write_concern = Some(concern);
        self
    }

    /// The read preference in effect for an operation.
    pub fn effective_read_preference(&self, config: &DatastoreConfig) -> Option<ReadPreference> {
        self.read_preference.or(config.read_preference)
    }

    /// The read concern in effect for an operation.
    pub fn effective_read_concern(&self, config: &DatastoreConfig) -> Option<ReadConcern> {
        self.read_concern.or(config.read_concern)
    }

    /// The write concern in effect for an operation.
    pub fn effective_write_concern(&self, config: &DatastoreConfig) -> Option<WriteConcern> {
        self.write_concern.clone().or_else(|| config.write_concern.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(ReadPreference::Nearest), Some(ReadPreference::Secondary), Some(ReadPreference::Nearest))]
    #[case(None, Some(ReadPreference::Secondary), Some(ReadPreference::Secondary))]
    #[case(None, None, None)]
    fn read_preference_fallback(
        #[case] operation: Option<ReadPreference>,
        #[case] datastore: Option<ReadPreference>,
        #[case] expected: Option<ReadPreference>,
    ) {
        let options = OperationOptions {
            read_preference: operation,
            ..OperationOptions::default()
        };
        let config = DatastoreConfig {
            read_preference: datastore,
            ..DatastoreConfig::default()
        };

        assert_eq!(options.effective_read_preference(&config), expected);
    }

    #[test]
    fn concern_fallback() {
        let config = DatastoreConfig {
            read_concern: Some(ReadConcern::Majority),
            write_concern: Some(WriteConcern::majority()),
            ..DatastoreConfig::default()
        };

        let defaults = OperationOptions::new();
        assert_eq!(defaults.effective_read_concern(&config), Some(ReadConcern::Majority));
        assert_eq!(defaults.effective_write_concern(&config), Some(WriteConcern::majority()));

        let overridden = OperationOptions::new()
            .read_concern(ReadConcern::Local)
            .write_concern(WriteConcern::nodes(1));
        assert_eq!(overridden.effective_read_concern(&config), Some(ReadConcern::Local));
        assert_eq!(overridden.effective_write_concern(&config), Some(WriteConcern::nodes(1)));

        assert_eq!(OperationOptions::new().effective_read_concern(&DatastoreConfig::default()), None);
    }

    #[test]
    fn config_from_json() {
        let config = DatastoreConfig::from_json(
            r#"{
                "read_preference": "secondary_preferred",
                "write_concern": { "w": "majority", "journal": true, "w_timeout": 500 },
                "enum_codec_strategy": "ordinal",
                "trace": true
            }"#,
        )
        .unwrap();

        assert_eq!(config.read_preference, Some(ReadPreference::SecondaryPreferred));
        assert_eq!(
            config.write_concern,
            Some(WriteConcern::majority().journal(true).w_timeout(Duration::from_millis(500)))
        );
        assert_eq!(config.enum_codec_strategy, EnumCodecStrategy::Ordinal);
        assert!(config.trace);
        assert_eq!(config.read_concern, None);
    }
}
