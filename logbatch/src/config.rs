//! Buffer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::FlushPolicy;

/// Configuration of a [`LogBuffer`][crate::LogBuffer].
///
/// The presence of [`Config::max_size`] selects [`FlushPolicy::SizeOrTime`], its absence
/// [`FlushPolicy::Timed`].
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use logbatch::{Config, FlushPolicy};
///
/// let config: Config = serde_json::from_str(r#"{ "buffer_time_ms": 200, "max_size": 120 }"#)?;
///
/// assert_eq!(
///     config.policy()?,
///     FlushPolicy::SizeOrTime {
///         buffer_time: Duration::from_millis(200),
///         max_size: 120,
///     }
/// );
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Interval between flushes, serialized as whole milliseconds.
    #[serde(rename = "buffer_time_ms", with = "millis")]
    pub buffer_time: Duration,

    /// Size threshold in bytes of the formatted pending messages.
    pub max_size: Option<usize>,

    /// Inserted between the messages of a flushed block.
    pub separator: String,
}

impl Default for Config {
    /// Flushes every 100 milliseconds, one message per line, without a size threshold.
    fn default() -> Self {
        Self {
            buffer_time: Duration::from_millis(100),
            max_size: None,
            separator: "\n".to_owned(),
        }
    }
}

impl Config {
    /// Validates the configuration and returns the flush policy it describes.
    pub fn policy(&self) -> Result<FlushPolicy, ConfigError> {
        if self.buffer_time.is_zero() {
            return Err(ConfigError::ZeroBufferTime);
        }

        match self.max_size {
            None => Ok(FlushPolicy::Timed {
                buffer_time: self.buffer_time,
            }),
            Some(0) => Err(ConfigError::ZeroMaxSize),
            Some(max_size) => Ok(FlushPolicy::SizeOrTime {
                buffer_time: self.buffer_time,
                max_size,
            }),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
