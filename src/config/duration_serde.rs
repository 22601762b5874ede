//! Duration fields that accept bare seconds or humantime strings.
//!
//! Configuration knobs like `heartbeat_timeout = "90s"` read better as
//! text, but bare integers (`heartbeat_timeout = 90`) should keep working
//! for operators who template their config. Serialization always emits the
//! humantime form.

use serde::{Deserialize, Deserializer, Serializer, de};
use std::time::Duration;

/// Wire shape: either a number of seconds or a humantime string
#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Seconds(u64),
    Text(String),
}

impl DurationRepr {
    fn into_duration<E: de::Error>(self) -> Result<Duration, E> {
        match self {
            DurationRepr::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
            DurationRepr::Text(text) => humantime::parse_duration(&text).map_err(|e| {
                de::Error::custom(format!("cannot parse '{text}' as a duration: {e}"))
            }),
        }
    }
}

/// Use with `#[serde(with = "duration_serde::duration")]`
pub mod duration {
    use super::*;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        DurationRepr::deserialize(deserializer)?.into_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize)]
    struct Knob {
        #[serde(with = "duration")]
        timeout: Duration,
    }

    #[test]
    fn accepts_seconds_and_humantime_text() {
        let from_text: Knob = serde_json::from_str(r#"{"timeout":"1h30m"}"#).unwrap();
        assert_eq!(from_text.timeout, Duration::from_secs(5400));

        let from_number: Knob = serde_json::from_str(r#"{"timeout":90}"#).unwrap();
        assert_eq!(from_number.timeout, Duration::from_secs(90));
    }

    #[test]
    fn serializes_as_humantime_text() {
        let knob = Knob {
            timeout: Duration::from_secs(90),
        };
        assert_eq!(serde_json::to_string(&knob).unwrap(), r#"{"timeout":"1m 30s"}"#);
    }

    #[test]
    fn rejects_garbage() {
        assert!(serde_json::from_str::<Knob>(r#"{"timeout":"soon"}"#).is_err());
    }
}
