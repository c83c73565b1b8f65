use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, time::Duration as StdDuration};

/// A Gateway API duration, e.g. `200ms` or `1h30m`.
///
/// The format is a restricted subset of Go's `time.Duration` strings: one to
/// four components, each made of up to five digits followed by one of `h`,
/// `m`, `s` or `ms`. Durations are never negative and never fractional.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(StdDuration);

#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("empty duration")]
    Empty,

    #[error("invalid unit: {}", EXPECTED_UNITS)]
    InvalidUnit,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("missing a value before the unit")]
    NoValue,

    #[error("components may have at most {MAX_DIGITS} digits")]
    TooManyDigits,

    #[error("durations may have at most {MAX_COMPONENTS} components")]
    TooManyComponents,
}

const EXPECTED_UNITS: &str = "expected one of 'h', 'm', 's', or 'ms'";
const MAX_DIGITS: usize = 5;
const MAX_COMPONENTS: usize = 4;

const MINUTE: StdDuration = StdDuration::from_secs(60);
const HOUR: StdDuration = StdDuration::from_secs(60 * 60);

impl Duration {
    pub const fn from_millis(ms: u64) -> Self {
        Self(StdDuration::from_millis(ms))
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(StdDuration::from_secs(secs))
    }
}

impl From<StdDuration> for Duration {
    fn from(d: StdDuration) -> Self {
        Self(d)
    }
}

impl From<Duration> for StdDuration {
    fn from(Duration(d): Duration) -> Self {
        d
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Duration {
    /// Formats the duration in its shortest Gateway API form. Sub-millisecond
    /// precision is dropped, since the format cannot express it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ms = self.0.as_millis();
        if ms == 0 {
            return f.write_str("0s");
        }

        for (unit, per) in [("h", 3_600_000), ("m", 60_000), ("s", 1_000), ("ms", 1)] {
            let n = ms / per;
            if n > 0 {
                write!(f, "{n}{unit}")?;
                ms -= n * per;
            }
        }
        Ok(())
    }
}

impl FromStr for Duration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // See https://gateway-api.sigs.k8s.io/geps/gep-2257/
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut rest = s;
        let mut total = StdDuration::ZERO;
        let mut components = 0;
        while !rest.is_empty() {
            components += 1;
            if components > MAX_COMPONENTS {
                return Err(ParseError::TooManyComponents);
            }

            let digits = rest
                .find(|c: char| !c.is_ascii_digit())
                .ok_or(ParseError::NoUnit)?;
            if digits == 0 {
                return Err(ParseError::NoValue);
            }
            if digits > MAX_DIGITS {
                return Err(ParseError::TooManyDigits);
            }
            let (val, tail) = rest.split_at(digits);
            // At most five ASCII digits always fit.
            let val = val.parse::<u32>().map_err(|_| ParseError::NoValue)?;

            let unit_len = tail
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_len);
            let base = match unit {
                "h" => HOUR,
                "m" => MINUTE,
                "s" => StdDuration::from_secs(1),
                "ms" => StdDuration::from_millis(1),
                _ => return Err(ParseError::InvalidUnit),
            };
            total += base * val;
            rest = tail;
        }

        Ok(Self(total))
    }
}

impl Serialize for Duration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl de::Visitor<'_> for Visitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a Gateway API duration string, like `200ms` or `1h30m`")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse::<Duration>().map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(Visitor)
    }
}

impl schemars::JsonSchema for Duration {
    fn schema_name() -> String {
        "Duration".to_owned()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            string: Some(Box::new(schemars::schema::StringValidation {
                pattern: Some("^([0-9]{1,5}(h|m|s|ms)){1,4}$".to_string()),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}
