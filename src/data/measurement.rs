//! Humidity/temperature measurement records.
//!
//! Humidity and temperature arrive on independent notification streams,
//! so a record for one point in time is assembled by merging partial
//! measurements that share a timestamp or log index.

use std::fmt;

/// One (possibly partial) humidity/temperature sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurement {
    /// Log index within a history download, if this came from one.
    pub index: Option<u32>,

    /// Absolute timestamp in seconds since the epoch, once assigned.
    pub timestamp: Option<f64>,

    /// Temperature in degrees Celsius.
    pub temperature: Option<f32>,

    /// Relative humidity, 0-100 %.
    pub humidity: Option<f32>,
}

impl Measurement {
    /// A measurement with a single field set.
    pub fn with_temperature(value: f32) -> Self {
        Self {
            temperature: Some(value),
            ..Self::default()
        }
    }

    /// A measurement with a single field set.
    pub fn with_humidity(value: f32) -> Self {
        Self {
            humidity: Some(value),
            ..Self::default()
        }
    }

    /// Fill any unset field from `other`, preferring existing values.
    ///
    /// Merging with an all-`None` measurement is a no-op, and merging two
    /// measurements with disjoint field sets commutes.
    pub fn merge(&mut self, other: &Measurement) {
        if self.index.is_none() {
            self.index = other.index;
        }
        if self.timestamp.is_none() {
            self.timestamp = other.timestamp;
        }
        if self.temperature.is_none() {
            self.temperature = other.temperature;
        }
        if self.humidity.is_none() {
            self.humidity = other.humidity;
        }
    }

    /// How much of the expected data this record has acquired.
    ///
    /// 0 with neither attribute set, 0.5 with one, 1 with both. During a
    /// bulk download two half-complete merges count as one record of
    /// progress.
    pub fn completeness(&self) -> f64 {
        match (self.temperature.is_some(), self.humidity.is_some()) {
            (false, false) => 0.0,
            (true, true) => 1.0,
            _ => 0.5,
        }
    }
}

impl fmt::Display for Measurement {
    /// Formats as `temperature humidity` with two decimals, using the
    /// `\N` placeholder for a missing attribute.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.temperature {
            Some(t) => write!(f, "{t:.2}")?,
            None => f.write_str("\\N")?,
        }
        f.write_str(" ")?;
        match self.humidity {
            Some(h) => write!(f, "{h:.2}"),
            None => f.write_str("\\N"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_completeness_levels() {
        assert_eq!(Measurement::default().completeness(), 0.0);
        assert_eq!(Measurement::with_temperature(21.0).completeness(), 0.5);
        assert_eq!(Measurement::with_humidity(45.0).completeness(), 0.5);

        let mut both = Measurement::with_temperature(21.0);
        both.merge(&Measurement::with_humidity(45.0));
        assert_eq!(both.completeness(), 1.0);
    }

    #[test]
    fn test_merge_prefers_existing_values() {
        let mut a = Measurement::with_temperature(21.0);
        a.merge(&Measurement::with_temperature(99.0));
        assert_eq!(a.temperature, Some(21.0));
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let mut a = Measurement {
            index: Some(7),
            timestamp: Some(1000.0),
            temperature: Some(21.0),
            humidity: Some(45.0),
        };
        let before = a;
        a.merge(&Measurement::default());
        assert_eq!(a, before);
    }

    #[test]
    fn test_merge_commutes_on_disjoint_fields() {
        let t = Measurement::with_temperature(21.0);
        let h = Measurement::with_humidity(45.0);

        let mut th = t;
        th.merge(&h);
        let mut ht = h;
        ht.merge(&t);
        assert_eq!(th, ht);
    }

    #[test]
    fn test_display_placeholders() {
        let mut m = Measurement::with_temperature(21.456);
        assert_eq!(m.to_string(), "21.46 \\N");
        m.merge(&Measurement::with_humidity(45.0));
        assert_eq!(m.to_string(), "21.46 45.00");
        assert_eq!(Measurement::default().to_string(), "\\N \\N");
    }
}
