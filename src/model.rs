//! Data model for one fetch outcome.
//!
//! A `PowerReading` is built exactly once per successful fetch and never
//! mutated afterwards. Unit labels travel with the values for console
//! rendering but are dropped from the JSON form.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{code, Error};

/// Default unit label for power usage.
pub const USAGE_UNIT: &str = "kWh";
/// Default unit label for power cost (Japanese yen, as the portal shows it).
pub const COST_UNIT: &str = "円";
/// Default unit label for CO2 emission.
pub const CO2_UNIT: &str = "kg";

/// Aggregation window the portal is asked to report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportingPeriod {
    Today,
    Month,
}

impl ReportingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Month => "month",
        }
    }

    /// Visible label of the matching dropdown option on the portal page.
    /// Site contract: must track the portal's own text exactly.
    pub fn option_label(&self) -> &'static str {
        match self {
            Self::Today => "今日",
            Self::Month => "今月",
        }
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportingPeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "month" => Ok(Self::Month),
            other => Err(Error::extraction(
                format!("invalid period: {other}. Must be 'today' or 'month'."),
                code::INVALID_PERIOD,
            )),
        }
    }
}

/// A measured value with its display unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    /// Replace the unit label. The serialized numeric value is unaffected.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// One complete fetch result: usage, cost and CO2 for a reporting period.
#[derive(Debug, Clone)]
pub struct PowerReading {
    pub period: ReportingPeriod,
    pub acquired_at: DateTime<Local>,
    pub usage: Quantity,
    pub cost: Quantity,
    pub co2: Quantity,
}

impl PowerReading {
    /// Build a reading stamped with the current local time.
    pub fn new(period: ReportingPeriod, usage: f64, cost: f64, co2: f64) -> Self {
        Self {
            period,
            acquired_at: Local::now(),
            usage: Quantity::new(usage, USAGE_UNIT),
            cost: Quantity::new(cost, COST_UNIT),
            co2: Quantity::new(co2, CO2_UNIT),
        }
    }

    /// Canonical JSON form. Unit labels are dropped; the timestamp is
    /// RFC 3339.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "period": self.period.as_str(),
            "timestamp": self.acquired_at.to_rfc3339(),
            "usage": self.usage.value,
            "cost": self.cost.value,
            "co2": self.co2.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_round_trip() {
        for period in [ReportingPeriod::Today, ReportingPeriod::Month] {
            assert_eq!(period.as_str().parse::<ReportingPeriod>().unwrap(), period);
        }
    }

    #[test]
    fn test_period_rejects_unknown() {
        let err = "yesterday".parse::<ReportingPeriod>().unwrap_err();
        assert_eq!(err.code(), code::INVALID_PERIOD);
    }

    #[test]
    fn test_default_units() {
        let reading = PowerReading::new(ReportingPeriod::Today, 1.0, 2.0, 3.0);
        assert_eq!(reading.usage.unit, "kWh");
        assert_eq!(reading.cost.unit, "円");
        assert_eq!(reading.co2.unit, "kg");
    }

    #[test]
    fn test_unit_override_keeps_value() {
        let reading = PowerReading::new(ReportingPeriod::Month, 14.5, 350.0, 6.25);
        let overridden = PowerReading {
            cost: reading.cost.clone().with_unit("JPY"),
            ..reading.clone()
        };
        assert_eq!(
            reading.to_json()["cost"].as_f64(),
            overridden.to_json()["cost"].as_f64()
        );
    }

    #[test]
    fn test_json_drops_units() {
        let reading = PowerReading::new(ReportingPeriod::Today, 12.5, 350.0, 6.25);
        let value = reading.to_json();
        assert_eq!(value["period"], "today");
        assert_eq!(value["usage"], 12.5);
        assert_eq!(value["cost"], 350.0);
        assert_eq!(value["co2"], 6.25);
        assert!(value["timestamp"].is_string());
        assert!(value.get("unit").is_none());
    }

    #[test]
    fn test_json_round_trip_preserves_numbers() {
        let reading = PowerReading::new(ReportingPeriod::Month, 100.0, 542.02, 0.5);
        let text = serde_json::to_string(&reading.to_json()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["period"].as_str().unwrap(), reading.period.as_str());
        assert_eq!(parsed["usage"].as_f64().unwrap(), reading.usage.value);
        assert_eq!(parsed["cost"].as_f64().unwrap(), reading.cost.value);
        assert_eq!(parsed["co2"].as_f64().unwrap(), reading.co2.value);
    }
}
