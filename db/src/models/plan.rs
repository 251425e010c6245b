use std::{collections::BTreeMap, fmt, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use common::error::{AppError, Res};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durations the catalog sells. Every plan prices all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DurationKey {
    #[serde(rename = "10-minutes")]
    TenMinutes,
    #[serde(rename = "2-hours")]
    TwoHours,
    #[serde(rename = "1-week")]
    OneWeek,
}

impl DurationKey {
    pub const ALL: [DurationKey; 3] = [
        DurationKey::TenMinutes,
        DurationKey::TwoHours,
        DurationKey::OneWeek,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DurationKey::TenMinutes => "10-minutes",
            DurationKey::TwoHours => "2-hours",
            DurationKey::OneWeek => "1-week",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            DurationKey::TenMinutes => Duration::minutes(10),
            DurationKey::TwoHours => Duration::hours(2),
            DurationKey::OneWeek => Duration::weeks(1),
        }
    }
}

impl fmt::Display for DurationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurationKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DurationKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| AppError::InvalidDuration(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// duration key -> price
    pub prices: BTreeMap<String, BigDecimal>,
    pub api_call_cap: i64,
    pub data_cap_mb: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Resolves a requested duration against this plan's price table.
    pub fn price_for(&self, duration_key: &str) -> Res<(DurationKey, BigDecimal)> {
        let key = duration_key.parse::<DurationKey>()?;
        let price = self
            .prices
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| AppError::InvalidDuration(duration_key.to_string()))?;
        Ok((key, price))
    }

    pub fn validate(&self) -> Res<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Plan name is required".to_string()));
        }
        if self.api_call_cap < 0 || self.data_cap_mb < 0 {
            return Err(AppError::BadRequest(
                "Plan caps must be non-negative".to_string(),
            ));
        }
        for key in DurationKey::ALL {
            match self.prices.get(key.as_str()) {
                None => {
                    return Err(AppError::BadRequest(format!(
                        "Plan has no price for duration '{}'",
                        key
                    )));
                }
                Some(price) if *price < BigDecimal::from(0) => {
                    return Err(AppError::BadRequest(format!(
                        "Price for duration '{}' is negative",
                        key
                    )));
                }
                Some(_) => {}
            }
        }
        if let Some(extra) = self
            .prices
            .keys()
            .find(|k| k.parse::<DurationKey>().is_err())
        {
            return Err(AppError::InvalidDuration(extra.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic() -> Plan {
        let prices = [("10-minutes", "9.99"), ("2-hours", "19.99"), ("1-week", "49.99")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), BigDecimal::from_str(v).unwrap()))
            .collect();
        Plan {
            id: Uuid::new_v4(),
            name: "Basic".to_string(),
            description: String::new(),
            prices,
            api_call_cap: 1000,
            data_cap_mb: 100,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn duration_keys_parse_and_display() {
        for key in DurationKey::ALL {
            assert_eq!(key.as_str().parse::<DurationKey>().unwrap(), key);
        }
        assert_eq!(DurationKey::TwoHours.duration(), Duration::hours(2));
        assert!(matches!(
            "3-days".parse::<DurationKey>(),
            Err(AppError::InvalidDuration(_))
        ));
    }

    #[test]
    fn price_lookup() {
        let (key, price) = basic().price_for("2-hours").unwrap();
        assert_eq!(key, DurationKey::TwoHours);
        assert_eq!(price, BigDecimal::from_str("19.99").unwrap());
        assert!(matches!(
            basic().price_for("1-month"),
            Err(AppError::InvalidDuration(_))
        ));
    }

    #[test]
    fn validation_requires_every_offered_duration() {
        assert!(basic().validate().is_ok());

        let mut missing = basic();
        missing.prices.remove("1-week");
        assert!(matches!(missing.validate(), Err(AppError::BadRequest(_))));

        let mut negative_cap = basic();
        negative_cap.api_call_cap = -1;
        assert!(negative_cap.validate().is_err());

        let mut unknown = basic();
        unknown
            .prices
            .insert("1-year".to_string(), BigDecimal::from(1));
        assert!(matches!(unknown.validate(), Err(AppError::InvalidDuration(_))));
    }
}
