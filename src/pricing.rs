//! Energy price categories
//!
//! The price service itself lives outside this crate; it hands back a list of
//! categorized price intervals and the control loop only asks which category
//! covers the current instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price category as assigned by the price service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceCategory {
    Cheap,
    Neutral,
    Expensive,
}

impl PriceCategory {
    pub fn from_label(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cheap" | "very_cheap" => Self::Cheap,
            "expensive" | "very_expensive" => Self::Expensive,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cheap => "cheap",
            Self::Neutral => "neutral",
            Self::Expensive => "expensive",
        }
    }
}

/// One price interval; `from` inclusive, `to` exclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub price: f64,
}

impl Price {
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.to
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedPrice {
    pub category: PriceCategory,
    pub price: Price,
}

impl CategorizedPrice {
    pub fn new(category: PriceCategory, price: Price) -> Self {
        Self { category, price }
    }
}

/// Category of the first interval covering `instant`
pub fn category_at(prices: &[CategorizedPrice], instant: DateTime<Utc>) -> Option<PriceCategory> {
    prices
        .iter()
        .find(|p| p.price.covers(instant))
        .map(|p| p.category)
}

/// Convert clock milliseconds to a UTC instant
pub fn instant_from_millis(millis: u64) -> DateTime<Utc> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
