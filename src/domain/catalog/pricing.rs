use chrono::{DateTime, Utc};
use serde::Serialize;

pub const TARGET_ACTIVITY_REF: &str = "ActivityRef";
pub const TARGET_ACTIVITY_REF_KIND: &str = "ActivityRefKind";

/// Highest price of an activity ref (or of a whole kind) for one season.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MaxPrice {
    pub target_type: String,
    pub target_id: i64,
    pub season_id: i64,
    pub price: f64,
}

/// A price line with the bounds of the seasons it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct RefPricing {
    pub activity_ref_id: i64,
    pub price: f64,
    pub from_season_start: DateTime<Utc>,
    pub to_season_end: Option<DateTime<Utc>>,
}

impl RefPricing {
    pub fn applies_to_season_starting(&self, season_start: DateTime<Utc>) -> bool {
        self.from_season_start <= season_start
            && self
                .to_season_end
                .map(|end| end >= season_start)
                .unwrap_or(true)
    }
}

/// A pack offer: a pricing line whose category sells a bundle of lessons.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PackOffer {
    pub id: i64,
    pub activity_ref_id: i64,
    pub activity_ref_label: String,
    pub price: f64,
    pub pricing_category_id: i64,
    pub pricing_category_name: String,
    pub number_lessons: Option<i32>,
}
