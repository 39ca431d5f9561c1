use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::applications::application::PersonRef;
use crate::domain::catalog::activity_ref::EvaluationLevelRef;
use crate::domain::seasons::Season;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityRefBrief {
    pub id: i64,
    pub label: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelEntry {
    pub id: i64,
    pub season_id: i64,
    pub activity_ref_id: i64,
    pub evaluation_level_ref_id: i64,
    pub evaluation_level_ref: Option<EvaluationLevelRefRow>,
}

/// Same shape as `EvaluationLevelRef`, readable from JSON aggregates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationLevelRefRow {
    pub id: i64,
    pub value: i32,
    pub label: String,
}

impl From<EvaluationLevelRefRow> for EvaluationLevelRef {
    fn from(row: EvaluationLevelRefRow) -> Self {
        Self {
            id: row.id,
            value: row.value,
            label: row.label,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub adherent_number: Option<i64>,
    pub birthday: Option<NaiveDate>,
    pub levels: Vec<LevelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionOnly {
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Availability {
    pub id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One row of the applications table.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationListItem {
    pub id: i64,
    pub user_id: i64,
    pub season_id: i64,
    pub activity_application_status_id: Option<i64>,
    pub referent_id: Option<i64>,
    pub begin_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub mail_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub activity_refs: Vec<ActivityRefBrief>,
    pub user: ListUser,
    pub pre_application_activity: Option<ActionOnly>,
    pub pre_application_desired_activity: Option<ActionOnly>,
    pub season: Season,
    pub referent: Option<PersonRef>,
    pub availabilities: Vec<Availability>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationListPage {
    pub applications: Vec<ApplicationListItem>,
    pub pages: i64,
    pub total: i64,
    pub pending_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Telephone {
    pub number: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostalAddress {
    pub street_address: Option<String>,
    pub postcode: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportLevel {
    pub season_id: i64,
    pub activity_ref_id: i64,
    pub activity_label: Option<String>,
    pub level_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportComment {
    pub content: String,
    pub author_first_name: Option<String>,
    pub author_last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExportContact {
    pub first_name: String,
    pub last_name: String,
    pub telephones: Vec<Telephone>,
}

/// Everything one CSV line needs, loaded in a single pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub id: i64,
    pub season_id: i64,
    pub activity_refs: Vec<ActivityRefBrief>,
    pub levels: Vec<ExportLevel>,
    pub pre_application_desired_activity: Option<ActionOnly>,
    pub pre_application_activity: Option<ActionOnly>,
    pub status_label: Option<String>,
    pub season_label: Option<String>,
    pub adherent_number: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub birthday: Option<NaiveDate>,
    pub email: Option<String>,
    pub address: Option<PostalAddress>,
    pub telephones: Vec<Telephone>,
    pub legal_referent: Option<ExportContact>,
    pub availabilities: Vec<Availability>,
    pub comments: Vec<ExportComment>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DashboardCounts {
    pub unpaid_first_due_total: f64,
    pub applications_count: i64,
    pub applications_to_process: i64,
    pub processing_applications_count: i64,
    pub processed_applications_count: i64,
}

/// A user's application as embedded in another application's detail view.
#[derive(Debug, Clone)]
pub struct EmbeddedApplication {
    pub activity_ref_ids: Vec<i64>,
    pub json: serde_json::Value,
}

/// Core fields of the detail view used by the begin-date adjustment.
#[derive(Debug, Clone)]
pub struct ApplicationProgress {
    pub season_start: DateTime<Utc>,
    pub season_end: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    /// Any desired activity validated or carrying an option.
    pub has_progress: bool,
}

/// Bulk action targets: `"all"` (the filtered set) or explicit ids.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    All,
    Ids(Vec<i64>),
}

impl Targets {
    pub fn parse(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if s == "all" => Some(Targets::All),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_i64()
                        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                })
                .collect::<Option<Vec<_>>>()
                .map(Targets::Ids),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn targets_accept_all_or_id_lists() {
        assert_eq!(Targets::parse(&json!("all")), Some(Targets::All));
        assert_eq!(Targets::parse(&json!([1, "2"])), Some(Targets::Ids(vec![1, 2])));
        assert_eq!(Targets::parse(&json!(["x"])), None);
        assert_eq!(Targets::parse(&json!(3)), None);
    }
}
