use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityApplication {
    pub id: i64,
    pub user_id: i64,
    pub season_id: i64,
    #[serde(rename = "activity_application_status_id")]
    pub status_id: Option<i64>,
    pub referent_id: Option<i64>,
    pub begin_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub mail_sent_at: Option<DateTime<Utc>>,
    pub reason_of_refusal: Option<String>,
    pub formule_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The minimum an access decision needs to know about an application.
#[derive(Debug, Clone)]
pub struct ApplicationSummary {
    pub id: i64,
    pub user_id: i64,
    pub user_attached_to_id: Option<i64>,
    pub season_id: i64,
    pub status_id: Option<i64>,
    pub activity_ref_ids: Vec<i64>,
}

impl ApplicationSummary {
    pub fn concerns_any_activity_ref(&self, activity_ref_ids: &[i64]) -> bool {
        self.activity_ref_ids
            .iter()
            .any(|id| activity_ref_ids.contains(id))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DesiredActivity {
    pub id: i64,
    pub activity_application_id: i64,
    pub activity_ref_id: i64,
    pub activity_id: Option<i64>,
    pub user_id: Option<i64>,
    pub is_validated: bool,
    pub prorata: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PersonRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonRef {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: Option<PersonRef>,
}

/// Why a family came back through the wizard; stored on pre-application records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreApplicationAction {
    New,
    Renew,
    Change,
    Stop,
    PursueChildhood,
    Cham,
}

impl PreApplicationAction {
    const ORDERED: [PreApplicationAction; 6] = [
        PreApplicationAction::New,
        PreApplicationAction::Renew,
        PreApplicationAction::Change,
        PreApplicationAction::Stop,
        PreApplicationAction::PursueChildhood,
        PreApplicationAction::Cham,
    ];

    /// The wizard posts the action as its position in the list above.
    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ORDERED.get(i).copied())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PreApplicationAction::New => "new",
            PreApplicationAction::Renew => "renew",
            PreApplicationAction::Change => "change",
            PreApplicationAction::Stop => "stop",
            PreApplicationAction::PursueChildhood => "pursue_childhood",
            PreApplicationAction::Cham => "cham",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_index_follows_wizard_order() {
        assert_eq!(PreApplicationAction::from_index(0), Some(PreApplicationAction::New));
        assert_eq!(PreApplicationAction::from_index(2).map(|a| a.as_str()), Some("change"));
        assert_eq!(PreApplicationAction::from_index(5), Some(PreApplicationAction::Cham));
        assert_eq!(PreApplicationAction::from_index(6), None);
        assert_eq!(PreApplicationAction::from_index(-1), None);
    }

    #[test]
    fn summary_matches_teacher_refs() {
        let summary = ApplicationSummary {
            id: 1,
            user_id: 10,
            user_attached_to_id: None,
            season_id: 3,
            status_id: Some(1),
            activity_ref_ids: vec![4, 8],
        };
        assert!(summary.concerns_any_activity_ref(&[8, 12]));
        assert!(!summary.concerns_any_activity_ref(&[1, 2]));
        assert!(!summary.concerns_any_activity_ref(&[]));
    }
}
