use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::application::dto::enrollment::{AddressForm, IntervalForm};
use crate::domain::applications::application::{ActivityApplication, PreApplicationAction};

/// Who the wizard is enrolling.
#[derive(Debug, Clone, PartialEq)]
pub enum PersonTarget {
    /// The signed-in account enrolls itself; identity fields are left alone.
    Myself(i64),
    /// An existing person picked in the wizard; identity fields are rewritten.
    Existing(i64),
    /// A person created on the fly, optionally attached to another account.
    New { attached_to_id: Option<i64> },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Identity {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileUpdate {
    pub birthday: Option<NaiveDate>,
    pub sex: Option<String>,
    pub handicap: bool,
    pub handicap_description: Option<String>,
    pub checked_gdpr: bool,
    pub checked_image_right: bool,
    pub checked_newsletter: bool,
    pub is_paying: bool,
    pub identification_number: Option<String>,
    pub instrument_ids: Vec<i64>,
    pub telephones: Vec<(String, Option<String>)>,
    /// `None` keeps the stored addresses.
    pub addresses: Option<Vec<AddressForm>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FamilyLinkPlan {
    /// `None` when the member does not exist yet and must be created.
    pub member_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub link: Option<String>,
    pub is_to_call: bool,
    pub is_accompanying: bool,
    pub is_legal_referent: bool,
    pub is_paying_for: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTermsPlan {
    pub payment_schedule_options_id: Option<i64>,
    pub day_for_collection: Option<i32>,
    pub payment_method_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelPlan {
    pub activity_ref_id: i64,
    pub evaluation_level_ref_id: i64,
}

/// One application to create, i.e. one selected activity.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedApplication {
    pub activity_ref_id: i64,
    pub formule_id: Option<i64>,
    pub childhood_preference_interval_ids: Vec<i64>,
    pub level_answers: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackPlan {
    pub activity_ref_label: String,
    pub pricing_category_id: i64,
}

/// Fully validated wizard submission, ready to be written in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentPlan {
    pub person: PersonTarget,
    pub identity: Option<Identity>,
    pub profile: ProfileUpdate,
    pub season_id: i64,
    pub levels: Vec<LevelPlan>,
    pub availabilities: Vec<IntervalForm>,
    pub payer_ids: Vec<i64>,
    pub consents: Vec<(i64, bool)>,
    pub family_links: Vec<FamilyLinkPlan>,
    pub payment_terms: Option<PaymentTermsPlan>,
    pub initial_status_id: i64,
    pub pre_application_activity_id: Option<i64>,
    pub action: PreApplicationAction,
    pub change_answers: Option<Value>,
    pub begin_at: Option<DateTime<Utc>>,
    pub applications: Vec<PlannedApplication>,
    pub comment: Option<(Option<i64>, String)>,
    pub evaluation_intervals: Vec<(i64, i64)>,
    pub selected_formule_id: Option<i64>,
    pub packs: Vec<PackPlan>,
}

#[derive(Debug, Clone)]
pub struct EnrollmentOutcome {
    pub user_id: i64,
    pub application_ids: Vec<i64>,
    pub last_application: Option<ActivityApplication>,
    pub pack_created: bool,
}
