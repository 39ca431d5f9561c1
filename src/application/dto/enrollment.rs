use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Identifier as posted by browser forms: either a JSON number or a string.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FlexId {
    Int(i64),
    Text(String),
}

impl FlexId {
    pub fn value(&self) -> Option<i64> {
        match self {
            FlexId::Int(v) => Some(*v),
            FlexId::Text(s) => s.trim().parse().ok(),
        }
    }
}

pub fn flex_ids(values: &[FlexId]) -> Vec<i64> {
    values.iter().filter_map(FlexId::value).collect()
}

/// Body of the enrollment wizard's final step.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentSubmission {
    pub application: EnrollmentForm,
    #[serde(rename = "preApplicationActivityId", default)]
    pub pre_application_activity_id: Option<FlexId>,
    #[serde(rename = "actionType", default)]
    pub action_type: Option<FlexId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentForm {
    #[serde(default)]
    pub person_selection: Option<String>,
    #[serde(default)]
    pub user: Option<IdForm>,
    pub infos: PersonInfos,
    #[serde(rename = "season_id")]
    pub season_id: FlexId,
    #[serde(default)]
    pub personal_levels: HashMap<String, FlexId>,
    #[serde(default)]
    pub level_questionnaire_answers: HashMap<String, Value>,
    #[serde(default)]
    pub intervals: Vec<IntervalForm>,
    #[serde(default)]
    pub application_change_answers: serde_json::Map<String, Value>,
    #[serde(default)]
    pub selected_activities: Vec<FlexId>,
    #[serde(default)]
    pub selected_formula_activities: HashMap<String, Vec<FlexId>>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(rename = "begin_at", default)]
    pub begin_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub childhood_preferences: HashMap<String, Vec<IdForm>>,
    #[serde(default)]
    pub practiced_instruments: Vec<Value>,
    #[serde(default)]
    pub selected_evaluation_intervals: HashMap<String, Option<IdForm>>,
    #[serde(default)]
    pub selected_formulas: Vec<FlexId>,
    #[serde(default)]
    pub selected_packs: HashMap<String, FlexId>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IdForm {
    pub id: FlexId,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PersonInfos {
    #[serde(default)]
    pub id: Option<FlexId>,
    #[serde(default)]
    pub attached_to_id: Option<FlexId>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub handicap_description: Option<String>,
    #[serde(default)]
    pub checked_gdpr: Option<bool>,
    #[serde(default)]
    pub checked_image_right: Option<bool>,
    #[serde(default)]
    pub checked_newsletter: Option<bool>,
    #[serde(default)]
    pub is_paying: Option<bool>,
    #[serde(default)]
    pub identification_number: Option<Value>,
    #[serde(default)]
    pub instruments: Option<Vec<IdForm>>,
    #[serde(default)]
    pub telephones: Option<Vec<TelephoneForm>>,
    #[serde(default)]
    pub addresses: Option<Vec<AddressForm>>,
    #[serde(default)]
    pub payers: Option<Vec<FlexId>>,
    #[serde(default)]
    pub consent_docs: Option<HashMap<String, ConsentForm>>,
    #[serde(default)]
    pub family_links_with_user: Option<Vec<FamilyLinkForm>>,
    #[serde(default)]
    pub payer_payment_terms: Option<Vec<PaymentTermsForm>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TelephoneForm {
    pub number: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct AddressForm {
    #[serde(default)]
    pub street_address: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IntervalForm {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConsentForm {
    #[serde(default)]
    pub agreement: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct FamilyLinkForm {
    #[serde(default)]
    pub id: Option<FlexId>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub is_to_call: Option<bool>,
    #[serde(default)]
    pub is_accompanying: Option<bool>,
    #[serde(default)]
    pub is_legal_referent: Option<bool>,
    #[serde(default)]
    pub is_paying_for: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PaymentTermsForm {
    pub season_id: FlexId,
    #[serde(default)]
    pub payment_schedule_options_id: Option<FlexId>,
    #[serde(default)]
    pub day_for_collection: Option<i32>,
    #[serde(default)]
    pub payment_method_id: Option<FlexId>,
}
