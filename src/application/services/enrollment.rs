use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::application::dto::enrollment::{EnrollmentSubmission, FlexId, flex_ids};
use crate::application::dto::enrollment_plan::{
    EnrollmentPlan, FamilyLinkPlan, Identity, LevelPlan, PackPlan, PaymentTermsPlan, PersonTarget,
    PlannedApplication, ProfileUpdate,
};
use crate::domain::applications::application::PreApplicationAction;
use crate::domain::applications::status::TREATMENT_PENDING_ID;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PlanError {
    #[error("season id is missing or invalid")]
    InvalidSeason,
    #[error("the enrolling account is missing")]
    MissingUser,
    #[error("invalid activity reference `{0}`")]
    InvalidActivity(String),
}

/// The status a new application starts in, given the stored default.
pub fn initial_status(default_status: Option<i64>) -> i64 {
    default_status
        .filter(|id| *id > 0)
        .unwrap_or(TREATMENT_PENDING_ID)
}

fn identification_number(value: &Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn key_id(key: &str) -> Option<i64> {
    key.trim().parse().ok()
}

/// Turns the wizard's final payload into a validated write plan.
pub fn plan_enrollment(
    submission: &EnrollmentSubmission,
    initial_status_id: i64,
) -> Result<EnrollmentPlan, PlanError> {
    let form = &submission.application;
    let infos = &form.infos;
    let season_id = form.season_id.value().ok_or(PlanError::InvalidSeason)?;

    let (person, identity) = if form.person_selection.as_deref() == Some("myself") {
        let id = form
            .user
            .as_ref()
            .and_then(|u| u.id.value())
            .ok_or(PlanError::MissingUser)?;
        (PersonTarget::Myself(id), None)
    } else {
        let target = match infos.id.as_ref().and_then(FlexId::value) {
            Some(id) if id != 0 => PersonTarget::Existing(id),
            _ => PersonTarget::New {
                attached_to_id: infos.attached_to_id.as_ref().and_then(FlexId::value),
            },
        };
        let identity = Identity {
            first_name: infos.first_name.clone().unwrap_or_default(),
            last_name: infos.last_name.clone().unwrap_or_default(),
            email: infos.email.clone(),
        };
        (target, Some(identity))
    };

    let mut levels: Vec<LevelPlan> = form
        .personal_levels
        .iter()
        .filter(|(ref_id, _)| !form.level_questionnaire_answers.contains_key(ref_id.as_str()))
        .filter_map(|(ref_id, level)| {
            Some(LevelPlan {
                activity_ref_id: key_id(ref_id)?,
                evaluation_level_ref_id: level.value()?,
            })
        })
        .collect();
    levels.sort_by_key(|l| l.activity_ref_id);

    let handicap_description = infos
        .handicap_description
        .clone()
        .filter(|d| !d.trim().is_empty());
    let profile = ProfileUpdate {
        birthday: infos.birthday,
        sex: infos.sex.clone(),
        handicap: handicap_description.is_some(),
        handicap_description,
        checked_gdpr: infos.checked_gdpr.unwrap_or(false),
        checked_image_right: infos.checked_image_right.unwrap_or(false),
        checked_newsletter: infos.checked_newsletter.unwrap_or(false),
        is_paying: infos.is_paying.unwrap_or(false),
        identification_number: identification_number(&infos.identification_number),
        instrument_ids: infos
            .instruments
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|i| i.id.value())
            .collect(),
        telephones: infos
            .telephones
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|t| (t.number.clone(), t.label.clone()))
            .collect(),
        addresses: infos.addresses.clone(),
    };

    let mut consents: Vec<(i64, bool)> = infos
        .consent_docs
        .iter()
        .flatten()
        .filter_map(|(key, consent)| {
            let id = key_id(key.trim_start_matches("id_"))?;
            Some((id, consent.agreement.unwrap_or(false)))
        })
        .collect();
    consents.sort_by_key(|(id, _)| *id);

    let family_links = infos
        .family_links_with_user
        .iter()
        .flatten()
        .map(|link| FamilyLinkPlan {
            member_id: link.id.as_ref().and_then(FlexId::value).filter(|id| *id > 0),
            first_name: link.first_name.clone(),
            last_name: link.last_name.clone(),
            email: link.email.clone(),
            birthday: link.birthday,
            link: link.link.clone(),
            is_to_call: link.is_to_call.unwrap_or(false),
            is_accompanying: link.is_accompanying.unwrap_or(false),
            is_legal_referent: link.is_legal_referent.unwrap_or(false),
            is_paying_for: link.is_paying_for.unwrap_or(false),
        })
        .collect();

    let payment_terms = infos
        .payer_payment_terms
        .iter()
        .flatten()
        .find(|t| t.season_id.value() == Some(season_id))
        .map(|t| PaymentTermsPlan {
            payment_schedule_options_id: t.payment_schedule_options_id.as_ref().and_then(FlexId::value),
            day_for_collection: t.day_for_collection,
            payment_method_id: t.payment_method_id.as_ref().and_then(FlexId::value),
        });

    let pre_application_activity_id = submission
        .pre_application_activity_id
        .as_ref()
        .and_then(FlexId::value)
        .filter(|id| *id != 0);
    let action = submission
        .action_type
        .as_ref()
        .and_then(FlexId::value)
        .and_then(PreApplicationAction::from_index)
        .unwrap_or(PreApplicationAction::New);

    let mut applications = Vec::with_capacity(form.selected_activities.len());
    for selected in &form.selected_activities {
        let activity_ref_id = selected.value().ok_or_else(|| {
            PlanError::InvalidActivity(match selected {
                FlexId::Int(v) => v.to_string(),
                FlexId::Text(s) => s.clone(),
            })
        })?;
        let key = activity_ref_id.to_string();
        let formule_id = form
            .selected_formula_activities
            .iter()
            .find(|(_, acts)| acts.iter().any(|a| a.value() == Some(activity_ref_id)))
            .and_then(|(formula, _)| key_id(formula));
        let childhood_preference_interval_ids = form
            .childhood_preferences
            .get(&key)
            .map(|prefs| prefs.iter().filter_map(|p| p.id.value()).collect())
            .unwrap_or_default();
        applications.push(PlannedApplication {
            activity_ref_id,
            formule_id,
            childhood_preference_interval_ids,
            level_answers: form
                .level_questionnaire_answers
                .get(&key)
                .filter(|v| !v.is_null())
                .cloned(),
        });
    }

    let comment = form
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| (form.user.as_ref().and_then(|u| u.id.value()), c.to_string()));

    let mut evaluation_intervals: Vec<(i64, i64)> = if form.practiced_instruments.is_empty() {
        Vec::new()
    } else {
        form.selected_evaluation_intervals
            .iter()
            .filter_map(|(ref_id, interval)| {
                Some((key_id(ref_id)?, interval.as_ref()?.id.value()?))
            })
            .collect()
    };
    evaluation_intervals.sort();

    let mut packs: Vec<PackPlan> = form
        .selected_packs
        .iter()
        .filter_map(|(label, category)| {
            Some(PackPlan {
                activity_ref_label: label.clone(),
                pricing_category_id: category.value()?,
            })
        })
        .collect();
    packs.sort_by(|a, b| a.activity_ref_label.cmp(&b.activity_ref_label));

    Ok(EnrollmentPlan {
        person,
        identity,
        profile,
        season_id,
        levels,
        availabilities: form.intervals.clone(),
        payer_ids: flex_ids(infos.payers.as_deref().unwrap_or_default()),
        consents,
        family_links,
        payment_terms,
        initial_status_id,
        pre_application_activity_id,
        action,
        change_answers: (!form.application_change_answers.is_empty())
            .then(|| Value::Object(form.application_change_answers.clone())),
        begin_at: form.begin_at,
        applications,
        comment,
        evaluation_intervals,
        selected_formule_id: flex_ids(&form.selected_formulas).first().copied(),
        packs,
    })
}

/// How attendance must follow a begin date change.
#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceShift {
    /// Starting later: drop attendance in `[from, to]`.
    Unregister {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    /// Starting earlier (or unchanged): add attendance in `[from, to]` on
    /// validated activities.
    Register {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

pub fn attendance_shift(old: DateTime<Utc>, new: DateTime<Utc>) -> AttendanceShift {
    if new > old {
        AttendanceShift::Unregister {
            from: old,
            to: new - Duration::days(1),
        }
    } else {
        AttendanceShift::Register {
            from: new,
            to: old - Duration::days(1),
        }
    }
}

/// Reason stored when a proposal is refused without explanation.
pub fn refusal_reason(raw: &str) -> String {
    if raw.is_empty() {
        "non spécifiée".to_string()
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn submission(body: Value) -> EnrollmentSubmission {
        serde_json::from_value(body).unwrap()
    }

    fn base() -> Value {
        json!({
            "application": {
                "personSelection": "other",
                "user": {"id": 7},
                "infos": {
                    "id": 0,
                    "attached_to_id": 7,
                    "first_name": "Léa",
                    "last_name": "Durand",
                    "birthday": "2015-04-02",
                    "handicap_description": "  ",
                    "identification_number": 12345,
                    "telephones": [{"number": "0600000000", "label": "portable"}],
                    "consent_docs": {"id_3": {"agreement": true}, "id_1": {"agreement": null}},
                    "payer_payment_terms": [
                        {"season_id": 1, "day_for_collection": 5},
                        {"season_id": "4", "day_for_collection": 10, "payment_method_id": "2"}
                    ]
                },
                "season_id": "4",
                "personalLevels": {"10": 2, "11": "3"},
                "levelQuestionnaireAnswers": {"11": {"q1": "yes"}},
                "selectedActivities": [10, "11"],
                "selectedFormulaActivities": {"8": ["11"]},
                "comment": "  merci  ",
                "childhoodPreferences": {"10": [{"id": 30}, {"id": "31"}]},
                "practicedInstruments": [],
                "selectedEvaluationIntervals": {"10": {"id": 99}},
                "selectedFormulas": ["8"],
                "selectedPacks": {"Piano": "6"}
            },
            "preApplicationActivityId": "0",
            "actionType": 2
        })
    }

    #[test]
    fn plans_a_new_person_enrollment() {
        let plan = plan_enrollment(&submission(base()), 1).unwrap();
        assert_eq!(plan.person, PersonTarget::New { attached_to_id: Some(7) });
        assert_eq!(plan.identity.as_ref().map(|i| i.first_name.as_str()), Some("Léa"));
        assert_eq!(plan.season_id, 4);
        assert_eq!(
            plan.levels,
            vec![LevelPlan {
                activity_ref_id: 10,
                evaluation_level_ref_id: 2
            }]
        );
        assert!(!plan.profile.handicap);
        assert_eq!(plan.profile.identification_number.as_deref(), Some("12345"));
        assert_eq!(plan.consents, vec![(1, false), (3, true)]);
        assert_eq!(
            plan.payment_terms,
            Some(PaymentTermsPlan {
                payment_schedule_options_id: None,
                day_for_collection: Some(10),
                payment_method_id: Some(2),
            })
        );
        assert_eq!(plan.pre_application_activity_id, None);
        assert_eq!(plan.action, PreApplicationAction::Change);
        assert_eq!(plan.applications.len(), 2);
        assert_eq!(plan.applications[0].formule_id, None);
        assert_eq!(plan.applications[0].childhood_preference_interval_ids, vec![30, 31]);
        assert_eq!(plan.applications[1].formule_id, Some(8));
        assert_eq!(plan.applications[1].level_answers, Some(json!({"q1": "yes"})));
        assert_eq!(plan.comment, Some((Some(7), "merci".to_string())));
        assert!(plan.evaluation_intervals.is_empty());
        assert_eq!(plan.selected_formule_id, Some(8));
        assert_eq!(
            plan.packs,
            vec![PackPlan {
                activity_ref_label: "Piano".into(),
                pricing_category_id: 6
            }]
        );
    }

    #[test]
    fn evaluation_needs_practiced_instruments() {
        let mut body = base();
        body["application"]["practicedInstruments"] = json!([{"id": 1}]);
        let plan = plan_enrollment(&submission(body), 1).unwrap();
        assert_eq!(plan.evaluation_intervals, vec![(10, 99)]);
    }

    #[test]
    fn myself_requires_the_account_id() {
        let mut body = base();
        body["application"]["personSelection"] = json!("myself");
        let plan = plan_enrollment(&submission(body.clone()), 1).unwrap();
        assert_eq!(plan.person, PersonTarget::Myself(7));
        assert!(plan.identity.is_none());

        body["application"]["user"] = Value::Null;
        assert_eq!(
            plan_enrollment(&submission(body), 1).unwrap_err(),
            PlanError::MissingUser
        );
    }

    #[test]
    fn rejects_unreadable_activities() {
        let mut body = base();
        body["application"]["selectedActivities"] = json!(["piano"]);
        assert_eq!(
            plan_enrollment(&submission(body), 1).unwrap_err(),
            PlanError::InvalidActivity("piano".into())
        );
    }

    #[test]
    fn default_status_must_be_positive() {
        assert_eq!(initial_status(Some(3)), 3);
        assert_eq!(initial_status(Some(0)), TREATMENT_PENDING_ID);
        assert_eq!(initial_status(None), TREATMENT_PENDING_ID);
    }

    #[test]
    fn begin_date_shift_direction() {
        let old = Utc.with_ymd_and_hms(2025, 9, 10, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 9, 20, 0, 0, 0).unwrap();
        assert_eq!(
            attendance_shift(old, later),
            AttendanceShift::Unregister {
                from: old,
                to: Utc.with_ymd_and_hms(2025, 9, 19, 0, 0, 0).unwrap()
            }
        );
        assert_eq!(
            attendance_shift(later, old),
            AttendanceShift::Register {
                from: old,
                to: Utc.with_ymd_and_hms(2025, 9, 19, 0, 0, 0).unwrap()
            }
        );
    }

    #[test]
    fn empty_refusal_reason_is_unspecified() {
        assert_eq!(refusal_reason(""), "non spécifiée");
        assert_eq!(refusal_reason("complet"), "complet");
    }
}
