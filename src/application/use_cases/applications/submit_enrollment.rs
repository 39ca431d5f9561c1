use crate::application::access::Actor;
use crate::application::dto::enrollment::EnrollmentSubmission;
use crate::application::dto::enrollment_plan::{EnrollmentOutcome, PersonTarget};
use crate::application::ports::enrollment_repository::{EnrollmentRepository, EnrollmentWriteError};
use crate::application::ports::notification_port::{
    ApplicationEvent, ErrorReport, EventTrigger, Mailer,
};
use crate::application::ports::parameter_repository::ParameterRepository;
use crate::application::ports::user_repository::UserRepository;
use crate::application::services::enrollment::{PlanError, initial_status, plan_enrollment};
use crate::domain::parameters::{DEFAULT_STATUS, MAILER_DEFAULT_FROM, NOTIFY_WIZARD_ERROR};

pub const GENERIC_FAILURE_MESSAGE: &str = "Une erreur est survenue lors de la création de votre demande d'inscription, veuillez-contacter l'administration.";
const REPORT_TITLE: &str = "Erreur lors d'une inscription";

#[derive(thiserror::Error, Debug)]
pub enum SubmitError {
    #[error("sign in required")]
    Unauthorized,
    #[error("cannot enroll this person")]
    Forbidden,
    #[error(transparent)]
    Invalid(#[from] PlanError),
    #[error("{0}")]
    IntervalTaken(String),
    #[error("{GENERIC_FAILURE_MESSAGE}")]
    Failed(#[source] anyhow::Error),
    #[error(transparent)]
    Repo(#[from] anyhow::Error),
}

pub struct SubmitEnrollment<'a, R, P, U, E, M>
where
    R: EnrollmentRepository + ?Sized,
    P: ParameterRepository + ?Sized,
    U: UserRepository + ?Sized,
    E: EventTrigger + ?Sized,
    M: Mailer + ?Sized,
{
    pub enrollments: &'a R,
    pub parameters: &'a P,
    pub users: &'a U,
    pub events: &'a E,
    pub mailer: &'a M,
}

impl<'a, R, P, U, E, M> SubmitEnrollment<'a, R, P, U, E, M>
where
    R: EnrollmentRepository + ?Sized,
    P: ParameterRepository + ?Sized,
    U: UserRepository + ?Sized,
    E: EventTrigger + ?Sized,
    M: Mailer + ?Sized,
{
    pub async fn execute(
        &self,
        actor: Option<&Actor>,
        submission: &EnrollmentSubmission,
    ) -> Result<EnrollmentOutcome, SubmitError> {
        let actor = actor.ok_or(SubmitError::Unauthorized)?;
        let default_status = self
            .parameters
            .get(DEFAULT_STATUS)
            .await?
            .and_then(|p| p.as_i64());
        let plan = plan_enrollment(submission, initial_status(default_status))?;

        let allowed = match plan.person {
            PersonTarget::Myself(id) | PersonTarget::Existing(id) => actor.can_create_for(id),
            PersonTarget::New { attached_to_id } => {
                attached_to_id.is_none_or(|owner| actor.can_create_for(owner))
            }
        };
        if !allowed {
            return Err(SubmitError::Forbidden);
        }

        let outcome = match self.enrollments.submit(&plan).await {
            Ok(outcome) => outcome,
            Err(EnrollmentWriteError::IntervalTaken(msg)) => {
                tracing::info!(reason = %msg, "enrollment_interval_taken");
                return Err(SubmitError::IntervalTaken(msg));
            }
            Err(e) => {
                let e = anyhow::Error::new(e);
                tracing::error!(error = ?e, season_id = plan.season_id, "enrollment_submit_failed");
                self.report(&e).await;
                return Err(SubmitError::Failed(e));
            }
        };

        for id in &outcome.application_ids {
            let event = ApplicationEvent::ApplicationCreated {
                activity_application_id: *id,
            };
            if let Err(e) = self.events.trigger(&event).await {
                tracing::warn!(error = ?e, application_id = id, "application_created_trigger_failed");
                self.report(&e).await;
            }
        }
        tracing::info!(
            user_id = outcome.user_id,
            applications = outcome.application_ids.len(),
            "enrollment_submitted"
        );
        Ok(outcome)
    }

    /// Mails the failure to the school's creator account when enabled.
    async fn report(&self, error: &anyhow::Error) {
        let sent = async {
            let enabled = self
                .parameters
                .get(NOTIFY_WIZARD_ERROR)
                .await?
                .is_some_and(|p| p.as_bool());
            if !enabled {
                return Ok(());
            }
            let Some(creator) = self.users.creator().await? else {
                return Ok(());
            };
            let from_email = self
                .parameters
                .get(MAILER_DEFAULT_FROM)
                .await?
                .and_then(|p| p.as_string());
            self.mailer
                .error_report(&ErrorReport {
                    title: REPORT_TITLE.to_string(),
                    content: format!("{error:#}"),
                    to_user_id: creator.id,
                    from_email,
                })
                .await
        }
        .await;
        if let Err(e) = sent {
            tracing::warn!(error = ?e, "enrollment_error_report_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::user_repository::UserRow;
    use crate::application::use_cases::applications::test_support::*;
    use crate::domain::applications::status::ASSESSMENT_PENDING_ID;
    use serde_json::json;

    fn submission(user_id: i64) -> EnrollmentSubmission {
        serde_json::from_value(json!({
            "application": {
                "personSelection": "myself",
                "user": {"id": user_id},
                "infos": {},
                "season_id": 2,
                "selectedActivities": [10, 12],
                "selectedPacks": {"Piano": 4}
            }
        }))
        .unwrap()
    }

    fn creator() -> UserRow {
        UserRow {
            id: 99,
            first_name: "Root".into(),
            last_name: "Creator".into(),
            email: Some("root@example.org".into()),
            birthday: None,
            is_admin: true,
            is_teacher: false,
        }
    }

    fn uc(fakes: &Fakes) -> SubmitEnrollment<'_, Fakes, Fakes, Fakes, Fakes, Fakes> {
        SubmitEnrollment {
            enrollments: fakes,
            parameters: fakes,
            users: fakes,
            events: fakes,
            mailer: fakes,
        }
    }

    fn family() -> Actor {
        Actor {
            user_id: 42,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn creates_applications_with_the_default_status() {
        let fakes = Fakes::with(|s| {
            s.parameters
                .push(parameter(DEFAULT_STATUS, &ASSESSMENT_PENDING_ID.to_string(), "integer"));
        });
        let outcome = uc(&fakes).execute(Some(&family()), &submission(42)).await.unwrap();
        assert_eq!(outcome.application_ids, vec![500, 501]);
        assert!(outcome.pack_created);
        fakes.read(|s| {
            assert_eq!(s.plans[0].initial_status_id, ASSESSMENT_PENDING_ID);
            assert_eq!(s.events.len(), 2);
        });
    }

    #[tokio::test]
    async fn families_cannot_enroll_strangers() {
        let fakes = Fakes::default();
        let res = uc(&fakes).execute(Some(&family()), &submission(43)).await;
        assert!(matches!(res, Err(SubmitError::Forbidden)));
        let res = uc(&fakes).execute(None, &submission(42)).await;
        assert!(matches!(res, Err(SubmitError::Unauthorized)));
    }

    #[tokio::test]
    async fn taken_intervals_are_reported_to_the_family() {
        let fakes = Fakes::with(|s| {
            s.enrollment_failure = Some(EnrollmentFailure::IntervalTaken("Créneau déjà pris".into()));
        });
        let res = uc(&fakes).execute(Some(&family()), &submission(42)).await;
        assert!(matches!(res, Err(SubmitError::IntervalTaken(msg)) if msg == "Créneau déjà pris"));
        assert!(fakes.read(|s| s.reports.is_empty()));
    }

    #[tokio::test]
    async fn unexpected_failures_notify_the_creator() {
        let fakes = Fakes::with(|s| {
            s.enrollment_failure = Some(EnrollmentFailure::Other("deadlock".into()));
            s.users.push(creator());
            s.parameters.push(parameter(NOTIFY_WIZARD_ERROR, "true", "boolean"));
        });
        let res = uc(&fakes).execute(Some(&family()), &submission(42)).await;
        let err = res.unwrap_err();
        assert_eq!(err.to_string(), GENERIC_FAILURE_MESSAGE);
        let reports = fakes.read(|s| s.reports.clone());
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].to_user_id, 99);
        assert!(reports[0].content.contains("deadlock"));
        assert!(fakes.read(|s| s.plans.is_empty()));
    }

    #[tokio::test]
    async fn event_failures_keep_the_enrollment() {
        let fakes = Fakes::with(|s| {
            s.fail_events = true;
            s.users.push(creator());
        });
        let outcome = uc(&fakes).execute(Some(&family()), &submission(42)).await.unwrap();
        assert_eq!(outcome.application_ids.len(), 2);
        // Reports stay off until the parameter enables them.
        assert!(fakes.read(|s| s.reports.is_empty()));
    }
}
