use crate::application::access::Actor;
use crate::application::ports::application_repository::{ApplicationChanges, ApplicationRepository};
use crate::application::ports::notification_port::{ApplicationEvent, EventTrigger};
use crate::application::services::enrollment::{attendance_shift, refusal_reason};
use crate::application::use_cases::applications::{ApplicationError, load_editable};
use crate::domain::applications::application::ActivityApplication;
use crate::domain::applications::status::PROPOSAL_ACCEPTED_ID;

#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub changes: ApplicationChanges,
    /// Absent clears the stored reason.
    pub reason_of_refusal: Option<String>,
}

pub struct UpdateApplication<'a, A, E>
where
    A: ApplicationRepository + ?Sized,
    E: EventTrigger + ?Sized,
{
    pub applications: &'a A,
    pub events: &'a E,
}

impl<'a, A, E> UpdateApplication<'a, A, E>
where
    A: ApplicationRepository + ?Sized,
    E: EventTrigger + ?Sized,
{
    pub async fn execute(
        &self,
        actor: &Actor,
        id: i64,
        req: &UpdateRequest,
    ) -> Result<ActivityApplication, ApplicationError> {
        load_editable(self.applications, actor, id).await?;
        let current = self
            .applications
            .find(id)
            .await?
            .ok_or(ApplicationError::NotFound)?;

        let shift = match (current.begin_at, req.changes.begin_at) {
            (Some(old), Some(new)) if old != new => Some(attendance_shift(old, new)),
            _ => None,
        };
        let outcome = self
            .applications
            .apply_changes(id, &req.changes, shift)
            .await?;

        if outcome.application.status_id == Some(PROPOSAL_ACCEPTED_ID) {
            for activity_id in &outcome.activity_ids {
                let event = ApplicationEvent::ActivityAccepted {
                    user_id: outcome.application.user_id,
                    activity_id: *activity_id,
                };
                if let Err(e) = self.events.trigger(&event).await {
                    tracing::warn!(error = ?e, application_id = id, "activity_accepted_trigger_failed");
                }
            }
        }

        let reason = req.reason_of_refusal.as_deref().map(refusal_reason);
        let updated = self
            .applications
            .set_reason_of_refusal(id, reason.as_deref())
            .await?;
        tracing::info!(application_id = id, status_id = ?updated.status_id, "application_updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::enrollment::AttendanceShift;
    use crate::application::use_cases::applications::test_support::*;
    use crate::domain::applications::application::DesiredActivity;
    use crate::domain::applications::status::{ACTIVITY_PROPOSED_ID, PROPOSAL_REFUSED_ID};
    use chrono::Duration;

    fn fixtures() -> Fakes {
        Fakes::with(|s| {
            let mut app = application(1, 100, 1, ACTIVITY_PROPOSED_ID);
            app.application.begin_at = Some(at(2025, 9, 15));
            s.applications.push(app);
            for (id, activity_id) in [(1, Some(70)), (2, None)] {
                s.desired.push(DesiredActivity {
                    id,
                    activity_application_id: 1,
                    activity_ref_id: 10,
                    activity_id,
                    user_id: Some(100),
                    is_validated: activity_id.is_some(),
                    prorata: None,
                    user: None,
                });
            }
        })
    }

    #[tokio::test]
    async fn later_start_unregisters_and_acceptance_is_announced() {
        let fakes = fixtures();
        let uc = UpdateApplication {
            applications: &fakes,
            events: &fakes,
        };
        let req = UpdateRequest {
            changes: ApplicationChanges {
                status_id: Some(PROPOSAL_ACCEPTED_ID),
                begin_at: Some(at(2025, 10, 1)),
                ..Default::default()
            },
            reason_of_refusal: None,
        };
        let app = uc.execute(&admin(), 1, &req).await.unwrap();
        assert_eq!(app.status_id, Some(PROPOSAL_ACCEPTED_ID));
        assert_eq!(app.begin_at, Some(at(2025, 10, 1)));
        assert_eq!(
            fakes.read(|s| s.shifts.clone()),
            vec![AttendanceShift::Unregister {
                from: at(2025, 9, 15),
                to: at(2025, 10, 1) - Duration::days(1),
            }]
        );
        let events = fakes.read(|s| s.events.clone());
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ApplicationEvent::ActivityAccepted {
                user_id: 100,
                activity_id: Some(70)
            }
        );
    }

    #[tokio::test]
    async fn blank_refusal_reason_is_spelled_out() {
        let fakes = fixtures();
        let uc = UpdateApplication {
            applications: &fakes,
            events: &fakes,
        };
        let req = UpdateRequest {
            changes: ApplicationChanges {
                status_id: Some(PROPOSAL_REFUSED_ID),
                referent_id: Some(Some(7)),
                ..Default::default()
            },
            reason_of_refusal: Some(String::new()),
        };
        let app = uc.execute(&admin(), 1, &req).await.unwrap();
        assert_eq!(app.reason_of_refusal.as_deref(), Some("non spécifiée"));
        assert_eq!(app.referent_id, Some(7));
        assert!(fakes.read(|s| s.events.is_empty() && s.shifts.is_empty()));
    }

    #[tokio::test]
    async fn accepted_application_announces_on_any_update() {
        let fakes = Fakes::with(|s| {
            s.applications.push(application(2, 101, 1, PROPOSAL_ACCEPTED_ID));
            s.desired.push(DesiredActivity {
                id: 3,
                activity_application_id: 2,
                activity_ref_id: 10,
                activity_id: Some(71),
                user_id: Some(101),
                is_validated: true,
                prorata: None,
                user: None,
            });
        });
        let uc = UpdateApplication {
            applications: &fakes,
            events: &fakes,
        };
        let req = UpdateRequest {
            changes: ApplicationChanges {
                referent_id: Some(Some(9)),
                ..Default::default()
            },
            reason_of_refusal: None,
        };
        let app = uc.execute(&admin(), 2, &req).await.unwrap();
        assert_eq!(app.referent_id, Some(9));
        assert_eq!(
            fakes.read(|s| s.events.clone()),
            vec![ApplicationEvent::ActivityAccepted {
                user_id: 101,
                activity_id: Some(71)
            }]
        );
    }
}
