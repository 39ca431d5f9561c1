use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::application::access::Actor;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::application::ports::notification_port::{ApplicationEvent, EventTrigger};
use crate::application::use_cases::applications::{ApplicationError, season_calendar};

#[derive(Debug, Clone)]
pub struct RenewRequest {
    pub user_id: i64,
    pub activity_ref_id: i64,
    pub pre_application_activity_id: Option<i64>,
}

/// Carries a current-season application over to the next season for one
/// activity ref.
pub struct RenewApplication<'a, A, C, E>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
    E: EventTrigger + ?Sized,
{
    pub applications: &'a A,
    pub catalog: &'a C,
    pub events: &'a E,
}

impl<'a, A, C, E> RenewApplication<'a, A, C, E>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
    E: EventTrigger + ?Sized,
{
    pub async fn execute(
        &self,
        actor: &Actor,
        req: &RenewRequest,
        now: DateTime<Utc>,
    ) -> Result<Value, ApplicationError> {
        let calendar = season_calendar(self.catalog).await?;
        let current = calendar
            .current(now)
            .ok_or_else(|| ApplicationError::Invalid("no running season".into()))?;
        let source = self
            .applications
            .find_for_renewal(req.user_id, current.id, req.activity_ref_id)
            .await?
            .ok_or(ApplicationError::NotFound)?;
        if !actor.can_edit(&source) {
            return Err(ApplicationError::Forbidden);
        }
        let next = calendar
            .next(now)
            .ok_or_else(|| ApplicationError::Invalid("no next season".into()))?;

        let renewed = self
            .applications
            .renew(
                source.id,
                req.activity_ref_id,
                next.id,
                req.pre_application_activity_id,
            )
            .await?;

        if let Some(id) = renewed.get("id").and_then(Value::as_i64) {
            let event = ApplicationEvent::ApplicationCreated {
                activity_application_id: id,
            };
            if let Err(e) = self.events.trigger(&event).await {
                tracing::warn!(error = ?e, application_id = id, "application_created_trigger_failed");
            }
        }
        tracing::info!(source_id = source.id, next_season_id = next.id, "application_renewed");
        Ok(renewed)
    }
}
