use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::application::access::Actor;
use crate::application::dto::applications::ApplicationProgress;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::application::ports::parameter_repository::ParameterRepository;
use crate::application::ports::user_repository::UserRepository;
use crate::application::use_cases::applications::{
    ApplicationError, current_apps_season, load_summary,
};
use crate::domain::parameters::CAN_EDIT_AVAILABILITIES;

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetail {
    pub activity_application: Value,
    pub payer: Option<Value>,
    pub new_student_level_questionnaires: Value,
    pub application_change_questionnaires: Value,
    pub can_edit_availabilities: bool,
}

/// Where `begin_at` belongs when nothing has been attributed yet, or `None`
/// when the stored value must be kept.
pub fn untouched_begin_at(progress: &ApplicationProgress, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if progress.has_progress || progress.season_start >= now {
        return None;
    }
    let mut candidate = progress.season_end.min(now);
    if let Some(stopped) = progress.stopped_at {
        candidate = candidate.min(stopped);
    }
    Some(candidate)
}

pub struct GetApplication<'a, A, C, U, P>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
    U: UserRepository + ?Sized,
    P: ParameterRepository + ?Sized,
{
    pub applications: &'a A,
    pub catalog: &'a C,
    pub users: &'a U,
    pub parameters: &'a P,
}

impl<'a, A, C, U, P> GetApplication<'a, A, C, U, P>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
    U: UserRepository + ?Sized,
    P: ParameterRepository + ?Sized,
{
    pub async fn execute(
        &self,
        actor: &Actor,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<ApplicationDetail, ApplicationError> {
        let summary = load_summary(self.applications, id).await?;
        if !actor.can_read(&summary) {
            return Err(ApplicationError::Forbidden);
        }

        if let Some(progress) = self.applications.progress(id).await? {
            if let Some(begin_at) = untouched_begin_at(&progress, now) {
                self.applications.set_begin_at(id, begin_at).await?;
                tracing::debug!(application_id = id, begin_at = %begin_at, "application_begin_at_reset");
            }
        }

        let mut detail = self
            .applications
            .detail_json(id)
            .await?
            .ok_or(ApplicationError::NotFound)?;

        let family_links = self
            .users
            .family_links_json(summary.user_id, summary.season_id)
            .await?;
        let siblings = match current_apps_season(self.catalog, now).await? {
            Some(season) => self
                .applications
                .user_applications(summary.user_id, season.id)
                .await?
                .into_iter()
                .filter(|a| actor.is_admin || a.activity_ref_ids.iter().any(|r| actor.activity_ref_ids.contains(r)))
                .map(|a| a.json)
                .collect(),
            None => Vec::new(),
        };
        if let Some(user) = detail.get_mut("user").and_then(Value::as_object_mut) {
            user.insert("family_links_with_user".into(), Value::Array(family_links));
            user.insert("activity_applications".into(), Value::Array(siblings));
        }

        let extras = self.applications.detail_extras(id).await?;
        let can_edit_availabilities = self
            .parameters
            .get(CAN_EDIT_AVAILABILITIES)
            .await?
            .map(|p| p.as_bool())
            .unwrap_or(false);

        Ok(ApplicationDetail {
            activity_application: detail,
            payer: extras.payer,
            new_student_level_questionnaires: extras.new_student_level_questionnaires,
            application_change_questionnaires: extras.application_change_questionnaires,
            can_edit_availabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::applications::test_support::*;
    use crate::domain::applications::status::TREATMENT_PENDING_ID;

    fn uc(fakes: &Fakes) -> GetApplication<'_, Fakes, Fakes, Fakes, Fakes> {
        GetApplication {
            applications: fakes,
            catalog: fakes,
            users: fakes,
            parameters: fakes,
        }
    }

    #[tokio::test]
    async fn resets_begin_at_once_the_season_started() {
        let fakes = Fakes::with(|s| {
            s.seasons = vec![season(1, 2025)];
            s.applications.push(application(7, 100, 1, TREATMENT_PENDING_ID));
        });
        let now = at(2025, 10, 1);
        let detail = uc(&fakes).execute(&admin(), 7, now).await.unwrap();
        assert_eq!(fakes.read(|s| s.begin_at_updates.clone()), vec![(7, now)]);
        assert_eq!(
            detail.activity_application["user"]["family_links_with_user"][0]["season_id"],
            1
        );
        assert_eq!(detail.activity_application["user"]["activity_applications"][0]["id"], 7);
    }

    #[tokio::test]
    async fn keeps_begin_at_when_activities_are_attributed() {
        let fakes = Fakes::with(|s| {
            s.seasons = vec![season(1, 2025)];
            let mut app = application(7, 100, 1, TREATMENT_PENDING_ID);
            app.has_progress = true;
            s.applications.push(app);
        });
        uc(&fakes).execute(&admin(), 7, at(2025, 10, 1)).await.unwrap();
        assert!(fakes.read(|s| s.begin_at_updates.is_empty()));
    }

    #[tokio::test]
    async fn strangers_cannot_read() {
        let fakes = Fakes::with(|s| {
            s.seasons = vec![season(1, 2025)];
            s.applications.push(application(7, 100, 1, TREATMENT_PENDING_ID));
        });
        let stranger = Actor {
            user_id: 55,
            ..Default::default()
        };
        assert!(matches!(
            uc(&fakes).execute(&stranger, 7, at(2025, 10, 1)).await,
            Err(ApplicationError::Forbidden)
        ));
        assert!(matches!(
            uc(&fakes).execute(&admin(), 8, at(2025, 10, 1)).await,
            Err(ApplicationError::NotFound)
        ));
    }

    #[test]
    fn begin_at_is_capped_by_stop_and_season_end() {
        let progress = ApplicationProgress {
            season_start: at(2025, 9, 1),
            season_end: at(2026, 6, 30),
            stopped_at: Some(at(2025, 9, 20)),
            has_progress: false,
        };
        assert_eq!(untouched_begin_at(&progress, at(2025, 10, 1)), Some(at(2025, 9, 20)));
        assert_eq!(untouched_begin_at(&progress, at(2025, 8, 1)), None);
        assert_eq!(untouched_begin_at(&progress, at(2026, 8, 1)), Some(at(2025, 9, 20)));
    }
}
