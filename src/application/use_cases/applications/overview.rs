use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::access::Actor;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::application::ports::parameter_repository::ParameterRepository;
use crate::application::ports::user_repository::UserRepository;
use crate::application::use_cases::applications::{ApplicationError, season_calendar};
use crate::domain::applications::application::PersonRef;
use crate::domain::applications::status::ApplicationStatus;
use crate::domain::catalog::activity_ref::{ActivityRef, EvaluationLevelRef};
use crate::domain::parameters::AUTHORIZE_TEACHERS;
use crate::domain::seasons::Season;

/// Unpaid first instalments are divided by this to estimate member count.
pub const ADHESION_UNIT_PRICE: f64 = 15.0;

#[derive(Debug, Clone, Serialize)]
pub struct AdminCounters {
    pub seasons: Vec<Season>,
    pub adherent_count: i64,
    pub applications_count: i64,
    pub applications_to_process: i64,
    pub processing_applications_count: i64,
    pub processed_applications_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub admins: Vec<PersonRef>,
    pub activities: Vec<ActivityRef>,
    pub statuses: Vec<ApplicationStatus>,
    pub evaluation_level_refs: Vec<EvaluationLevelRef>,
    #[serde(flatten)]
    pub counters: Option<AdminCounters>,
}

pub struct GetOverview<'a, A, C, U, P>
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

impl<'a, A, C, U, P> GetOverview<'a, A, C, U, P>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
    U: UserRepository + ?Sized,
    P: ParameterRepository + ?Sized,
{
    pub async fn execute(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Overview, ApplicationError> {
        let teachers_only = self
            .parameters
            .get(AUTHORIZE_TEACHERS)
            .await?
            .map(|p| p.as_bool())
            .unwrap_or(false);
        if teachers_only && !(actor.is_admin || actor.is_teacher) {
            return Err(ApplicationError::Forbidden);
        }

        let counters = if actor.is_admin {
            let calendar = season_calendar(self.catalog).await?;
            let season_id = calendar.current_apps(now).map(|s| s.id);
            let counts = self.applications.dashboard_counts(season_id).await?;
            Some(AdminCounters {
                seasons: calendar.all().to_vec(),
                adherent_count: (counts.unpaid_first_due_total.trunc() / ADHESION_UNIT_PRICE)
                    .floor() as i64,
                applications_count: counts.applications_count,
                applications_to_process: counts.applications_to_process,
                processing_applications_count: counts.processing_applications_count,
                processed_applications_count: counts.processed_applications_count,
            })
        } else {
            None
        };

        Ok(Overview {
            admins: self.users.admins().await?,
            activities: self.catalog.activity_refs().await?,
            statuses: self.catalog.statuses().await?,
            evaluation_level_refs: self.catalog.evaluation_level_refs().await?,
            counters,
        })
    }
}
