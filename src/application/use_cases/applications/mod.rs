use chrono::{DateTime, Utc};

use crate::application::access::Actor;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::domain::applications::application::ApplicationSummary;
use crate::domain::applications::filter::{ApplicationQuery, FilterDocument, TeacherScope};
use crate::domain::seasons::{Season, SeasonCalendar};

pub mod bulk_delete;
pub mod bulk_update;
pub mod check_terminal_status;
pub mod comments;
pub mod delete_application;
pub mod desired_activities;
pub mod export_applications;
pub mod find_suggestions;
pub mod get_application;
pub mod import_applications;
pub mod list_applications;
pub mod overview;
pub mod renew_application;
pub mod send_confirmation_mail;
pub mod send_confirmation_mails;
pub mod submit_enrollment;
pub mod update_application;
pub mod wizard;

#[cfg(test)]
pub(crate) mod test_support;

#[derive(thiserror::Error, Debug)]
pub enum ApplicationError {
    #[error("activity application not found")]
    NotFound,
    #[error("not authorized")]
    Forbidden,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Repo(#[from] anyhow::Error),
}

pub(crate) async fn season_calendar<C: CatalogRepository + ?Sized>(
    catalog: &C,
) -> anyhow::Result<SeasonCalendar> {
    Ok(SeasonCalendar::new(catalog.seasons().await?))
}

pub(crate) async fn current_apps_season<C: CatalogRepository + ?Sized>(
    catalog: &C,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Season>> {
    Ok(season_calendar(catalog).await?.current_apps(now).cloned())
}

/// Applies the actor's visibility to a filter document. Administrators see
/// everything; anyone else only the open season's applications on the
/// activities they teach.
pub(crate) async fn scoped_query<C: CatalogRepository + ?Sized>(
    catalog: &C,
    actor: &Actor,
    doc: &FilterDocument,
    now: DateTime<Utc>,
) -> anyhow::Result<ApplicationQuery> {
    if actor.is_admin {
        return Ok(ApplicationQuery::from_document(doc, None));
    }
    let season_id = current_apps_season(catalog, now)
        .await?
        .map(|s| s.id)
        .unwrap_or_default();
    let scope = TeacherScope {
        season_id,
        activity_ref_ids: actor.activity_ref_ids.clone(),
    };
    Ok(ApplicationQuery::from_document(doc, Some(scope)))
}

pub(crate) async fn load_summary<A: ApplicationRepository + ?Sized>(
    applications: &A,
    id: i64,
) -> Result<ApplicationSummary, ApplicationError> {
    applications
        .summary(id)
        .await?
        .ok_or(ApplicationError::NotFound)
}

pub(crate) async fn load_editable<A: ApplicationRepository + ?Sized>(
    applications: &A,
    actor: &Actor,
    id: i64,
) -> Result<ApplicationSummary, ApplicationError> {
    let summary = load_summary(applications, id).await?;
    if !actor.can_edit(&summary) {
        return Err(ApplicationError::Forbidden);
    }
    Ok(summary)
}
