use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::application::access::Actor;
use crate::application::dto::applications::Targets;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::application::ports::job_queue::{JobQueue, JobRequest};
use crate::application::use_cases::applications::{current_apps_season, scoped_query};
use crate::domain::applications::filter::{ApplicationFilter, FilterDocument};
use crate::domain::applications::status::TERMINAL_STATUS_IDS;

pub const NO_TARGETS_MESSAGE: &str = "Vous n'avez pas selectionné d'utilisateurs";
pub const NOTHING_TO_SEND_MESSAGE: &str = "Les utilisateurs selectionnés ont déjà reçu le mail ou ne sont pas en cours attribué / cours proposé";

#[derive(thiserror::Error, Debug)]
pub enum ConfirmationMailsError {
    #[error("{NO_TARGETS_MESSAGE}")]
    NoTargets,
    #[error("{NOTHING_TO_SEND_MESSAGE}")]
    NothingToSend,
    #[error("not authorized")]
    Forbidden,
    #[error(transparent)]
    Repo(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuedMails {
    pub job_id: Uuid,
    pub applications_ids: Vec<i64>,
}

pub struct SendConfirmationMails<'a, A, C, J>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
    J: JobQueue + ?Sized,
{
    pub applications: &'a A,
    pub catalog: &'a C,
    pub jobs: &'a J,
}

impl<'a, A, C, J> SendConfirmationMails<'a, A, C, J>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
    J: JobQueue + ?Sized,
{
    /// Queues the state mail for every settled, not yet notified application
    /// of the selection.
    pub async fn execute(
        &self,
        actor: &Actor,
        doc: &FilterDocument,
        targets: Option<&Targets>,
        force_resend: bool,
        now: DateTime<Utc>,
    ) -> Result<QueuedMails, ConfirmationMailsError> {
        let targets = match targets {
            None => return Err(ConfirmationMailsError::NoTargets),
            Some(Targets::Ids(ids)) if ids.is_empty() => {
                return Err(ConfirmationMailsError::NoTargets);
            }
            Some(t) => t,
        };

        let filtered_season = doc
            .raw_value("season_id")
            .and_then(|v| match ApplicationFilter::parse("season_id", v) {
                Some(ApplicationFilter::SeasonId(id)) => Some(id),
                _ => None,
            });
        let season_id = match filtered_season {
            Some(id) => Some(id),
            None => current_apps_season(self.catalog, now).await?.map(|s| s.id),
        };

        let mut query = scoped_query(self.catalog, actor, doc, now)
            .await?
            .unsorted()
            .with_statuses(&TERMINAL_STATUS_IDS);
        if let Some(season_id) = season_id {
            query = query.in_season(season_id);
        }
        if !force_resend {
            query = query.unsent_mail_only();
        }
        if let Targets::Ids(ids) = targets {
            query = query.restricted_to_ids(ids.clone());
        }

        let ids = self.applications.ids(&query).await?;
        let summaries = self.applications.summaries(&ids).await?;
        if summaries.iter().any(|s| !actor.can_manage(s)) {
            return Err(ConfirmationMailsError::Forbidden);
        }
        if ids.is_empty() {
            return Err(ConfirmationMailsError::NothingToSend);
        }

        let job = JobRequest::NotifyUsersOfApplicationState {
            applications_ids: ids.clone(),
            current_user_id: actor.user_id,
        };
        let job_id = self.jobs.enqueue(&job).await?;
        tracing::info!(%job_id, count = ids.len(), "confirmation_mails_queued");
        Ok(QueuedMails {
            job_id,
            applications_ids: ids,
        })
    }
}
