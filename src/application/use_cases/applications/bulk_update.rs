use chrono::{DateTime, Utc};

use crate::application::access::Actor;
use crate::application::dto::applications::{ApplicationListPage, Targets};
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::application::use_cases::applications::list_applications::ListApplications;
use crate::application::use_cases::applications::{ApplicationError, scoped_query};
use crate::domain::applications::filter::FilterDocument;

pub struct BulkUpdate<'a, A, C>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
{
    pub applications: &'a A,
    pub catalog: &'a C,
}

impl<'a, A, C> BulkUpdate<'a, A, C>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
{
    /// Sets the status of the targets and answers with the refreshed list.
    pub async fn execute(
        &self,
        actor: &Actor,
        doc: &FilterDocument,
        targets: &Targets,
        status_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ApplicationListPage, ApplicationError> {
        let query = scoped_query(self.catalog, actor, doc, now).await?;
        let ids = match targets {
            Targets::All => self.applications.ids(&query).await?,
            Targets::Ids(ids) => ids.clone(),
        };

        let summaries = self.applications.summaries(&ids).await?;
        if summaries.iter().any(|s| !actor.can_edit(s)) {
            return Err(ApplicationError::Forbidden);
        }

        let updated = self.applications.bulk_set_status(&ids, status_id, now).await?;
        tracing::info!(updated, status_id = ?status_id, "applications_bulk_updated");

        ListApplications {
            applications: self.applications,
            catalog: self.catalog,
        }
        .page(actor, &query, doc)
        .await
    }
}
