use chrono::{DateTime, Utc};

use crate::application::access::Actor;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::application::services::export::CsvExport;
use crate::application::use_cases::applications::{
    ApplicationError, current_apps_season, scoped_query,
};
use crate::domain::applications::filter::FilterDocument;

pub const EXPORT_BATCH_SIZE: i64 = 1000;

pub struct ExportApplications<'a, A, C>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
{
    pub applications: &'a A,
    pub catalog: &'a C,
}

impl<'a, A, C> ExportApplications<'a, A, C>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
{
    /// Builds the CSV export of every application matching the filter.
    pub async fn execute(
        &self,
        actor: &Actor,
        doc: &FilterDocument,
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>, ApplicationError> {
        let query = scoped_query(self.catalog, actor, doc, now).await?.unsorted();
        let links_season_id = current_apps_season(self.catalog, now).await?.map(|s| s.id);

        let mut export = CsvExport::start(now.date_naive())?;
        let mut after_id = 0;
        loop {
            let batch = self
                .applications
                .export_batch(&query, links_season_id, after_id, EXPORT_BATCH_SIZE)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            after_id = last.id;

            let ids: Vec<i64> = batch.iter().map(|r| r.id).collect();
            let summaries = self.applications.summaries(&ids).await?;
            if summaries.iter().any(|s| !actor.can_read(s)) {
                return Err(ApplicationError::Forbidden);
            }
            for record in &batch {
                export.push(record)?;
            }
            if (batch.len() as i64) < EXPORT_BATCH_SIZE {
                break;
            }
        }
        tracing::debug!(last_id = after_id, "applications_export_built");
        Ok(export.finish()?)
    }
}
