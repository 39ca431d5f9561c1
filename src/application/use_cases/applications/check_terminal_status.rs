use chrono::{DateTime, Utc};

use crate::application::access::Actor;
use crate::application::dto::applications::Targets;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::application::use_cases::applications::{ApplicationError, scoped_query};
use crate::domain::applications::filter::FilterDocument;
use crate::domain::applications::status::TERMINAL_STATUS_IDS;

/// Tells the bulk screens whether the selection holds settled applications.
pub struct CheckTerminalStatus<'a, A, C>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
{
    pub applications: &'a A,
    pub catalog: &'a C,
}

impl<'a, A, C> CheckTerminalStatus<'a, A, C>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
{
    pub async fn execute(
        &self,
        actor: &Actor,
        doc: &FilterDocument,
        targets: Option<&Targets>,
        now: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        let mut query = scoped_query(self.catalog, actor, doc, now)
            .await?
            .unsorted()
            .with_statuses(&TERMINAL_STATUS_IDS);
        if let Some(Targets::Ids(ids)) = targets {
            query = query.restricted_to_ids(ids.clone());
        }
        Ok(self.applications.exists(&query).await?)
    }
}
