use chrono::{DateTime, Utc};

use crate::application::access::Actor;
use crate::application::dto::applications::ApplicationListPage;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::application::use_cases::applications::{ApplicationError, scoped_query};
use crate::domain::applications::filter::{ApplicationQuery, FilterDocument};
use crate::domain::applications::status::TREATMENT_PENDING_ID;

pub struct ListApplications<'a, A, C>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
{
    pub applications: &'a A,
    pub catalog: &'a C,
}

impl<'a, A, C> ListApplications<'a, A, C>
where
    A: ApplicationRepository + ?Sized,
    C: CatalogRepository + ?Sized,
{
    pub async fn execute(
        &self,
        actor: &Actor,
        doc: &FilterDocument,
        now: DateTime<Utc>,
    ) -> Result<ApplicationListPage, ApplicationError> {
        let query = scoped_query(self.catalog, actor, doc, now).await?;
        self.page(actor, &query, doc).await
    }

    /// Renders one page of an already scoped query.
    pub async fn page(
        &self,
        actor: &Actor,
        query: &ApplicationQuery,
        doc: &FilterDocument,
    ) -> Result<ApplicationListPage, ApplicationError> {
        let total = self.applications.count(query).await?;
        let pending = query.clone().unsorted().with_statuses(&[TREATMENT_PENDING_ID]);
        let pending_total = self.applications.count(&pending).await?;

        let page_size = doc.page_size();
        let applications = self
            .applications
            .list_page(query, page_size, doc.offset())
            .await?;

        let ids: Vec<i64> = applications.iter().map(|a| a.id).collect();
        let summaries = self.applications.summaries(&ids).await?;
        if summaries.iter().any(|s| !actor.can_read(s)) {
            return Err(ApplicationError::Forbidden);
        }

        Ok(ApplicationListPage {
            applications,
            pages: page_count(total, page_size),
            total,
            pending_total,
        })
    }
}

pub fn page_count(total: i64, page_size: i64) -> i64 {
    if page_size <= 0 {
        return 0;
    }
    total / page_size + i64::from(total % page_size != 0)
}
