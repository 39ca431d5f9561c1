use crate::application::access::Actor;
use crate::application::dto::applications::Targets;
use crate::application::ports::application_repository::{ApplicationRepository, DeleteOutcome};
use crate::domain::applications::filter::ApplicationQuery;
use crate::domain::applications::status::{TERMINAL_STATUS_IDS, TREATMENT_PENDING_ID, is_terminal};

pub const BLOCKED_MESSAGE: &str = "Les demandes dont le statut sont : proposition acceptée, cours proposé et cours attribué, ne peuvent être supprimées.";
pub const NOT_AUTHORIZED_MESSAGE: &str = "Non autorisé";

#[derive(thiserror::Error, Debug)]
pub enum BulkDeleteError {
    #[error("invalid targets")]
    InvalidTargets,
    #[error("{BLOCKED_MESSAGE}")]
    Blocked,
    #[error("{NOT_AUTHORIZED_MESSAGE}")]
    NotAuthorized,
    #[error(transparent)]
    Repo(#[from] anyhow::Error),
}

pub struct BulkDelete<'a, A>
where
    A: ApplicationRepository + ?Sized,
{
    pub applications: &'a A,
}

impl<'a, A> BulkDelete<'a, A>
where
    A: ApplicationRepository + ?Sized,
{
    pub async fn execute(
        &self,
        actor: &Actor,
        targets: Option<&Targets>,
    ) -> Result<u64, BulkDeleteError> {
        let ids = match targets {
            Some(Targets::All) => {
                let pending = ApplicationQuery::default().with_statuses(&[TREATMENT_PENDING_ID]);
                self.applications.ids(&pending).await?
            }
            Some(Targets::Ids(ids)) => ids.clone(),
            None => return Err(BulkDeleteError::InvalidTargets),
        };
        if ids.is_empty() {
            return Err(BulkDeleteError::InvalidTargets);
        }

        let summaries = self.applications.summaries(&ids).await?;
        if summaries.iter().any(|s| is_terminal(s.status_id)) {
            return Err(BulkDeleteError::Blocked);
        }
        if summaries.iter().any(|s| !actor.can_destroy(s)) {
            return Err(BulkDeleteError::NotAuthorized);
        }

        match self
            .applications
            .delete_with_related(&ids, &TERMINAL_STATUS_IDS)
            .await?
        {
            DeleteOutcome::Deleted(n) => {
                tracing::info!(deleted = n, actor = actor.user_id, "applications_bulk_deleted");
                Ok(n)
            }
            DeleteOutcome::Blocked => Err(BulkDeleteError::Blocked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::applications::test_support::*;
    use crate::domain::applications::status::{ACTIVITY_ATTRIBUTED_ID, STOPPED_ID};

    fn fixtures() -> Fakes {
        Fakes::with(|s| {
            s.applications.push(application(1, 100, 1, TREATMENT_PENDING_ID));
            s.applications.push(application(2, 101, 1, TREATMENT_PENDING_ID));
            s.applications.push(application(3, 102, 1, STOPPED_ID));
            s.applications.push(application(4, 103, 1, ACTIVITY_ATTRIBUTED_ID));
        })
    }

    #[tokio::test]
    async fn all_deletes_every_pending_application() {
        let fakes = fixtures();
        let deleted = BulkDelete { applications: &fakes }
            .execute(&admin(), Some(&Targets::All))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        let left: Vec<i64> = fakes.read(|s| s.applications.iter().map(|a| a.application.id).collect());
        assert_eq!(left, vec![3, 4]);
    }

    #[tokio::test]
    async fn settled_applications_block_the_whole_batch() {
        let fakes = fixtures();
        let res = BulkDelete { applications: &fakes }
            .execute(&admin(), Some(&Targets::Ids(vec![3, 4])))
            .await;
        assert!(matches!(res, Err(BulkDeleteError::Blocked)));
        assert_eq!(fakes.read(|s| s.applications.len()), 4);
    }

    #[tokio::test]
    async fn teachers_cannot_delete() {
        let fakes = fixtures();
        let res = BulkDelete { applications: &fakes }
            .execute(&teacher(vec![10]), Some(&Targets::Ids(vec![1])))
            .await;
        assert!(matches!(res, Err(BulkDeleteError::NotAuthorized)));
    }

    #[tokio::test]
    async fn missing_or_empty_targets_are_rejected() {
        let fakes = fixtures();
        let uc = BulkDelete { applications: &fakes };
        assert!(matches!(
            uc.execute(&admin(), None).await,
            Err(BulkDeleteError::InvalidTargets)
        ));
        assert!(matches!(
            uc.execute(&admin(), Some(&Targets::Ids(vec![]))).await,
            Err(BulkDeleteError::InvalidTargets)
        ));
    }

    #[tokio::test]
    async fn all_without_pending_applications_is_rejected() {
        let fakes = Fakes::with(|s| {
            s.applications.push(application(3, 102, 1, STOPPED_ID));
        });
        let res = BulkDelete { applications: &fakes }
            .execute(&admin(), Some(&Targets::All))
            .await;
        assert!(matches!(res, Err(BulkDeleteError::InvalidTargets)));
        assert_eq!(fakes.read(|s| s.applications.len()), 1);
    }
}
