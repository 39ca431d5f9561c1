use crate::application::access::Actor;
use crate::application::ports::application_repository::{ApplicationRepository, DeleteOutcome};
use crate::application::use_cases::applications::{ApplicationError, load_summary};

pub struct DeleteApplication<'a, A>
where
    A: ApplicationRepository + ?Sized,
{
    pub applications: &'a A,
}

impl<'a, A> DeleteApplication<'a, A>
where
    A: ApplicationRepository + ?Sized,
{
    pub async fn execute(&self, actor: &Actor, id: i64) -> Result<(), ApplicationError> {
        let summary = load_summary(self.applications, id).await?;
        if !actor.can_destroy(&summary) {
            return Err(ApplicationError::Forbidden);
        }
        match self.applications.delete_with_related(&[id], &[]).await? {
            DeleteOutcome::Deleted(0) => Err(ApplicationError::NotFound),
            DeleteOutcome::Deleted(_) => {
                tracing::info!(application_id = id, actor = actor.user_id, "application_deleted");
                Ok(())
            }
            DeleteOutcome::Blocked => Err(ApplicationError::Forbidden),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::applications::test_support::*;
    use crate::domain::applications::status::PROPOSAL_ACCEPTED_ID;

    #[tokio::test]
    async fn admins_delete_whatever_the_status() {
        let fakes = Fakes::with(|s| s.applications.push(application(1, 100, 1, PROPOSAL_ACCEPTED_ID)));
        DeleteApplication { applications: &fakes }
            .execute(&admin(), 1)
            .await
            .unwrap();
        assert!(fakes.read(|s| s.applications.is_empty()));
    }

    #[tokio::test]
    async fn families_cannot_delete_their_own() {
        let fakes = Fakes::with(|s| s.applications.push(application(1, 100, 1, PROPOSAL_ACCEPTED_ID)));
        let owner = Actor {
            user_id: 100,
            ..Default::default()
        };
        let res = DeleteApplication { applications: &fakes }.execute(&owner, 1).await;
        assert!(matches!(res, Err(ApplicationError::Forbidden)));
        let res = DeleteApplication { applications: &fakes }.execute(&admin(), 9).await;
        assert!(matches!(res, Err(ApplicationError::NotFound)));
    }
}
