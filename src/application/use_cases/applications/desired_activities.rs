use crate::application::access::Actor;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::use_cases::applications::{ApplicationError, load_editable};
use crate::domain::applications::application::DesiredActivity;

/// Adds and removes the activities an application asks for.
pub struct DesiredActivities<'a, A>
where
    A: ApplicationRepository + ?Sized,
{
    pub applications: &'a A,
}

impl<'a, A> DesiredActivities<'a, A>
where
    A: ApplicationRepository + ?Sized,
{
    pub async fn add(
        &self,
        actor: &Actor,
        application_id: i64,
        activity_ref_ids: &[i64],
    ) -> Result<Vec<DesiredActivity>, ApplicationError> {
        load_editable(self.applications, actor, application_id).await?;
        if activity_ref_ids.is_empty() {
            return Err(ApplicationError::Invalid("no activity given".into()));
        }
        let desired = self
            .applications
            .add_desired_activities(application_id, activity_ref_ids)
            .await?;
        tracing::info!(application_id, added = activity_ref_ids.len(), "desired_activities_added");
        Ok(desired)
    }

    pub async fn remove(
        &self,
        actor: &Actor,
        application_id: i64,
        desired_activity_id: i64,
    ) -> Result<Vec<DesiredActivity>, ApplicationError> {
        load_editable(self.applications, actor, application_id).await?;
        if !self
            .applications
            .remove_desired_activity(application_id, desired_activity_id)
            .await?
        {
            return Err(ApplicationError::NotFound);
        }
        Ok(self.applications.desired_activities(application_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::applications::test_support::*;
    use crate::domain::applications::status::TREATMENT_PENDING_ID;

    #[tokio::test]
    async fn adds_several_and_removes_one() {
        let fakes = Fakes::with(|s| s.applications.push(application(1, 100, 1, TREATMENT_PENDING_ID)));
        let uc = DesiredActivities { applications: &fakes };

        let desired = uc.add(&admin(), 1, &[10, 12]).await.unwrap();
        assert_eq!(desired.len(), 2);

        let left = uc.remove(&admin(), 1, desired[0].id).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].activity_ref_id, 12);

        let res = uc.remove(&admin(), 1, desired[0].id).await;
        assert!(matches!(res, Err(ApplicationError::NotFound)));
    }

    #[tokio::test]
    async fn strangers_cannot_change_the_wishes() {
        let fakes = Fakes::with(|s| s.applications.push(application(1, 100, 1, TREATMENT_PENDING_ID)));
        let uc = DesiredActivities { applications: &fakes };
        let res = uc.add(&teacher(vec![11]), 1, &[10]).await;
        assert!(matches!(res, Err(ApplicationError::Forbidden)));
    }
}
