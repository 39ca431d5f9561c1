use serde::Serialize;

use crate::application::access::Actor;
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::application::ports::parameter_repository::ParameterRepository;
use crate::domain::applications::status::{ApplicationStatus, TREATMENT_PENDING_ID};
use crate::domain::parameters::{AUTOMATIC_STATUS, DEFAULT_STATUS};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationParameters {
    pub default_activity_application_status: Option<ApplicationStatus>,
    pub activity_application_status_list: Vec<ApplicationStatus>,
    pub auto_assign_enabled: bool,
}

pub struct GetApplicationParameters<'a, P, C>
where
    P: ParameterRepository + ?Sized,
    C: CatalogRepository + ?Sized,
{
    pub parameters: &'a P,
    pub catalog: &'a C,
}

impl<'a, P, C> GetApplicationParameters<'a, P, C>
where
    P: ParameterRepository + ?Sized,
    C: CatalogRepository + ?Sized,
{
    pub async fn execute(&self) -> anyhow::Result<ApplicationParameters> {
        let default_id = self
            .parameters
            .get(DEFAULT_STATUS)
            .await?
            .and_then(|p| p.as_i64())
            .unwrap_or(TREATMENT_PENDING_ID);
        // Only the literal "true" enables auto assignment.
        let auto_assign_enabled = self
            .parameters
            .get(AUTOMATIC_STATUS)
            .await?
            .and_then(|p| p.value)
            .is_some_and(|v| v == "true");
        Ok(ApplicationParameters {
            default_activity_application_status: self.catalog.status(default_id).await?,
            activity_application_status_list: self.catalog.statuses().await?,
            auto_assign_enabled,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SetParametersError {
    #[error("not authorized")]
    Forbidden,
    #[error(transparent)]
    Repo(#[from] anyhow::Error),
}

pub struct SetApplicationParameters<'a, P>
where
    P: ParameterRepository + ?Sized,
{
    pub parameters: &'a P,
}

impl<'a, P> SetApplicationParameters<'a, P>
where
    P: ParameterRepository + ?Sized,
{
    pub async fn execute(
        &self,
        actor: &Actor,
        default_status_id: Option<i64>,
        auto_assign_enabled: bool,
    ) -> Result<(), SetParametersError> {
        if !actor.is_admin {
            return Err(SetParametersError::Forbidden);
        }
        let status = default_status_id.map(|id| id.to_string()).unwrap_or_default();
        self.parameters
            .upsert(DEFAULT_STATUS, "integer", &status)
            .await?;
        self.parameters
            .upsert(AUTOMATIC_STATUS, "boolean", &auto_assign_enabled.to_string())
            .await?;
        tracing::info!(
            default_status_id = ?default_status_id,
            auto_assign_enabled,
            "application_parameters_updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::applications::test_support::*;
    use crate::domain::applications::status::ASSESSMENT_PENDING_ID;

    #[tokio::test]
    async fn defaults_to_pending_without_auto_assign() {
        let fakes = Fakes::default();
        let params = GetApplicationParameters {
            parameters: &fakes,
            catalog: &fakes,
        }
        .execute()
        .await
        .unwrap();
        assert_eq!(params.default_activity_application_status.map(|s| s.id), Some(TREATMENT_PENDING_ID));
        assert_eq!(params.activity_application_status_list.len(), 7);
        assert!(!params.auto_assign_enabled);
    }

    #[tokio::test]
    async fn admins_store_both_settings() {
        let fakes = Fakes::default();
        SetApplicationParameters { parameters: &fakes }
            .execute(&admin(), Some(ASSESSMENT_PENDING_ID), true)
            .await
            .unwrap();
        let params = GetApplicationParameters {
            parameters: &fakes,
            catalog: &fakes,
        }
        .execute()
        .await
        .unwrap();
        assert_eq!(
            params.default_activity_application_status.map(|s| s.id),
            Some(ASSESSMENT_PENDING_ID)
        );
        assert!(params.auto_assign_enabled);

        let res = SetApplicationParameters { parameters: &fakes }
            .execute(&teacher(vec![]), None, false)
            .await;
        assert!(matches!(res, Err(SetParametersError::Forbidden)));
    }
}
