use serde_json::Value;

use crate::application::access::Actor;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::suggestion_port::{SuggestionMode, SuggestionPort};
use crate::application::use_cases::applications::{ApplicationError, load_editable};

pub struct FindSuggestions<'a, A, S>
where
    A: ApplicationRepository + ?Sized,
    S: SuggestionPort + ?Sized,
{
    pub applications: &'a A,
    pub suggestions: &'a S,
}

impl<'a, A, S> FindSuggestions<'a, A, S>
where
    A: ApplicationRepository + ?Sized,
    S: SuggestionPort + ?Sized,
{
    /// Candidate activities for one desired activity of the application.
    pub async fn execute(
        &self,
        actor: &Actor,
        application_id: i64,
        desired_activity_id: i64,
        formatted: bool,
        mode: SuggestionMode,
    ) -> Result<Value, ApplicationError> {
        load_editable(self.applications, actor, application_id).await?;
        let belongs = self
            .applications
            .desired_activities(application_id)
            .await?
            .iter()
            .any(|d| d.id == desired_activity_id);
        if !belongs {
            return Err(ApplicationError::NotFound);
        }
        Ok(self
            .suggestions
            .suggest(desired_activity_id, formatted, mode)
            .await?)
    }
}
