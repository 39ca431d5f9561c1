use crate::application::access::Actor;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::use_cases::applications::{ApplicationError, load_editable};
use crate::domain::applications::application::Comment;

pub struct ApplicationComments<'a, A>
where
    A: ApplicationRepository + ?Sized,
{
    pub applications: &'a A,
}

impl<'a, A> ApplicationComments<'a, A>
where
    A: ApplicationRepository + ?Sized,
{
    pub async fn add(
        &self,
        actor: &Actor,
        application_id: i64,
        content: &str,
    ) -> Result<Vec<Comment>, ApplicationError> {
        load_editable(self.applications, actor, application_id).await?;
        if content.trim().is_empty() {
            return Err(ApplicationError::Invalid("comment is empty".into()));
        }
        self.applications
            .add_comment(application_id, actor.user_id, content)
            .await?;
        Ok(self.applications.comments(application_id).await?)
    }

    pub async fn edit(
        &self,
        actor: &Actor,
        application_id: i64,
        comment_id: i64,
        content: &str,
    ) -> Result<Vec<Comment>, ApplicationError> {
        load_editable(self.applications, actor, application_id).await?;
        if !self
            .applications
            .edit_comment(application_id, comment_id, content)
            .await?
        {
            return Err(ApplicationError::NotFound);
        }
        Ok(self.applications.comments(application_id).await?)
    }
}
