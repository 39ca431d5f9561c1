use chrono::{DateTime, Utc};

use crate::application::access::Actor;
use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::notification_port::{MailKind, Mailer};
use crate::application::use_cases::applications::{ApplicationError, load_editable};
use crate::domain::applications::application::ActivityApplication;
use crate::domain::applications::status::{ACTIVITY_ATTRIBUTED_ID, ACTIVITY_PROPOSED_ID};

pub fn mail_kind(status_id: Option<i64>) -> Option<MailKind> {
    match status_id {
        Some(ACTIVITY_ATTRIBUTED_ID) => Some(MailKind::ActivityAssigned),
        Some(ACTIVITY_PROPOSED_ID) => Some(MailKind::ActivityProposed),
        _ => None,
    }
}

pub struct SendConfirmationMail<'a, A, M>
where
    A: ApplicationRepository + ?Sized,
    M: Mailer + ?Sized,
{
    pub applications: &'a A,
    pub mailer: &'a M,
}

impl<'a, A, M> SendConfirmationMail<'a, A, M>
where
    A: ApplicationRepository + ?Sized,
    M: Mailer + ?Sized,
{
    pub async fn execute(
        &self,
        actor: &Actor,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<ActivityApplication, ApplicationError> {
        load_editable(self.applications, actor, id).await?;
        let application = self
            .applications
            .find(id)
            .await?
            .ok_or(ApplicationError::NotFound)?;

        if let Some(kind) = mail_kind(application.status_id) {
            for desired in self.applications.desired_activities(id).await? {
                self.mailer
                    .application_state(kind.clone(), application.user_id, id, desired.activity_id)
                    .await?;
            }
        }
        self.applications.mark_mail_sent(id, now).await?;
        tracing::info!(application_id = id, "confirmation_mail_sent");

        self.applications
            .find(id)
            .await?
            .ok_or(ApplicationError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::applications::test_support::*;
    use crate::domain::applications::application::DesiredActivity;
    use crate::domain::applications::status::STOPPED_ID;

    fn desired(id: i64, application_id: i64, activity_id: Option<i64>) -> DesiredActivity {
        DesiredActivity {
            id,
            activity_application_id: application_id,
            activity_ref_id: 10,
            activity_id,
            user_id: None,
            is_validated: true,
            prorata: None,
            user: None,
        }
    }

    #[tokio::test]
    async fn mails_each_placed_activity() {
        let fakes = Fakes::with(|s| {
            s.applications.push(application(1, 100, 1, ACTIVITY_PROPOSED_ID));
            s.desired.push(desired(1, 1, Some(70)));
            s.desired.push(desired(2, 1, Some(71)));
        });
        let uc = SendConfirmationMail {
            applications: &fakes,
            mailer: &fakes,
        };
        let app = uc.execute(&admin(), 1, at(2025, 10, 3)).await.unwrap();
        assert_eq!(app.mail_sent_at, Some(at(2025, 10, 3)));
        let mails = fakes.read(|s| s.mails.clone());
        assert_eq!(mails.len(), 2);
        assert_eq!(mails[1], (MailKind::ActivityProposed, 100, 1, Some(71)));
    }

    #[tokio::test]
    async fn other_statuses_send_nothing() {
        let fakes = Fakes::with(|s| {
            s.applications.push(application(1, 100, 1, STOPPED_ID));
            s.desired.push(desired(1, 1, Some(70)));
        });
        let uc = SendConfirmationMail {
            applications: &fakes,
            mailer: &fakes,
        };
        uc.execute(&admin(), 1, at(2025, 10, 3)).await.unwrap();
        assert!(fakes.read(|s| s.mails.is_empty()));
        assert_eq!(mail_kind(Some(ACTIVITY_ATTRIBUTED_ID)), Some(MailKind::ActivityAssigned));
    }
}
