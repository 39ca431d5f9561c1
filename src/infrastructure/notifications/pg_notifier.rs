use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use crate::application::ports::notification_port::{
    ApplicationEvent, ErrorReport, EventTrigger, MailKind, Mailer,
};
use crate::infrastructure::db::PgPool;

pub const EVENTS_CHANNEL: &str = "application_events";
pub const MAILS_CHANNEL: &str = "application_mails";

/// Publishes events and mail requests on Postgres channels; the listeners
/// (mail delivery, attendance bookkeeping) live in other services.
#[derive(Clone)]
pub struct PgNotifier {
    pool: PgPool,
    events_channel: String,
    mails_channel: String,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    name: &'a str,
    payload: Value,
}

fn event_payload(event: &ApplicationEvent) -> Value {
    match event {
        ApplicationEvent::ApplicationCreated {
            activity_application_id,
        } => json!({ "activity_application_id": activity_application_id }),
        ApplicationEvent::ActivityAccepted {
            user_id,
            activity_id,
        } => json!({ "user_id": user_id, "activity_id": activity_id }),
    }
}

fn mail_name(kind: &MailKind) -> &'static str {
    match kind {
        MailKind::ActivityAssigned => "activity_assigned",
        MailKind::ActivityProposed => "activity_proposed",
    }
}

impl PgNotifier {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            events_channel: EVENTS_CHANNEL.into(),
            mails_channel: MAILS_CHANNEL.into(),
        }
    }

    async fn publish(&self, channel: &str, envelope: &Envelope<'_>) -> anyhow::Result<()> {
        let payload = serde_json::to_string(envelope).context("notification_serialize")?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await
            .context("notification_pg_notify")?;
        Ok(())
    }
}

#[async_trait]
impl EventTrigger for PgNotifier {
    async fn trigger(&self, event: &ApplicationEvent) -> anyhow::Result<()> {
        let envelope = Envelope {
            name: event.name(),
            payload: event_payload(event),
        };
        self.publish(&self.events_channel, &envelope).await?;
        tracing::debug!(event = event.name(), "application_event_published");
        Ok(())
    }
}

#[async_trait]
impl Mailer for PgNotifier {
    async fn application_state(
        &self,
        kind: MailKind,
        user_id: i64,
        application_id: i64,
        activity_id: Option<i64>,
    ) -> anyhow::Result<()> {
        let envelope = Envelope {
            name: mail_name(&kind),
            payload: json!({
                "user_id": user_id,
                "activity_application_id": application_id,
                "activity_id": activity_id,
            }),
        };
        self.publish(&self.mails_channel, &envelope).await
    }

    async fn error_report(&self, report: &ErrorReport) -> anyhow::Result<()> {
        let envelope = Envelope {
            name: "error_report",
            payload: json!({
                "title": report.title,
                "content": report.content,
                "to_user_id": report.to_user_id,
                "from": report.from_email,
            }),
        };
        self.publish(&self.mails_channel, &envelope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_payloads_carry_the_record_ids() {
        let created = ApplicationEvent::ApplicationCreated {
            activity_application_id: 7,
        };
        assert_eq!(event_payload(&created), json!({"activity_application_id": 7}));
        let accepted = ApplicationEvent::ActivityAccepted {
            user_id: 3,
            activity_id: None,
        };
        assert_eq!(
            event_payload(&accepted),
            json!({"user_id": 3, "activity_id": null})
        );
    }

    #[test]
    fn mail_names() {
        assert_eq!(mail_name(&MailKind::ActivityAssigned), "activity_assigned");
        assert_eq!(mail_name(&MailKind::ActivityProposed), "activity_proposed");
    }
}
