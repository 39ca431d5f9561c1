use async_trait::async_trait;

/// Domain events other parts of the system react to (mostly by mailing families).
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationEvent {
    ApplicationCreated { activity_application_id: i64 },
    ActivityAccepted { user_id: i64, activity_id: Option<i64> },
}

impl ApplicationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ApplicationEvent::ApplicationCreated { .. } => "application_created",
            ApplicationEvent::ActivityAccepted { .. } => "activity_accepted",
        }
    }
}

#[async_trait]
pub trait EventTrigger: Send + Sync {
    async fn trigger(&self, event: &ApplicationEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum MailKind {
    ActivityAssigned,
    ActivityProposed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub title: String,
    pub content: String,
    pub to_user_id: i64,
    pub from_email: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn application_state(
        &self,
        kind: MailKind,
        user_id: i64,
        application_id: i64,
        activity_id: Option<i64>,
    ) -> anyhow::Result<()>;
    async fn error_report(&self, report: &ErrorReport) -> anyhow::Result<()>;
}
