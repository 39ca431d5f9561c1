use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

pub const NOTIFY_USERS_OF_APPLICATION_STATE: &str = "NotifyUsersOfApplicationStateJob";
pub const CSV_IMPORTER: &str = "CsvImporterJob";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum JobRequest {
    NotifyUsersOfApplicationState {
        applications_ids: Vec<i64>,
        current_user_id: i64,
    },
    CsvImport {
        file_path: String,
        handler: String,
    },
}

impl JobRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            JobRequest::NotifyUsersOfApplicationState { .. } => NOTIFY_USERS_OF_APPLICATION_STATE,
            JobRequest::CsvImport { .. } => CSV_IMPORTER,
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &JobRequest) -> anyhow::Result<Uuid>;
}
