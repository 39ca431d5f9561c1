use async_trait::async_trait;

use crate::application::dto::enrollment_plan::{EnrollmentOutcome, EnrollmentPlan};

#[derive(thiserror::Error, Debug)]
pub enum EnrollmentWriteError {
    /// An evaluation slot or availability was claimed by someone else.
    #[error("{0}")]
    IntervalTaken(String),
    #[error("referenced record not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Writes the whole plan in one transaction; nothing persists on error.
    async fn submit(&self, plan: &EnrollmentPlan) -> Result<EnrollmentOutcome, EnrollmentWriteError>;
}
