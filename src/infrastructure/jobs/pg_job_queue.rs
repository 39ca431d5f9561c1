use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::application::ports::job_queue::{JobQueue, JobRequest};
use crate::infrastructure::db::PgPool;

pub const JOBS_CHANNEL: &str = "background_jobs";

/// Jobs land in `background_jobs`; workers are woken through `pg_notify`.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    channel: String,
}

#[derive(Debug, Serialize)]
struct JobEnvelope<'a> {
    id: Uuid,
    kind: &'a str,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: &JobRequest) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(job).context("job_serialize")?;
        let envelope = serde_json::to_string(&JobEnvelope {
            id,
            kind: job.kind(),
        })
        .context("job_envelope_serialize")?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO background_jobs (id, kind, payload) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(job.kind())
            .bind(sqlx::types::Json(payload))
            .execute(&mut *tx)
            .await
            .context("job_insert")?;
        // Delivered on commit only.
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(envelope)
            .execute(&mut *tx)
            .await
            .context("job_pg_notify")?;
        tx.commit().await?;

        tracing::info!(job_id = %id, kind = job.kind(), "job_enqueued");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_keeps_the_worker_argument_names() {
        let job = JobRequest::NotifyUsersOfApplicationState {
            applications_ids: vec![3, 4],
            current_user_id: 1,
        };
        assert_eq!(
            serde_json::to_value(&job).unwrap(),
            json!({"applications_ids": [3, 4], "current_user_id": 1})
        );
        let import = JobRequest::CsvImport {
            file_path: "/tmp/x.csv".into(),
            handler: "ActivityApplications::TesImportHandler".into(),
        };
        assert_eq!(import.kind(), "CsvImporterJob");
    }
}
