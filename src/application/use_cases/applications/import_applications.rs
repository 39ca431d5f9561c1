use uuid::Uuid;

use crate::application::access::Actor;
use crate::application::ports::job_queue::{JobQueue, JobRequest};
use crate::application::ports::parameter_repository::ParameterRepository;
use crate::application::ports::upload_store::UploadStore;
use crate::domain::parameters::IMPORTER_NAME;

pub const DISABLED_MESSAGE: &str = "L'import de fichier d'inscriptions est désactivé";

/// Importer names the school can enable, with the job handler they run.
const IMPORT_HANDLERS: [(&str, &str); 1] = [("tes_importer", "ActivityApplications::TesImportHandler")];

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("not authorized")]
    Forbidden,
    #[error("{DISABLED_MESSAGE}")]
    Disabled,
    #[error(transparent)]
    Repo(#[from] anyhow::Error),
}

pub fn import_handler(importer_name: Option<&str>) -> Option<&'static str> {
    let name = importer_name?;
    IMPORT_HANDLERS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, handler)| *handler)
}

pub struct ImportApplications<'a, P, U, J>
where
    P: ParameterRepository + ?Sized,
    U: UploadStore + ?Sized,
    J: JobQueue + ?Sized,
{
    pub parameters: &'a P,
    pub uploads: &'a U,
    pub jobs: &'a J,
}

impl<'a, P, U, J> ImportApplications<'a, P, U, J>
where
    P: ParameterRepository + ?Sized,
    U: UploadStore + ?Sized,
    J: JobQueue + ?Sized,
{
    /// Stores the uploaded file and queues its import; returns the job id.
    pub async fn execute(&self, actor: &Actor, file: &[u8]) -> Result<Uuid, ImportError> {
        if !actor.is_admin {
            return Err(ImportError::Forbidden);
        }
        let importer = self
            .parameters
            .get(IMPORTER_NAME)
            .await?
            .and_then(|p| p.as_string());
        let handler = import_handler(importer.as_deref()).ok_or(ImportError::Disabled)?;

        let file_path = self.uploads.save(file).await?;
        let job_id = self
            .jobs
            .enqueue(&JobRequest::CsvImport {
                file_path: file_path.clone(),
                handler: handler.to_string(),
            })
            .await?;
        tracing::info!(%job_id, file_path = %file_path, "applications_import_queued");
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::applications::test_support::*;

    fn uc(fakes: &Fakes) -> ImportApplications<'_, Fakes, Fakes, Fakes> {
        ImportApplications {
            parameters: fakes,
            uploads: fakes,
            jobs: fakes,
        }
    }

    #[tokio::test]
    async fn queues_the_configured_importer() {
        let fakes = Fakes::with(|s| s.parameters.push(parameter(IMPORTER_NAME, "tes_importer", "string")));
        uc(&fakes).execute(&admin(), b"id;nom\n").await.unwrap();
        fakes.read(|s| {
            assert_eq!(s.uploads, vec![b"id;nom\n".to_vec()]);
            match &s.jobs[0] {
                JobRequest::CsvImport { handler, file_path } => {
                    assert_eq!(handler, "ActivityApplications::TesImportHandler");
                    assert!(file_path.starts_with("uploads/"));
                }
                other => panic!("unexpected job {other:?}"),
            }
        });
    }

    #[tokio::test]
    async fn refuses_without_importer_or_admin() {
        let fakes = Fakes::default();
        assert!(matches!(
            uc(&fakes).execute(&admin(), b"x").await,
            Err(ImportError::Disabled)
        ));
        assert!(matches!(
            uc(&fakes).execute(&teacher(vec![]), b"x").await,
            Err(ImportError::Forbidden)
        ));
        assert_eq!(import_handler(Some("other")), None);
        assert!(fakes.read(|s| s.uploads.is_empty()));
    }
}
