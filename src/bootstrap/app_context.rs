use std::sync::Arc;

use crate::application::ports::application_repository::ApplicationRepository;
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::application::ports::enrollment_repository::EnrollmentRepository;
use crate::application::ports::job_queue::JobQueue;
use crate::application::ports::notification_port::{EventTrigger, Mailer};
use crate::application::ports::parameter_repository::ParameterRepository;
use crate::application::ports::suggestion_port::SuggestionPort;
use crate::application::ports::upload_store::UploadStore;
use crate::application::ports::user_repository::UserRepository;
use crate::bootstrap::config::Config;

#[derive(Clone)]
pub struct AppContext {
    pub cfg: Config,
    services: Arc<AppServices>,
}

#[derive(Clone)]
pub struct AppServices {
    application_repo: Arc<dyn ApplicationRepository>,
    catalog_repo: Arc<dyn CatalogRepository>,
    enrollment_repo: Arc<dyn EnrollmentRepository>,
    user_repo: Arc<dyn UserRepository>,
    parameter_repo: Arc<dyn ParameterRepository>,
    job_queue: Arc<dyn JobQueue>,
    event_trigger: Arc<dyn EventTrigger>,
    mailer: Arc<dyn Mailer>,
    suggestions: Arc<dyn SuggestionPort>,
    upload_store: Arc<dyn UploadStore>,
}

impl AppServices {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        application_repo: Arc<dyn ApplicationRepository>,
        catalog_repo: Arc<dyn CatalogRepository>,
        enrollment_repo: Arc<dyn EnrollmentRepository>,
        user_repo: Arc<dyn UserRepository>,
        parameter_repo: Arc<dyn ParameterRepository>,
        job_queue: Arc<dyn JobQueue>,
        event_trigger: Arc<dyn EventTrigger>,
        mailer: Arc<dyn Mailer>,
        suggestions: Arc<dyn SuggestionPort>,
        upload_store: Arc<dyn UploadStore>,
    ) -> Self {
        Self {
            application_repo,
            catalog_repo,
            enrollment_repo,
            user_repo,
            parameter_repo,
            job_queue,
            event_trigger,
            mailer,
            suggestions,
            upload_store,
        }
    }
}

impl AppContext {
    pub fn new(cfg: Config, services: AppServices) -> Self {
        Self {
            cfg,
            services: Arc::new(services),
        }
    }

    pub fn application_repo(&self) -> Arc<dyn ApplicationRepository> {
        self.services.application_repo.clone()
    }

    pub fn catalog_repo(&self) -> Arc<dyn CatalogRepository> {
        self.services.catalog_repo.clone()
    }

    pub fn enrollment_repo(&self) -> Arc<dyn EnrollmentRepository> {
        self.services.enrollment_repo.clone()
    }

    pub fn user_repo(&self) -> Arc<dyn UserRepository> {
        self.services.user_repo.clone()
    }

    pub fn parameter_repo(&self) -> Arc<dyn ParameterRepository> {
        self.services.parameter_repo.clone()
    }

    pub fn job_queue(&self) -> Arc<dyn JobQueue> {
        self.services.job_queue.clone()
    }

    pub fn event_trigger(&self) -> Arc<dyn EventTrigger> {
        self.services.event_trigger.clone()
    }

    pub fn mailer(&self) -> Arc<dyn Mailer> {
        self.services.mailer.clone()
    }

    pub fn suggestions(&self) -> Arc<dyn SuggestionPort> {
        self.services.suggestions.clone()
    }

    pub fn upload_store(&self) -> Arc<dyn UploadStore> {
        self.services.upload_store.clone()
    }
}
