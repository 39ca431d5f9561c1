pub mod application_repository;
pub mod catalog_repository;
pub mod enrollment_repository;
pub mod job_queue;
pub mod notification_port;
pub mod parameter_repository;
pub mod suggestion_port;
pub mod upload_store;
pub mod user_repository;
