pub mod application_repository_sqlx;
pub mod catalog_repository_sqlx;
pub mod enrollment_repository_sqlx;
pub mod parameter_repository_sqlx;
pub mod suggestion_repository_sqlx;
pub mod user_repository_sqlx;
