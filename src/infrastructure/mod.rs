pub mod db;
pub mod jobs;
pub mod notifications;
pub mod uploads;
