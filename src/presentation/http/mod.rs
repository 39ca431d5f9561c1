pub mod applications;
pub mod auth;
pub mod health;
pub mod parameters;
