pub mod application;
pub mod filter;
pub mod status;
