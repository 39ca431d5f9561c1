pub mod enrollment;
pub mod export;
pub mod pricing;
