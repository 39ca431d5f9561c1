pub mod applications;
pub mod enrollment;
pub mod enrollment_plan;
