pub mod applications;
pub mod parameters;
