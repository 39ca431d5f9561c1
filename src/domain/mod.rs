pub mod applications;
pub mod catalog;
pub mod parameters;
pub mod seasons;
