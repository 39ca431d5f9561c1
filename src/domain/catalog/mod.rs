pub mod activity_ref;
pub mod pricing;
