pub mod application_parameters;
