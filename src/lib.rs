// Module layout (Clean Architecture style)
// - bootstrap: configuration and service wiring
// - infrastructure: Postgres repositories, job queue, notifications, uploads
// - presentation: HTTP handlers and routing
// - application: access rules, ports, use cases and services
// - domain: core models

pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
