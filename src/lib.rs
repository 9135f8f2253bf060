//! Enrolla: course-enrollment and training-center management server.
//!
//! Layered as domain (entities and invariants), application (services and
//! repository contracts), cache (query-key registry and read-through store),
//! and infra (Postgres, HTTP, telemetry).

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
