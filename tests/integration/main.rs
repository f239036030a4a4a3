//! Integration tests for the harvester
//!
//! Orchestration scenarios run against a scripted backend; backend and
//! submission tests use wiremock servers.

mod backend_tests;
mod frontier_tests;
mod harvest_tests;
mod support;
