// src/resilience/tests/mod.rs
//! Tests for resilience features

mod health_tests;
mod metrics_tests;
