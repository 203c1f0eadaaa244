//! Test-only doubles for the service under test.
mod fake_service;

pub use fake_service::{AtCapacity, FakeService, Faults};
