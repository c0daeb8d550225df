//! Test doubles and fixtures for dcos-e2e
//!
//! - [`FakeProvider`]: an in-memory resource provider that records every call
//!   and can be scripted to fail
//! - [`TestWorkspace`]: an isolated temporary workspace with stub installers

pub mod fake_provider;
pub mod test_env;

pub use fake_provider::{Call, FakeProvider};
pub use test_env::TestWorkspace;
