//! Shared test utilities for idp integration tests.
//!
//! - `TestHarness`: temp object store, in-memory database, queues and fake
//!   extraction backends wired into a `ServiceContext`
//! - Builders for field specs, queue messages and configs

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{FakeBackend, FakeRenderer, TestHarness, UnavailableQueue};
