//! Shared test fixtures for the identity bridge workspace.
//!
//! Provides single, shared instances of testcontainers across all test files:
//! - PostgreSQL (port 5432)
//! - Redis (port 6379)
//!
//! Each fixture is lazily initialized once per test process and yields `None`
//! when Docker is unavailable, so callers can skip instead of failing.
//!
//! Also provides [`MemoryIdentityProvider`], an in-memory provider transport
//! with failure injection and per-method call counts, and record builders.

mod fixtures;
mod provider;

pub use fixtures::*;
pub use provider::MemoryIdentityProvider;
