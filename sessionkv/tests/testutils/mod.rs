//! Test utilities for SessionKV integration tests
//!
//! TestFixture wires a store to a fresh in-memory backend and exposes raw
//! backend access for inspecting (or corrupting) keys behind the store's
//! back. Every test gets its own backend, so tests are fully isolated.

pub mod test_fixture;
