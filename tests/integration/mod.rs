//! Integration test suite for reposcope
//!
//! End-to-end tests that drive the public API (engine, graphs, mutations)
//! against the in-memory transport, plus CLI runs against fixture files.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **coordination**: Request deduplication, exactly-once completions, staleness
//! - **observation**: Graphs over shared handles, edge changes, teardown
//! - **aggregation**: Prioritized status across a graph
//! - **mutation**: Starring, side effects, concurrent writes
//! - **cli**: The `reposcope` binary against fixture files

mod aggregation;
mod cli;
mod coordination;
mod mutation;
mod observation;
