//! Integration test suite for kiln
//!
//! End-to-end tests for the build pipeline and its outer interfaces.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **build_pipeline**: full builds against an in-memory registry (ordering,
//!   credentials, failure cleanup, cancellation)
//! - **git_source**: building packages cloned from local bare repositories
//! - **registry_http**: the HTTP registry client against a mock server
//! - **cli**: the `kiln` binary

mod common;

mod build_pipeline;
mod cli;
mod git_source;
mod registry_http;
