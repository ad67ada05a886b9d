//! Common test infrastructure for `toolcall-harness`.
//!
//! - Verbose logging with auto-dump on test failure
//! - Test harness with a temp directory per test
//! - A threaded stub HTTP server standing in for the inference server

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

pub mod harness;
pub mod logging;
pub mod stub;

#[allow(unused_imports)]
pub use harness::TestHarness;
#[allow(unused_imports)]
pub use stub::{RecordedRequest, Stall, StubResponse, StubServer, free_port};
