//! Tool-call harness - end-to-end regression harness for tool-call parsing
//!
//! This library drives an OpenAI-compatible inference server as a black box: it starts one
//! server per (parser, model) or (model, auto-detect) configuration, sends synchronous and
//! streamed chat completions that should produce tool calls, rebuilds streamed tool calls from
//! SSE deltas, and classifies every response into a structured pass/fail record.
//!
//! The flow for one run is:
//! [`plan::plan_runs`] -> [`orchestrator::Orchestrator`] -> [`report`].

#![forbid(unsafe_code)]
#![cfg_attr(
    test,
    allow(
        clippy::float_cmp,
        clippy::uninlined_format_args,
        clippy::missing_const_for_fn
    )
)]
#![allow(
    clippy::must_use_candidate,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod error_hints;
pub mod evaluate;
pub mod health;
pub mod model;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod result;
pub mod server;
pub mod sse;
pub mod stream;

pub use error::{Error, Result};
