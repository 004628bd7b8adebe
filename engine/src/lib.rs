//! Scoring engine for untrusted puzzle submissions.
//!
//! A submission is gated by a static analyzer, executed once in a resource
//! bounded child process, and scored against the puzzle's declarative goals.
//!
//! - **[`core`]**: Pure logic (lexing, parsing, safety analysis, harness
//!   payloads, hooks, response assembly). No I/O.
//! - **[`io`]**: Configuration, puzzle files, and sandboxed processes.
//!
//! [`goals`] evaluates goals on top of a [`io::sandbox::Sandbox`], and
//! [`protocol`] wires the stages into the request/response pipeline.

pub mod core;
pub mod exit_codes;
pub mod goals;
pub mod io;
pub mod logging;
pub mod protocol;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
