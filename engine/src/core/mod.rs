//! Deterministic, pure logic shared by the engine.
//!
//! Core modules perform no I/O. They analyze source text, build and parse
//! harness payloads, and assemble responses, which keeps them testable
//! without spawning interpreters.

pub mod analyzer;
pub mod harness;
pub mod hooks;
pub mod lexer;
pub mod response;
pub mod syntax;
pub mod types;
