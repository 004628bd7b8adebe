//! Side-effecting helpers: configuration, puzzle files, child processes.

pub mod config;
pub mod process;
pub mod puzzle;
pub mod sandbox;
