//! Stable exit codes for engine CLI commands.

/// A response was written (whatever its `ok` value), or `analyze` found the source safe.
pub const OK: i32 = 0;
/// Input could not be read or the output could not be written.
pub const FAILED: i32 = 1;
/// `engine analyze` found violations.
pub const UNSAFE: i32 = 2;
