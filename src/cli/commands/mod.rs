//! CLI command implementations.

pub mod check;
pub mod pack;
pub mod status;
pub mod sync;
