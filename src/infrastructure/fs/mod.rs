//! Filesystem primitives shared by every store: atomic replacement and the
//! cross-process environment lock.

/// Write-then-rename file replacement
pub mod atomic;
/// Advisory environment lock
pub mod lock;

pub use atomic::{read_optional, write_atomic};
pub use lock::EnvironmentLock;
