//! Domain layer for packsync
//!
//! Pure data models, the error taxonomy and the ports (capability traits)
//! the convergence engine calls out to.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
