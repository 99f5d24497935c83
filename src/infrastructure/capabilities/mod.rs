//! Local implementations of the engine's capability ports.

pub mod confirmer;
pub mod local_installer;
pub mod trust_store;
pub mod value_resolver;

pub use confirmer::{AutoConfirmer, ConsoleConfirmer};
pub use local_installer::LocalInstaller;
pub use trust_store::FileTrustStore;
pub use value_resolver::StaticValueResolver;
