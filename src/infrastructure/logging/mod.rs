//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - pretty or JSON output on stderr
//! - optional JSON log file with rotation (tracing-appender)

/// Subscriber setup
pub mod logger;

pub use logger::LoggerImpl;
