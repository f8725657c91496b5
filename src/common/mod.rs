//! Common Infrastructure Module
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - The root error type

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{ConfigError, Network, StoreBackend, WalletConfig, DEFAULT_ACCOUNT};
pub use error::{Result, WalletError};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_api_call, log_redemption_event,
    log_registration_event, log_security_event, ErrorDetails, EventCategory, LogEvent, LogLevel,
    LoggingError,
};
