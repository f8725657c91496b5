//! Structured Logging for the CLTV Wallet
//!
//! Provides structured logging with:
//! - JSON output for log aggregation services on mainnet
//! - Correlation IDs for request tracing
//! - Registration, redemption and security event helpers
//!
//! # Usage
//!
//! ```rust,ignore
//! use cltv_wallet::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true)?; // JSON mode for production
//!
//! tracing::info!(target: "cltv::api", request_id = %id, "Processing spend");
//! ```

use serde::Serialize;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// API request/response events
    Api,
    /// Locked output registration
    Registration,
    /// Spending of locked outputs
    Redemption,
    /// Security events (address/signature validation failures)
    Security,
    /// System events (startup, shutdown)
    System,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: level.as_filter().to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": {:?}}}",
                self.message
            )
        })
    }
}

/// Log a security-related event
pub fn log_security_event(
    event_type: &str,
    success: bool,
    details: serde_json::Value,
    correlation_id: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Security, event_type).with_data(
        serde_json::json!({
            "success": success,
            "details": details
        }),
    );

    if let Some(id) = correlation_id {
        event = event.with_correlation_id(id);
    }

    if success {
        tracing::info!(target: "cltv::security", "{}", event.to_json());
    } else {
        tracing::warn!(target: "cltv::security", "{}", event.to_json());
    }
}

/// Log a registration attempt
pub fn log_registration_event(
    correlation_id: &str,
    account: &str,
    address: &str,
    lock_time: Option<u32>,
    error: Option<(&str, &str)>,
) {
    let level = if error.is_none() { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Registration, "locked_output_registered")
        .with_correlation_id(correlation_id)
        .with_data(serde_json::json!({
            "account": account,
            "address": address,
            "lock_time": lock_time,
            "success": error.is_none()
        }));

    match error {
        Some((code, message)) => {
            event = event.with_error(code, message);
            tracing::warn!(target: "cltv::registration", "{}", event.to_json());
        }
        None => tracing::info!(target: "cltv::registration", "{}", event.to_json()),
    }
}

/// Log a redemption attempt
pub fn log_redemption_event(
    correlation_id: &str,
    from: &str,
    to: &str,
    txid: Option<&str>,
    fee: Option<u64>,
    error: Option<(&str, &str)>,
) {
    let level = if error.is_none() { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Redemption, "locked_output_spent")
        .with_correlation_id(correlation_id)
        .with_data(serde_json::json!({
            "from": from,
            "to": to,
            "txid": txid,
            "fee": fee,
            "success": error.is_none()
        }));

    match error {
        Some((code, message)) => {
            event = event.with_error(code, message);
            tracing::error!(target: "cltv::redemption", "{}", event.to_json());
        }
        None => tracing::info!(target: "cltv::redemption", "{}", event.to_json()),
    }
}

/// Log an API call and its outcome
pub fn log_api_call(method: &str, correlation_id: &str, duration_ms: u64, error_code: Option<&str>) {
    let level = if error_code.is_some() { LogLevel::Warn } else { LogLevel::Info };
    let mut event = LogEvent::new(level, EventCategory::Api, method)
        .with_correlation_id(correlation_id)
        .with_duration(duration_ms)
        .with_data(serde_json::json!({ "method": method }));

    match error_code {
        Some(code) => {
            event = event.with_error(code, format!("{} failed", method));
            tracing::warn!(target: "cltv::api", "{}", event.to_json());
        }
        None => tracing::info!(target: "cltv::api", "{}", event.to_json()),
    }
}

/// Initialize the logging system
///
/// `json_format` selects JSON lines (production) over pretty output.
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_filter();
        EnvFilter::new(format!(
            "cltv={level},cltv_wallet={level},tower_http={level},axum={level}"
        ))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from WalletConfig
pub fn init_from_config(config: &super::config::WalletConfig) -> Result<(), LoggingError> {
    let level = LogLevel::from(config.log_level.as_str());
    let json_format = config.network == super::config::Network::Mainnet;

    init_logging(level, json_format)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Redemption, "Test event")
            .with_correlation_id("test-123")
            .with_data(serde_json::json!({"key": "value"}))
            .with_duration(42);

        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(json["message"], "Test event");
        assert_eq!(json["category"], "redemption");
        assert_eq!(json["level"], "INFO");
        assert_eq!(json["correlation_id"], "test-123");
        assert_eq!(json["duration_ms"], 42);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let id1 = generate_correlation_id();
        let id2 = generate_correlation_id();

        assert_eq!(id1.len(), 36);
        assert_ne!(id1, id2);
    }
}
