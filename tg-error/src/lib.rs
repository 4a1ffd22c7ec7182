//! Unified error handling for thermguard
//!
//! This crate provides the single error type shared by the thermguard library
//! and daemon. It uses thiserror for Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using ThermguardError
pub type Result<T> = std::result::Result<T, ThermguardError>;

/// Unified error type for all thermguard operations
#[derive(thiserror::Error, Debug)]
pub enum ThermguardError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Critical threshold {critical}°C must be greater than warning threshold {warn}°C")]
    InvalidThresholds {
        warn: f64,
        critical: f64,
    },

    // ============================================================================
    // Sensor Errors
    // ============================================================================
    #[error("Sensor query failed: {0}")]
    SensorQuery(String),

    #[error("Sensor query returned no output")]
    EmptySensorOutput,

    // ============================================================================
    // External Command and Process Errors
    // ============================================================================
    #[error("Command `{command}` failed: {reason}")]
    Command {
        command: String,
        reason: String,
    },

    #[error("Failed to signal PID {pid}: {reason}")]
    Signal {
        pid: u32,
        reason: String,
    },

    #[error("Process enumeration failed: {0}")]
    ProcessList(String),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl ThermguardError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create an invalid config error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a command error from the program line and a reason
    pub fn command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is fatal at startup
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::InvalidThresholds { .. } | Self::JsonParse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_thresholds_message() {
        let err = ThermguardError::InvalidThresholds { warn: 80.0, critical: 75.0 };
        let msg = err.to_string();
        assert!(msg.contains("75"));
        assert!(msg.contains("80"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_command_error_is_not_config() {
        let err = ThermguardError::command("notify-send", "not found");
        assert_eq!(err.to_string(), "Command `notify-send` failed: not found");
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_generic_message_is_verbatim() {
        assert_eq!(ThermguardError::generic("empty command").to_string(), "empty command");
    }
}
