/*
 * This file is part of thermguard.
 *
 * Copyright (C) 2025 thermguard contributors
 *
 * thermguard is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * thermguard is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with thermguard. If not, see <https://www.gnu.org/licenses/>.
 */

//! Operator diagnostics through `tracing`: the systemd journal when it is
//! reachable, stderr otherwise.

use std::path::Path;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::constants::defaults;

/// Where diagnostics ended up
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogSink {
    Journald,
    Stderr,
}

impl LogSink {
    pub fn describe(self) -> &'static str {
        match self {
            LogSink::Journald => "systemd journal",
            LogSink::Stderr => "stderr",
        }
    }
}

/// Filter directive from `THERMGUARD_LOG`, `info` when unset or empty
pub fn log_level_from_env() -> String {
    std::env::var(defaults::LOG_LEVEL_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Install the global subscriber. Call once, before the first event.
pub fn init_logging(level: &str) -> LogSink {
    if Path::new(defaults::JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(EnvFilter::new(level))
                    .init();
                return LogSink::Journald;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stderr", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_env_filter(EnvFilter::new(level))
        .init();
    LogSink::Stderr
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_log_level_defaults_to_info() {
        std::env::remove_var(defaults::LOG_LEVEL_ENV);
        assert_eq!(log_level_from_env(), "info");

        std::env::set_var(defaults::LOG_LEVEL_ENV, "  ");
        assert_eq!(log_level_from_env(), "info");
        std::env::remove_var(defaults::LOG_LEVEL_ENV);
    }

    #[test]
    #[serial]
    fn test_log_level_from_env() {
        std::env::set_var(defaults::LOG_LEVEL_ENV, "thermguard=debug");
        assert_eq!(log_level_from_env(), "thermguard=debug");
        std::env::remove_var(defaults::LOG_LEVEL_ENV);
    }

    #[test]
    fn test_sink_description() {
        assert_eq!(LogSink::Journald.describe(), "systemd journal");
        assert_eq!(LogSink::Stderr.describe(), "stderr");
    }
}
