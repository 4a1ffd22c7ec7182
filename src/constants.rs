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

//! Constants and configuration defaults for thermguard
//!
//! Centralizes timings, default thresholds, sensor tokens and mitigation
//! targets. Other modules reference these instead of literals.

use std::time::Duration;

/// Timing of the poll loop and of mitigation steps
pub mod timing {
    use super::Duration;

    /// Interval between two poll cycles
    pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

    /// Age beyond which retention log blocks are pruned
    pub const RETENTION_WINDOW: Duration = Duration::from_secs(10 * 60);

    /// How long the transient alert window stays on screen
    pub const ALERT_DURATION: Duration = Duration::from_secs(5);

    /// Delay between the graceful and forceful phase of escalated termination
    pub const ESCALATION_DELAY: Duration = Duration::from_secs(1);
}

/// Default thresholds and paths
pub mod defaults {
    /// Warning threshold in °C
    pub const WARN_C: f64 = 73.0;

    /// Critical threshold in °C
    pub const CRITICAL_C: f64 = 78.0;

    /// Retention log location
    pub const LOG_FILE: &str = "/tmp/temp.log";

    /// Environment variable holding the tracing filter
    pub const LOG_LEVEL_ENV: &str = "THERMGUARD_LOG";

    /// Journald socket; its presence selects the journald tracing layer
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}

/// Tokens found in `sensors` output
pub mod sensors {
    /// External tool queried once per cycle
    pub const SENSORS_COMMAND: &str = "sensors";

    /// Section header token of the CPU die adapter (AMD k10temp)
    pub const CPU_ADAPTER: &str = "k10temp";

    /// Section header token of the wireless adapter
    pub const WIRELESS_ADAPTER: &str = "iwlwifi";

    /// Section header token of the ACPI thermal zone
    pub const ACPI_ADAPTER: &str = "acpitz";

    /// Line fragments accepted as a CPU temperature when no CPU section exists
    pub const CPU_TEMP_ALIASES: &[&str] = &["Tctl", "CPU"];

    /// Unit suffix of a temperature token
    pub const CELSIUS_SUFFIX: &str = "°C";

    pub const TEMP1_LABEL: &str = "temp1:";
    pub const EDGE_LABEL: &str = "edge:";
    pub const CPU_FAN_LABEL: &str = "cpu_fan:";
    pub const GPU_FAN_LABEL: &str = "gpu_fan:";
    pub const VDDGFX_LABEL: &str = "vddgfx:";
    pub const VDDNB_LABEL: &str = "vddnb:";
    pub const POWER_LABEL: &str = "power1:";
    pub const BATTERY_LABEL: &str = "in0:";
}

/// Retention log format
pub mod retention {
    /// Literal line terminating every record
    pub const SEPARATOR: &str = "--";

    /// Marker rendered for unknown values
    pub const UNKNOWN: &str = "N/A";
}

/// Mitigation targets
pub mod mitigation {
    /// Command line fragments of processes terminated at Critical
    pub const HEAVY_TARGETS: &[&str] = &["node", "java", "chrome", "antigravity", "python"];

    /// Fragment of processes escalated to a forceful kill above Critical
    pub const ESCALATION_TARGET: &str = "antigravity";

    /// Title of the transient alert window
    pub const ALERT_TITLE: &str = "temp high";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_are_ordered() {
        assert!(defaults::CRITICAL_C > defaults::WARN_C);
    }

    #[test]
    fn test_escalation_target_is_heavy_target() {
        assert!(mitigation::HEAVY_TARGETS.contains(&mitigation::ESCALATION_TARGET));
    }

    #[test]
    fn test_retention_window_covers_many_polls() {
        assert!(timing::RETENTION_WINDOW > timing::POLL_INTERVAL * 10);
    }
}
