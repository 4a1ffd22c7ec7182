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

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of one poll cycle's reading
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    Normal,
    Warning,
    Critical,
}

impl SeverityTier {
    /// Whether this tier triggers the mitigation executor
    pub fn needs_mitigation(self) -> bool {
        self >= SeverityTier::Warning
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SeverityTier::Normal => "normal",
            SeverityTier::Warning => "warning",
            SeverityTier::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Classify an instantaneous reading. No state is carried between cycles.
///
/// `warn_c <= temp` is Warning and `critical_c <= temp` is Critical; callers
/// guarantee `critical_c > warn_c` through config validation.
pub fn classify(temp_c: f64, warn_c: f64, critical_c: f64) -> SeverityTier {
    if temp_c >= critical_c {
        SeverityTier::Critical
    } else if temp_c >= warn_c {
        SeverityTier::Warning
    } else {
        SeverityTier::Normal
    }
}
