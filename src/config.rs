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

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tg_error::{Result, ThermguardError};

use crate::constants::{defaults, timing};

/// Optional on-disk overrides. Every key may be omitted.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub warn_c: Option<f64>,
    #[serde(default)]
    pub critical_c: Option<f64>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Overrides given on the command line
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigOverrides {
    pub warn_c: Option<f64>,
    pub critical_c: Option<f64>,
    pub log_file: Option<PathBuf>,
}

/// Immutable runtime configuration, built once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    pub warn_c: f64,
    pub critical_c: f64,
    pub log_file: PathBuf,
    /// Fixed at 30s in production
    pub poll_interval: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            warn_c: defaults::WARN_C,
            critical_c: defaults::CRITICAL_C,
            log_file: PathBuf::from(defaults::LOG_FILE),
            poll_interval: timing::POLL_INTERVAL,
        }
    }
}

impl GuardConfig {
    /// Defaults, then the optional file, then command-line overrides.
    /// The result is validated.
    pub fn resolve(file: Option<&ConfigFile>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(file) = file {
            cfg.apply(file.warn_c, file.critical_c, file.log_file.clone());
        }
        cfg.apply(overrides.warn_c, overrides.critical_c, overrides.log_file.clone());
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&mut self, warn_c: Option<f64>, critical_c: Option<f64>, log_file: Option<PathBuf>) {
        if let Some(w) = warn_c {
            self.warn_c = w;
        }
        if let Some(c) = critical_c {
            self.critical_c = c;
        }
        if let Some(p) = log_file {
            self.log_file = p;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.warn_c.is_finite() {
            return Err(ThermguardError::invalid_config("warn", "must be a finite number"));
        }
        if !self.critical_c.is_finite() {
            return Err(ThermguardError::invalid_config("critical", "must be a finite number"));
        }
        if self.critical_c <= self.warn_c {
            return Err(ThermguardError::InvalidThresholds {
                warn: self.warn_c,
                critical: self.critical_c,
            });
        }
        if self.log_file.as_os_str().is_empty() {
            return Err(ThermguardError::invalid_config("log_file", "path is empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(ThermguardError::invalid_config("poll_interval", "must be non-zero"));
        }
        Ok(())
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let data = fs::read_to_string(path).map_err(|source| ThermguardError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ConfigFile = serde_json::from_str(&data)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = GuardConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.warn_c, 73.0);
        assert_eq!(cfg.critical_c, 78.0);
        assert_eq!(cfg.log_file, PathBuf::from("/tmp/temp.log"));
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_critical_must_exceed_warn() {
        let overrides = ConfigOverrides { warn_c: Some(80.0), critical_c: Some(80.0), log_file: None };
        let err = GuardConfig::resolve(None, &overrides).unwrap_err();
        assert!(matches!(err, ThermguardError::InvalidThresholds { .. }));

        let overrides = ConfigOverrides { warn_c: Some(85.0), critical_c: Some(80.0), log_file: None };
        assert!(GuardConfig::resolve(None, &overrides).is_err());
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let overrides = ConfigOverrides { warn_c: Some(f64::NAN), critical_c: None, log_file: None };
        let err = GuardConfig::resolve(None, &overrides).unwrap_err();
        assert!(matches!(err, ThermguardError::InvalidConfig { ref field, .. } if field == "warn"));
    }

    #[test]
    fn test_overrides_beat_file() {
        let file = ConfigFile {
            warn_c: Some(60.0),
            critical_c: Some(70.0),
            log_file: Some(PathBuf::from("/var/log/from-file.log")),
        };
        let overrides = ConfigOverrides { warn_c: None, critical_c: Some(90.0), log_file: None };
        let cfg = GuardConfig::resolve(Some(&file), &overrides).unwrap();
        assert_eq!(cfg.warn_c, 60.0);
        assert_eq!(cfg.critical_c, 90.0);
        assert_eq!(cfg.log_file, PathBuf::from("/var/log/from-file.log"));
    }

    #[test]
    fn test_load_config_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, r#"{{"warn_c": 70.5, "log_file": "/tmp/guard.log"}}"#).unwrap();
        let file = load_config_file(tmp.path()).unwrap();
        assert_eq!(file.warn_c, Some(70.5));
        assert_eq!(file.critical_c, None);
        assert_eq!(file.log_file, Some(PathBuf::from("/tmp/guard.log")));
    }

    #[test]
    fn test_load_config_file_rejects_unknown_keys() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, r#"{{"warn": 70}}"#).unwrap();
        assert!(matches!(load_config_file(tmp.path()), Err(ThermguardError::JsonParse(_))));
    }

    #[test]
    fn test_load_config_file_missing() {
        let err = load_config_file(Path::new("/nonexistent/thermguard.json")).unwrap_err();
        assert!(matches!(err, ThermguardError::FileRead { .. }));
    }
}
