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

//! Parsing of `sensors` (lm-sensors) text output into typed snapshots.
//!
//! Parsing is line oriented and section scoped: a `temp1:` line is only
//! attributed to an adapter when it appears inside that adapter's section,
//! which ends at the next blank line or the next section header.

use std::fmt;
use std::process::Command;

use tg_error::{Result, ThermguardError};
use tracing::{debug, warn};

use crate::constants::sensors as tokens;

/// A non-temperature reading kept with the unit `sensors` printed
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub value: f64,
    /// Numeric text exactly as printed (keeps trailing zeros for the log)
    pub text: String,
    pub unit: String,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.text, self.unit)
    }
}

/// A temperature reading that keeps the token `sensors` printed
#[derive(Debug, Clone, PartialEq)]
pub struct Temperature {
    pub celsius: f64,
    /// Token as printed, sign and unit included (`+68.5°C`)
    pub text: String,
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Diagnostic-only readings written to the retention log.
/// None of these drive severity classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendedReadings {
    pub wireless_temp: Option<Temperature>,
    /// temp1 of the PCI-attached die adapter, with its limits
    pub pci_temp: Option<Temperature>,
    pub pci_high: Option<Temperature>,
    pub pci_crit: Option<Temperature>,
    pub pci_hyst: Option<Temperature>,
    pub battery_voltage: Option<Measurement>,
    pub vddgfx: Option<Measurement>,
    pub vddnb: Option<Measurement>,
    pub cpu_fan: Option<Measurement>,
    pub gpu_fan: Option<Measurement>,
    pub power: Option<Measurement>,
    pub power_avg: Option<Measurement>,
    pub power_crit: Option<Measurement>,
    pub acpi_temp: Option<Temperature>,
}

/// Values parsed from one `sensors` invocation. Absent values stay `None`
/// and are never defaulted to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSnapshot {
    /// Value used for threshold checks
    pub primary_temp: Option<f64>,
    /// Second temp1 reading of the whole output, whatever its adapter
    pub secondary_temp: Option<f64>,
    pub edge_temp: Option<Temperature>,
    pub extended: ExtendedReadings,
}

impl SensorSnapshot {
    /// Snapshot with every field unknown
    pub fn unknown() -> Self {
        Self::default()
    }

    /// True when no temperature at all was parsed
    pub fn has_no_temperature(&self) -> bool {
        self.primary_temp.is_none()
            && self.secondary_temp.is_none()
            && self.edge_temp.is_none()
            && self.extended.wireless_temp.is_none()
            && self.extended.pci_temp.is_none()
            && self.extended.acpi_temp.is_none()
    }
}

// ============================================================================
// Sensor source
// ============================================================================

/// Provider of raw `sensors` text, one call per poll cycle
#[cfg_attr(test, mockall::automock)]
pub trait SensorSource: Send + Sync {
    fn read_raw(&self) -> Result<String>;
}

/// Runs the lm-sensors command line tool
#[derive(Debug, Clone)]
pub struct SensorsCommand {
    program: String,
}

impl SensorsCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for SensorsCommand {
    fn default() -> Self {
        Self::new(tokens::SENSORS_COMMAND)
    }
}

impl SensorSource for SensorsCommand {
    fn read_raw(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .output()
            .map_err(|e| ThermguardError::SensorQuery(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(ThermguardError::SensorQuery(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(ThermguardError::EmptySensorOutput);
        }
        Ok(text)
    }
}

/// Query the source and parse the result. Never fails: any read error or
/// output without a single temperature yields an all-unknown snapshot.
pub fn acquire_snapshot(source: &dyn SensorSource) -> SensorSnapshot {
    match source.read_raw() {
        Ok(raw) => {
            let snapshot = parse_snapshot(&raw);
            if snapshot.has_no_temperature() {
                warn!("READ: sensor output contained no temperature, treating cycle as unknown");
                return SensorSnapshot::unknown();
            }
            snapshot
        }
        Err(e) => {
            warn!("READ: sensor query failed: {}", e);
            SensorSnapshot::unknown()
        }
    }
}

// ============================================================================
// Section tracking
// ============================================================================

/// Adapter section a line belongs to
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Section {
    /// Between sections (after a blank line, before any header)
    None,
    Cpu,
    Wireless,
    Acpi,
    /// A header we do not attribute readings to
    Other,
}

fn header_section(line: &str) -> Option<Section> {
    let lower = line.to_ascii_lowercase();
    if lower.contains(tokens::CPU_ADAPTER) {
        return Some(Section::Cpu);
    }
    if lower.contains(tokens::WIRELESS_ADAPTER) {
        return Some(Section::Wireless);
    }
    if lower.contains(tokens::ACPI_ADAPTER) {
        return Some(Section::Acpi);
    }
    // Unknown chips: `sensors` prints chip ids flush left and without a colon
    let starts_indented = line.starts_with(char::is_whitespace);
    if !starts_indented && !line.contains(':') && !line.trim().is_empty() {
        return Some(Section::Other);
    }
    None
}

#[derive(Debug, Copy, Clone)]
struct ScopedLine<'a> {
    section: Section,
    is_header: bool,
    text: &'a str,
}

/// Walks the output carrying the current section as explicit state
struct SectionCursor<'a> {
    lines: std::str::Lines<'a>,
    section: Section,
}

impl<'a> SectionCursor<'a> {
    fn new(raw: &'a str) -> Self {
        Self { lines: raw.lines(), section: Section::None }
    }
}

impl<'a> Iterator for SectionCursor<'a> {
    type Item = ScopedLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let text = self.lines.next()?;
        if text.trim().is_empty() {
            self.section = Section::None;
            return Some(ScopedLine { section: Section::None, is_header: false, text });
        }
        if let Some(section) = header_section(text) {
            self.section = section;
            return Some(ScopedLine { section, is_header: true, text });
        }
        Some(ScopedLine { section: self.section, is_header: false, text })
    }
}

// ============================================================================
// Token extraction
// ============================================================================

/// `+45.0°C` / `-3.5°C` -> value. Tokens without a sign or unit are rejected.
pub fn parse_temp_token(token: &str) -> Option<f64> {
    let body = token.strip_suffix(tokens::CELSIUS_SUFFIX)?;
    if !(body.starts_with('+') || body.starts_with('-')) {
        return None;
    }
    body.parse::<f64>().ok()
}

fn temperature(token: &str) -> Option<Temperature> {
    let celsius = parse_temp_token(token)?;
    Some(Temperature { celsius, text: token.to_string() })
}

/// First temperature token on the line
fn first_temp(line: &str) -> Option<Temperature> {
    line.split_whitespace().find_map(temperature)
}

/// Temperature following `key` (`high`, `crit`, `hyst`) inside a limits group
fn bound_after(line: &str, key: &str) -> Option<Temperature> {
    let start = line.find(key)? + key.len();
    line[start..]
        .split_whitespace()
        .find(|t| t.contains(tokens::CELSIUS_SUFFIX))
        .map(|t| t.trim_end_matches([')', ',']))
        .and_then(temperature)
}

fn measurement(value_text: &str, unit: &str) -> Option<Measurement> {
    let text = value_text.trim_start_matches('+');
    let value = text.parse::<f64>().ok()?;
    Some(Measurement {
        value,
        text: text.to_string(),
        unit: unit.trim_end_matches([')', ',']).to_string(),
    })
}

/// Two tokens following `label`: value and unit
fn labelled_measurement(line: &str, label: &str) -> Option<Measurement> {
    let start = line.find(label)? + label.len();
    let mut parts = line[start..].split_whitespace();
    let value = parts.next()?;
    let unit = parts.next()?;
    measurement(value, unit)
}

/// `(avg =  11.50 W, ...)`: second and third token from `avg`
fn power_average(line: &str) -> Option<Measurement> {
    let start = line.find("avg")?;
    let parts: Vec<&str> = line[start..].split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    measurement(parts[2], parts[3])
}

/// `(crit =  30.00 W)`: the first token carrying a `W` and its predecessor
fn power_critical(line: &str) -> Option<Measurement> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let idx = parts
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, p)| p.contains('W'))
        .map(|(i, _)| i)?;
    measurement(parts[idx - 1], parts[idx])
}

// ============================================================================
// Parsers
// ============================================================================

/// Primary CPU temperature used for escalation: temp1 of the CPU die
/// section, else the first line carrying a CPU alias.
pub fn select_primary(raw: &str) -> Option<f64> {
    let in_section = SectionCursor::new(raw)
        .filter(|l| l.section == Section::Cpu && !l.is_header)
        .filter(|l| l.text.contains(tokens::TEMP1_LABEL))
        .find_map(|l| first_temp(l.text));
    if let Some(temp) = in_section {
        return Some(temp.celsius);
    }

    raw.lines()
        .filter(|line| tokens::CPU_TEMP_ALIASES.iter().any(|alias| line.contains(alias)))
        .find_map(first_temp)
        .map(|temp| temp.celsius)
}

/// Parse a full snapshot from one `sensors` output block
pub fn parse_snapshot(raw: &str) -> SensorSnapshot {
    let mut snap = SensorSnapshot::unknown();
    let ext = &mut snap.extended;

    // Limits of the CPU temp1 may wrap onto the following line
    let mut cpu_limits_pending = false;
    let mut power_crit_pending = false;
    let mut temp1_readings = 0usize;

    for line in SectionCursor::new(raw) {
        let text = line.text;

        if power_crit_pending {
            power_crit_pending = false;
            if text.contains("crit") {
                ext.power_crit = power_critical(text);
            }
        }

        if cpu_limits_pending {
            cpu_limits_pending = false;
            if line.section == Section::Cpu && !line.is_header {
                read_cpu_limits(text, ext);
            }
        }

        if line.is_header {
            continue;
        }

        if text.contains(tokens::TEMP1_LABEL) {
            let value = first_temp(text);
            if let Some(temp) = &value {
                temp1_readings += 1;
                if temp1_readings == 2 {
                    snap.secondary_temp = Some(temp.celsius);
                }
            }
            match line.section {
                Section::Cpu => {
                    if ext.pci_temp.is_none() {
                        ext.pci_temp = value;
                        read_cpu_limits(text, ext);
                        cpu_limits_pending = true;
                    }
                }
                Section::Wireless => {
                    if ext.wireless_temp.is_none() {
                        ext.wireless_temp = value;
                    }
                }
                Section::Acpi => {
                    if ext.acpi_temp.is_none() {
                        ext.acpi_temp = value;
                    }
                }
                Section::None | Section::Other => {}
            }
        }

        if text.contains(tokens::EDGE_LABEL) && snap.edge_temp.is_none() {
            snap.edge_temp = first_temp(text);
        }

        if text.contains(tokens::BATTERY_LABEL) && ext.battery_voltage.is_none() {
            ext.battery_voltage = labelled_measurement(text, tokens::BATTERY_LABEL);
        }
        if text.contains(tokens::VDDGFX_LABEL) {
            ext.vddgfx = labelled_measurement(text, tokens::VDDGFX_LABEL);
        }
        if text.contains(tokens::VDDNB_LABEL) {
            ext.vddnb = labelled_measurement(text, tokens::VDDNB_LABEL);
        }
        if text.contains(tokens::CPU_FAN_LABEL) {
            ext.cpu_fan = labelled_measurement(text, tokens::CPU_FAN_LABEL);
        }
        if text.contains(tokens::GPU_FAN_LABEL) {
            ext.gpu_fan = labelled_measurement(text, tokens::GPU_FAN_LABEL);
        }
        if text.contains(tokens::POWER_LABEL) {
            ext.power = labelled_measurement(text, tokens::POWER_LABEL);
            if text.contains("avg") {
                ext.power_avg = power_average(text);
            }
            power_crit_pending = true;
        }
    }

    snap.primary_temp = select_primary(raw);
    debug!(
        "READ: primary={:?} secondary={:?} edge={:?}",
        snap.primary_temp,
        snap.secondary_temp,
        snap.edge_temp.as_ref().map(|t| t.celsius)
    );
    snap
}

fn read_cpu_limits(text: &str, ext: &mut ExtendedReadings) {
    if ext.pci_high.is_none() {
        ext.pci_high = bound_after(text, "high");
    }
    if ext.pci_crit.is_none() {
        ext.pci_crit = bound_after(text, "crit");
    }
    if ext.pci_hyst.is_none() {
        ext.pci_hyst = bound_after(text, "hyst");
    }
}
