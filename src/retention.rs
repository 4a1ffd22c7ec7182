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

//! Rolling diagnostic log of extended sensor snapshots.
//!
//! The file is a sequence of blocks. A block starts with an `HH MM ...`
//! line and ends with a literal `--` line. Only hour and minute are stored,
//! so a block is compared against "today at HH:MM".

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use tg_error::{Result, ThermguardError};
use tracing::debug;

use crate::constants::retention::{SEPARATOR, UNKNOWN};
use crate::constants::timing;
use crate::sensors::{Measurement, SensorSnapshot, Temperature};

fn temp_or_na(t: &Option<Temperature>) -> String {
    t.as_ref().map(|t| t.to_string()).unwrap_or_else(|| UNKNOWN.to_string())
}

fn measurement_or_na(m: &Option<Measurement>) -> String {
    m.as_ref().map(|m| m.to_string()).unwrap_or_else(|| UNKNOWN.to_string())
}

/// Render one separator-terminated record stamped with `now`'s hour/minute
pub fn format_record<Tz: TimeZone>(snapshot: &SensorSnapshot, now: &DateTime<Tz>) -> String {
    let e = &snapshot.extended;
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = writeln!(
        out,
        "{:02} {:02} temp1: {}   PCI adapter {}  (high = {})   (crit = {}, hyst = {})",
        now.hour(),
        now.minute(),
        temp_or_na(&e.wireless_temp),
        temp_or_na(&e.pci_temp),
        temp_or_na(&e.pci_high),
        temp_or_na(&e.pci_crit),
        temp_or_na(&e.pci_hyst),
    );
    out.push('\n');
    let _ = writeln!(out, "BAT0-acpi-0   {}", measurement_or_na(&e.battery_voltage));
    out.push('\n');
    let _ = writeln!(out, "vddgfx:      {}", measurement_or_na(&e.vddgfx));
    let _ = writeln!(out, "vddnb:       {}", measurement_or_na(&e.vddnb));
    let _ = writeln!(out, "edge:        {}", temp_or_na(&snapshot.edge_temp));
    out.push_str("asus-isa-0000\n");
    out.push_str("Adapter: ISA adapter\n");
    let _ = writeln!(out, "cpu_fan:      {}", measurement_or_na(&e.cpu_fan));
    let _ = writeln!(out, "gpu_fan:      {}", measurement_or_na(&e.gpu_fan));
    out.push('\n');
    let _ = writeln!(
        out,
        "power1:       {} (avg =  {}, interval =   0.01 s)",
        measurement_or_na(&e.power),
        measurement_or_na(&e.power_avg)
    );
    let _ = writeln!(out, "                       (crit =  {})", measurement_or_na(&e.power_crit));
    let _ = writeln!(out, "temp1:        {}", temp_or_na(&e.acpi_temp));
    out.push_str(SEPARATOR);
    out.push('\n');
    out
}

/// Leading `HH MM` of a block's first line
pub fn parse_block_time(line: &str) -> Option<NaiveTime> {
    let mut parts = line.split_whitespace();
    let hour = parts.next()?.parse::<u32>().ok()?;
    let minute = parts.next()?.parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn is_separator(line: &str) -> bool {
    line.trim() == SEPARATOR
}

/// Result of one prune pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneStats {
    pub kept: usize,
    pub dropped: usize,
}

/// Keep the blocks of `content` no older than `window` relative to `now`.
/// Every `HH MM` line opens a new block, so lines without a timestamp form
/// blocks of their own and are always kept. Kept blocks are returned byte
/// for byte.
pub fn prune_content(content: &str, now: NaiveDateTime, window: Duration) -> (String, PruneStats) {
    let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::weeks(1));
    let mut out = String::with_capacity(content.len());
    let mut stats = PruneStats::default();

    let mut block: Vec<&str> = Vec::new();
    for line in content.split_inclusive('\n') {
        if !block.is_empty() && parse_block_time(line).is_some() {
            flush_block(&block, now, window, &mut out, &mut stats);
            block.clear();
        }
        block.push(line);
        if is_separator(line) {
            flush_block(&block, now, window, &mut out, &mut stats);
            block.clear();
        }
    }
    if !block.is_empty() {
        flush_block(&block, now, window, &mut out, &mut stats);
    }

    (out, stats)
}

fn flush_block(
    block: &[&str],
    now: NaiveDateTime,
    window: chrono::Duration,
    out: &mut String,
    stats: &mut PruneStats,
) {
    let Some(time) = block.first().and_then(|first| parse_block_time(first)) else {
        block.iter().for_each(|l| out.push_str(l));
        return;
    };
    if now - now.date().and_time(time) > window {
        stats.dropped += 1;
        return;
    }

    stats.kept += 1;
    block.iter().for_each(|l| out.push_str(l));
    if !block.last().is_some_and(|l| is_separator(l)) {
        // Record cut short by a crash: close it
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(SEPARATOR);
        out.push('\n');
    }
}

/// Append-only block log with a fixed retention window
#[derive(Debug, Clone)]
pub struct RetentionLog {
    path: PathBuf,
    window: Duration,
}

impl RetentionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), window: timing::RETENTION_WINDOW }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prune against the local wall clock
    pub fn prune(&self) -> Result<PruneStats> {
        self.prune_at(Local::now().naive_local())
    }

    /// Drop blocks older than the window relative to `now`. A missing file
    /// is not an error.
    pub fn prune_at(&self, now: NaiveDateTime) -> Result<PruneStats> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PruneStats::default()),
            Err(source) => return Err(ThermguardError::FileRead { path: self.path.clone(), source }),
        };

        let (pruned, stats) = prune_content(&content, now, self.window);
        if pruned != content {
            self.replace(&pruned)?;
        }
        debug!("RETENTION: kept {} block(s), dropped {}", stats.kept, stats.dropped);
        Ok(stats)
    }

    /// Write the whole file through a sibling temp file and rename
    fn replace(&self, content: &str) -> Result<()> {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, content).map_err(|source| ThermguardError::FileWrite {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| ThermguardError::FileWrite {
            path: self.path.clone(),
            source,
        })
    }

    /// Append a pre-formatted record, creating the file if needed
    pub fn append(&self, record: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ThermguardError::FileWrite {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| ThermguardError::FileWrite { path: self.path.clone(), source })?;
        file.write_all(record.as_bytes())
            .map_err(|source| ThermguardError::FileWrite { path: self.path.clone(), source })
    }

    /// Prune, then append the snapshot stamped with `now`
    pub fn record_at(&self, snapshot: &SensorSnapshot, now: DateTime<Local>) -> Result<PruneStats> {
        let stats = self.prune_at(now.naive_local())?;
        self.append(&format_record(snapshot, &now))?;
        Ok(stats)
    }
}
