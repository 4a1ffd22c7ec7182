/*
 * Test utilities and mock helpers for thermguard
 *
 * Shared `sensors` fixtures, a recording actuator and small builders used
 * across the unit test modules.
 */

use std::sync::Mutex;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use tg_error::{Result, ThermguardError};

use crate::config::GuardConfig;
use crate::mitigation::{Actuator, AlertRequest, Notification};
use crate::process::{ProcessInfo, ProcessSignal};
use crate::sensors::SensorSource;

/// Output of `sensors` on a laptop with every adapter the log records
pub const SAMPLE_SENSORS_OUTPUT: &str = "\
iwlwifi_1-virtual-0
Adapter: Virtual device
temp1:        +38.0°C

amdgpu-pci-0500
Adapter: PCI adapter
vddgfx:        1.36 V
vddnb:       993.00 mV
edge:         +52.0°C
power1:       12.00 W  (avg =  11.50 W, interval =   0.01 s)
                       (crit =  30.00 W)

BAT0-acpi-0
Adapter: ACPI interface
in0:          12.35 V

k10temp-pci-00c3
Adapter: PCI adapter
Tctl:         +68.5°C
temp1:        +68.5°C  (high = +70.0°C)
                       (crit = +100.0°C, hyst = +95.0°C)

asus-isa-0000
Adapter: ISA adapter
cpu_fan:        2400 RPM
gpu_fan:        2100 RPM

acpitz-acpi-0
Adapter: ACPI interface
temp1:        +55.0°C  (crit = +103.0°C)
";

/// Output of a machine without a k10temp chip
pub const SAMPLE_WITHOUT_K10TEMP: &str = "\
asus-isa-0000
Adapter: ISA adapter
cpu_fan:        2400 RPM
CPU:          +61.0°C

acpitz-acpi-0
Adapter: ACPI interface
temp1:        +55.0°C
";

/// `sensors` output whose CPU die reports `temp_c`
pub fn sensors_output_with_cpu(temp_c: f64) -> String {
    format!(
        "k10temp-pci-00c3\nAdapter: PCI adapter\ntemp1:        {:+.1}°C  (high = +70.0°C)\n",
        temp_c
    )
}

pub fn test_config() -> GuardConfig {
    GuardConfig::default().with_poll_interval(Duration::from_millis(20))
}

/// 2025-03-01 at the given local wall clock time
pub fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 1)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .unwrap()
}

/// Minimal separator-terminated log block stamped `HH MM`
pub fn block(hour: u32, minute: u32) -> String {
    format!(
        "{:02} {:02} temp1: +40.0°C   PCI adapter +60.0°C  (high = N/A)   (crit = N/A, hyst = N/A)\n\
         edge:        +50.0°C\n\
         --\n",
        hour, minute
    )
}

/// Source that replays the same `sensors` text every cycle
#[derive(Debug, Clone)]
pub struct StaticSource(pub String);

impl SensorSource for StaticSource {
    fn read_raw(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// One interaction with the outside world
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Notify(Notification),
    Alert(AlertRequest),
    Processes,
    Signal(u32, ProcessSignal),
    Elevated(u32, ProcessSignal),
    Run(Vec<String>),
}

/// Actuator that records every call and never touches the system.
/// The process table is static, so signaled processes keep "surviving".
#[derive(Debug, Default)]
pub struct RecordingActuator {
    processes: Vec<ProcessInfo>,
    succeeding: Vec<String>,
    fail_notify: bool,
    fail_signals: bool,
    calls: Mutex<Vec<Call>>,
}

impl RecordingActuator {
    pub fn with_processes(procs: &[(u32, &str)]) -> Self {
        Self {
            processes: procs
                .iter()
                .map(|(pid, cmd)| ProcessInfo { pid: *pid, command: cmd.to_string() })
                .collect(),
            ..Self::default()
        }
    }

    /// Commands whose program name is `program` report success
    pub fn succeeding(mut self, program: &str) -> Self {
        self.succeeding.push(program.to_string());
        self
    }

    pub fn failing_notify(mut self) -> Self {
        self.fail_notify = true;
        self
    }

    pub fn failing_signals(mut self) -> Self {
        self.fail_signals = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn signal_result(&self, pid: u32) -> Result<()> {
        if self.fail_signals {
            return Err(ThermguardError::Signal { pid, reason: "Operation not permitted".into() });
        }
        Ok(())
    }
}

impl Actuator for RecordingActuator {
    fn notify(&self, notification: &Notification) -> Result<()> {
        self.record(Call::Notify(notification.clone()));
        if self.fail_notify {
            return Err(ThermguardError::command("notify-send", "not installed"));
        }
        Ok(())
    }

    fn show_alert(&self, alert: &AlertRequest) -> Result<()> {
        self.record(Call::Alert(alert.clone()));
        Ok(())
    }

    fn processes(&self) -> Result<Vec<ProcessInfo>> {
        self.record(Call::Processes);
        Ok(self.processes.clone())
    }

    fn signal(&self, pid: u32, signal: ProcessSignal) -> Result<()> {
        self.record(Call::Signal(pid, signal));
        self.signal_result(pid)
    }

    fn elevated_signal(&self, pid: u32, signal: ProcessSignal) -> Result<()> {
        self.record(Call::Elevated(pid, signal));
        self.signal_result(pid)
    }

    fn run(&self, argv: &[String]) -> bool {
        self.record(Call::Run(argv.to_vec()));
        argv.first().is_some_and(|p| self.succeeding.contains(p))
    }
}
