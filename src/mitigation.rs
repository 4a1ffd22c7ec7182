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

//! Mitigation executor
//!
//! Performs the ordered, best-effort side effects for a Warning or Critical
//! cycle. Every step is isolated: a failing step is logged and the next one
//! runs anyway, and nothing here returns an error to the poll loop.
//!
//! Order:
//! 1. desktop notification
//! 2. transient alert window (detached thread, self-closes)
//! 3. Critical: SIGTERM to heavy processes
//! 4. above Critical: escalated sudo TERM, delay, sudo KILL (detached thread)
//! 5. Critical: session lock and display power-off, first success wins

use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tg_error::{Result, ThermguardError};
use tracing::{debug, error, info, warn};

use crate::config::GuardConfig;
use crate::constants::{mitigation as targets, timing};
use crate::process::{self, ProcessInfo, ProcessSignal};
use crate::severity::SeverityTier;

// ============================================================================
// Requests handed to external collaborators
// ============================================================================

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    Critical,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Normal => "normal",
            Urgency::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub urgency: Urgency,
    pub headline: String,
    pub body: String,
}

impl Notification {
    pub fn for_tier(tier: SeverityTier, temp_c: f64, warn_c: f64) -> Self {
        let critical = tier == SeverityTier::Critical;
        Self {
            urgency: if critical { Urgency::Critical } else { Urgency::Normal },
            headline: if critical { "CPU OVERHEATING" } else { "CPU Temperature High" }.to_string(),
            body: format!(
                "Temperature {}°C ≥ {}°C\n{}",
                temp_c,
                warn_c,
                if critical { "KILLING PROCESSES!" } else { "Save work NOW" }
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRequest {
    pub title: String,
    pub temp_c: f64,
    pub tier: SeverityTier,
    /// The window closes itself after this long
    pub duration: Duration,
}

impl AlertRequest {
    pub fn text(&self) -> String {
        let label = if self.tier == SeverityTier::Critical { "CRITICAL!" } else { "High" };
        format!("CPU Temperature: {}°C\n{}", self.temp_c, label)
    }
}

/// Everything the executor asks the operating environment to do
pub trait Actuator: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<()>;

    /// Show the transient window; returns once it has closed
    fn show_alert(&self, alert: &AlertRequest) -> Result<()>;

    fn processes(&self) -> Result<Vec<ProcessInfo>>;

    fn signal(&self, pid: u32, signal: ProcessSignal) -> Result<()>;

    fn elevated_signal(&self, pid: u32, signal: ProcessSignal) -> Result<()>;

    /// Run a command silently, true on exit status 0
    fn run(&self, argv: &[String]) -> bool;
}

// ============================================================================
// Fallback chains
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackStep {
    pub description: String,
    pub argv: Vec<String>,
}

impl FallbackStep {
    fn new(description: &str, argv: &[&str]) -> Self {
        Self {
            description: description.to_string(),
            argv: argv.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Session details the lock/display chains depend on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnv {
    pub session_id: Option<String>,
    pub uid: u32,
    pub display: Option<String>,
}

impl SessionEnv {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            session_id: non_empty("XDG_SESSION_ID"),
            // SAFETY: getuid is always safe - it just returns the real user ID.
            uid: unsafe { libc::getuid() },
            display: non_empty("DISPLAY"),
        }
    }
}

pub fn lock_chain(session: &SessionEnv) -> Vec<FallbackStep> {
    let mut steps = vec![FallbackStep::new("xdotool Super+L", &["xdotool", "key", "Super_L+l"])];
    if let Some(id) = &session.session_id {
        steps.push(FallbackStep::new("loginctl lock-session (current)", &["loginctl", "lock-session", id.as_str()]));
    }
    let uid = session.uid.to_string();
    steps.extend([
        FallbackStep::new("loginctl lock-session", &["loginctl", "lock-session"]),
        FallbackStep::new("loginctl lock-user", &["loginctl", "lock-user", uid.as_str()]),
        FallbackStep::new("xdg-screensaver", &["xdg-screensaver", "lock"]),
        FallbackStep::new("gnome-screensaver", &["gnome-screensaver-command", "-l"]),
        FallbackStep::new(
            "dbus ScreenSaver.Lock",
            &[
                "dbus-send",
                "--type=method_call",
                "--dest=org.freedesktop.ScreenSaver",
                "/org/freedesktop/ScreenSaver",
                "org.freedesktop.ScreenSaver.Lock",
            ],
        ),
    ]);
    steps
}

/// Display commands need an X display; without one the chain is empty
pub fn display_chain(session: &SessionEnv) -> Vec<FallbackStep> {
    let Some(display) = &session.display else { return Vec::new() };
    vec![
        FallbackStep::new("xset dpms off", &["xset", "-display", display.as_str(), "dpms", "force", "off"]),
        FallbackStep::new("xset dpms standby", &["xset", "-display", display.as_str(), "dpms", "force", "standby"]),
    ]
}

/// Try each step in order and stop at the first success
pub fn first_success(actuator: &dyn Actuator, steps: &[FallbackStep]) -> Option<String> {
    for step in steps {
        if actuator.run(&step.argv) {
            return Some(step.description.clone());
        }
        debug!("ACTION: {} unavailable or failed", step.description);
    }
    None
}

// ============================================================================
// Executor
// ============================================================================

/// Outcome of one mitigation invocation. Dropping it detaches the
/// background work.
#[derive(Debug, Default)]
pub struct MitigationReport {
    pub notified: bool,
    pub alert: Option<JoinHandle<()>>,
    /// Processes that received SIGTERM in step 3
    pub terminated: Vec<ProcessInfo>,
    /// Escalation thread, yields the PIDs that were force-killed
    pub escalation: Option<JoinHandle<Vec<u32>>>,
    pub locked_with: Option<String>,
    pub display_off_with: Option<String>,
}

impl MitigationReport {
    pub fn acted(&self) -> bool {
        self.notified || self.alert.is_some() || !self.terminated.is_empty()
    }
}

pub struct MitigationExecutor {
    actuator: Arc<dyn Actuator>,
    warn_c: f64,
    critical_c: f64,
    session: SessionEnv,
    alert_duration: Duration,
    escalation_delay: Duration,
    own_pid: u32,
}

impl MitigationExecutor {
    pub fn new(config: &GuardConfig, actuator: Arc<dyn Actuator>, session: SessionEnv) -> Self {
        Self {
            actuator,
            warn_c: config.warn_c,
            critical_c: config.critical_c,
            session,
            alert_duration: timing::ALERT_DURATION,
            escalation_delay: timing::ESCALATION_DELAY,
            own_pid: std::process::id(),
        }
    }

    pub fn with_escalation_delay(mut self, delay: Duration) -> Self {
        self.escalation_delay = delay;
        self
    }

    /// Run every step appropriate to `tier`. Normal is a no-op.
    pub fn execute(&self, tier: SeverityTier, temp_c: f64) -> MitigationReport {
        let mut report = MitigationReport::default();
        if !tier.needs_mitigation() {
            return report;
        }

        let notification = Notification::for_tier(tier, temp_c, self.warn_c);
        match self.actuator.notify(&notification) {
            Ok(()) => report.notified = true,
            Err(e) => warn!("ACTION: desktop notification failed: {}", e),
        }

        report.alert = self.spawn_alert(tier, temp_c);

        if tier != SeverityTier::Critical {
            return report;
        }

        warn!(
            "CRITICAL TEMPERATURE {}°C ≥ {}°C - terminating heavy processes",
            temp_c, self.critical_c
        );
        report.terminated = self.terminate_heavy();

        if temp_c > self.critical_c {
            report.escalation = self.spawn_escalation();
        }

        report.locked_with = first_success(self.actuator.as_ref(), &lock_chain(&self.session));
        match &report.locked_with {
            Some(how) => info!("ACTION: session locked due to critical temperature ({})", how),
            None => warn!("ACTION: no session lock mechanism succeeded"),
        }

        report.display_off_with = first_success(self.actuator.as_ref(), &display_chain(&self.session));
        match &report.display_off_with {
            Some(how) => info!("ACTION: display powered down to aid cooling ({})", how),
            None => warn!("ACTION: no display power-off mechanism succeeded"),
        }

        report
    }

    fn spawn_alert(&self, tier: SeverityTier, temp_c: f64) -> Option<JoinHandle<()>> {
        let request = AlertRequest {
            title: targets::ALERT_TITLE.to_string(),
            temp_c,
            tier,
            duration: self.alert_duration,
        };
        let actuator = Arc::clone(&self.actuator);
        let spawned = thread::Builder::new()
            .name("thermguard-alert".into())
            .spawn(move || {
                if let Err(e) = actuator.show_alert(&request) {
                    warn!("ACTION: alert window failed: {}", e);
                }
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("ACTION: could not start alert thread: {}", e);
                None
            }
        }
    }

    fn terminate_heavy(&self) -> Vec<ProcessInfo> {
        let procs = match self.actuator.processes() {
            Ok(p) => p,
            Err(e) => {
                error!("ACTION: process enumeration failed: {}", e);
                return Vec::new();
            }
        };

        let mut signaled = Vec::new();
        for (proc_info, target) in process::matching(&procs, targets::HEAVY_TARGETS, self.own_pid) {
            match self.actuator.signal(proc_info.pid, ProcessSignal::Terminate) {
                Ok(()) => {
                    info!(
                        "ACTION: sent SIGTERM to {} process (PID {}): {}",
                        target,
                        proc_info.pid,
                        truncate(&proc_info.command, 50)
                    );
                    signaled.push(proc_info.clone());
                }
                Err(e) => warn!("ACTION: could not terminate PID {}: {}", proc_info.pid, e),
            }
        }

        if signaled.is_empty() {
            info!("CRITICAL TEMP: no matching processes to terminate");
        }
        signaled
    }

    fn spawn_escalation(&self) -> Option<JoinHandle<Vec<u32>>> {
        let actuator = Arc::clone(&self.actuator);
        let delay = self.escalation_delay;
        let own_pid = self.own_pid;
        let spawned = thread::Builder::new()
            .name("thermguard-escalate".into())
            .spawn(move || escalate(actuator.as_ref(), delay, own_pid));
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("ACTION: could not start escalation thread: {}", e);
                None
            }
        }
    }
}

/// Graceful then forceful elevated termination of the escalation target.
/// Returns the PIDs that were still present for the forceful phase.
fn escalate(actuator: &dyn Actuator, delay: Duration, own_pid: u32) -> Vec<u32> {
    let find_targets = || -> Vec<u32> {
        match actuator.processes() {
            Ok(procs) => process::matching(&procs, &[targets::ESCALATION_TARGET], own_pid)
                .into_iter()
                .map(|(p, _)| p.pid)
                .collect(),
            Err(e) => {
                error!("ACTION: locating {} processes failed: {}", targets::ESCALATION_TARGET, e);
                Vec::new()
            }
        }
    };

    let initial = find_targets();
    if initial.is_empty() {
        info!("ACTION: no {} processes found to terminate", targets::ESCALATION_TARGET);
        return Vec::new();
    }
    for pid in &initial {
        match actuator.elevated_signal(*pid, ProcessSignal::Terminate) {
            Ok(()) => info!("ACTION: sent sudo kill to {} PID {}", targets::ESCALATION_TARGET, pid),
            Err(e) => warn!("ACTION: sudo kill of PID {} failed: {}", pid, e),
        }
    }

    thread::sleep(delay);

    let survivors = find_targets();
    for pid in &survivors {
        match actuator.elevated_signal(*pid, ProcessSignal::Kill) {
            Ok(()) => info!("ACTION: sent sudo kill -9 to {} PID {}", targets::ESCALATION_TARGET, pid),
            Err(e) => warn!("ACTION: sudo kill -9 of PID {} failed: {}", pid, e),
        }
    }
    survivors
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ============================================================================
// Production actuator
// ============================================================================

/// Talks to the real desktop and process table
#[derive(Debug, Default, Clone)]
pub struct SystemActuator;

impl SystemActuator {
    fn status(argv: &[&str]) -> Result<()> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ThermguardError::generic("empty command"))?;
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| ThermguardError::command(*program, e.to_string()))?;
        if !status.success() {
            return Err(ThermguardError::command(*program, format!("exited with {}", status)));
        }
        Ok(())
    }
}

impl Actuator for SystemActuator {
    fn notify(&self, n: &Notification) -> Result<()> {
        Self::status(&["notify-send", "-u", n.urgency.as_str(), n.headline.as_str(), n.body.as_str()])
    }

    fn show_alert(&self, alert: &AlertRequest) -> Result<()> {
        let secs = alert.duration.as_secs().max(1).to_string();
        let text = alert.text();

        // zenity exits non-zero on timeout, so only a failed spawn counts
        let zenity = Command::new("zenity")
            .args(["--warning", "--title", alert.title.as_str(), "--text", text.as_str()])
            .arg(format!("--timeout={}", secs))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if zenity.is_ok() {
            return Ok(());
        }

        Command::new("xmessage")
            .args(["-center", "-title", alert.title.as_str(), "-timeout", secs.as_str(), text.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|_| ())
            .map_err(|e| ThermguardError::command("xmessage", e.to_string()))
    }

    fn processes(&self) -> Result<Vec<ProcessInfo>> {
        process::list_processes()
    }

    fn signal(&self, pid: u32, signal: ProcessSignal) -> Result<()> {
        process::send_signal(pid, signal)
    }

    fn elevated_signal(&self, pid: u32, signal: ProcessSignal) -> Result<()> {
        process::send_elevated_signal(pid, signal)
    }

    fn run(&self, argv: &[String]) -> bool {
        let args: Vec<&str> = argv.iter().map(String::as_str).collect();
        Self::status(&args).is_ok()
    }
}
