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

//! OS process enumeration and signaling via sysinfo

use std::ffi::OsString;
use std::process::{Command, Stdio};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};
use tg_error::{Result, ThermguardError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Full command line, arguments joined by spaces
    pub command: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcessSignal {
    /// SIGTERM
    Terminate,
    /// SIGKILL
    Kill,
}

impl ProcessSignal {
    pub fn to_sysinfo(self) -> Signal {
        match self {
            ProcessSignal::Terminate => Signal::Term,
            ProcessSignal::Kill => Signal::Kill,
        }
    }

    /// Flag for kill(1)
    pub fn kill_flag(self) -> &'static str {
        match self {
            ProcessSignal::Terminate => "-TERM",
            ProcessSignal::Kill => "-9",
        }
    }
}

/// Enumerate live processes. Userland threads and kernel threads (empty
/// command line) are skipped.
pub fn list_processes() -> Result<Vec<ProcessInfo>> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );

    let mut procs: Vec<ProcessInfo> = system
        .processes()
        .iter()
        .filter(|(_, proc)| proc.thread_kind().is_none())
        .filter_map(|(pid, proc)| {
            let command = join_cmdline(proc.cmd());
            (!command.is_empty()).then(|| ProcessInfo { pid: pid.as_u32(), command })
        })
        .collect();

    if procs.is_empty() {
        return Err(ThermguardError::ProcessList("no processes visible".into()));
    }
    procs.sort_by_key(|p| p.pid);
    Ok(procs)
}

pub fn join_cmdline(args: &[OsString]) -> String {
    args.iter()
        .filter(|arg| !arg.is_empty())
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Processes whose lowercased command line contains one of `fragments`,
/// paired with the fragment that matched. `exclude_pid` is never returned.
pub fn matching<'a>(
    procs: &'a [ProcessInfo],
    fragments: &[&'static str],
    exclude_pid: u32,
) -> Vec<(&'a ProcessInfo, &'static str)> {
    procs
        .iter()
        .filter(|p| p.pid != exclude_pid)
        .filter_map(|p| {
            let lower = p.command.to_lowercase();
            fragments
                .iter()
                .find(|frag| lower.contains(*frag))
                .map(|frag| (p, *frag))
        })
        .collect()
}

/// Send a signal with the daemon's own privileges
pub fn send_signal(pid: u32, signal: ProcessSignal) -> Result<()> {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::nothing(),
    );
    let process = system
        .process(target)
        .ok_or_else(|| ThermguardError::Signal { pid, reason: "no such process".into() })?;

    match process.kill_with(signal.to_sysinfo()) {
        Some(true) => Ok(()),
        Some(false) => Err(ThermguardError::Signal { pid, reason: "kill was refused".into() }),
        None => Err(ThermguardError::Signal { pid, reason: "signal not supported".into() }),
    }
}

/// Send a signal through `sudo kill`
pub fn send_elevated_signal(pid: u32, signal: ProcessSignal) -> Result<()> {
    let pid_arg = pid.to_string();
    let status = Command::new("sudo")
        .args(["-n", "kill", signal.kill_flag(), pid_arg.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| ThermguardError::command("sudo kill", e.to_string()))?;
    if !status.success() {
        return Err(ThermguardError::Signal { pid, reason: format!("sudo kill exited with {}", status) });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_join_cmdline() {
        let args: Vec<OsString> =
            ["/usr/lib/jvm/bin/java", "-jar", "", "app.jar"].iter().map(OsString::from).collect();
        assert_eq!(join_cmdline(&args), "/usr/lib/jvm/bin/java -jar app.jar");
        assert_eq!(join_cmdline(&[]), "");
    }

    #[test]
    fn test_matching_is_case_insensitive_and_excludes_self() {
        let procs = vec![
            ProcessInfo { pid: 1, command: "/sbin/init".into() },
            ProcessInfo { pid: 10, command: "/opt/Google/Chrome/chrome --type=renderer".into() },
            ProcessInfo { pid: 11, command: "/usr/bin/python3 script.py".into() },
            ProcessInfo { pid: 12, command: "/usr/bin/python3 thermguard-helper".into() },
        ];
        let found = matching(&procs, &["chrome", "python"], 12);
        let pids: Vec<(u32, &str)> = found.iter().map(|(p, f)| (p.pid, *f)).collect();
        assert_eq!(pids, vec![(10, "chrome"), (11, "python")]);
    }

    #[test]
    fn test_signal_flags() {
        assert_eq!(ProcessSignal::Terminate.to_sysinfo(), Signal::Term);
        assert_eq!(ProcessSignal::Kill.to_sysinfo(), Signal::Kill);
        assert_eq!(ProcessSignal::Kill.kill_flag(), "-9");
    }

    #[test]
    fn test_list_processes_contains_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let procs = list_processes().unwrap();
        let found = procs.iter().find(|p| p.pid == child.id());
        child.kill().unwrap();
        child.wait().unwrap();
        assert_eq!(found.map(|p| p.command.as_str()), Some("sleep 30"));
    }

    #[test]
    fn test_send_signal_terminates_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        send_signal(child.id(), ProcessSignal::Terminate).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[test]
    fn test_send_signal_to_reaped_pid_fails() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(matches!(
            send_signal(pid, ProcessSignal::Kill),
            Err(ThermguardError::Signal { .. })
        ));
    }
}
