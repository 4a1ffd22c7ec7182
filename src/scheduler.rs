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

//! Poll loop
//!
//! Two states only: Running until a shutdown is requested, then Terminated.
//! Each cycle reads the sensors, appends to the retention log, classifies
//! the primary temperature and hands Warning/Critical to the executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::GuardConfig;
use crate::mitigation::{Actuator, MitigationExecutor, MitigationReport, SessionEnv};
use crate::retention::RetentionLog;
use crate::sensors::{acquire_snapshot, SensorSnapshot, SensorSource};
use crate::severity::{classify, SeverityTier};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PollState {
    Running,
    Terminated,
}

/// Shutdown request shared between the signal handler and the poll loop
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Safe to call from any thread, including a signal handler thread
    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        // notify_one keeps a permit if the loop is not waiting yet
        self.notify.notify_one();
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    async fn notified(&self) {
        self.notify.notified().await
    }
}

/// What a single cycle did
#[derive(Debug)]
pub struct CycleOutcome {
    pub snapshot: SensorSnapshot,
    /// None when the primary temperature was unknown
    pub tier: Option<SeverityTier>,
    pub logged: bool,
    pub mitigation: Option<MitigationReport>,
}

/// Everything one cycle needs, built once at startup
pub struct Guard {
    config: Arc<GuardConfig>,
    source: Arc<dyn SensorSource>,
    log: RetentionLog,
    executor: MitigationExecutor,
}

impl Guard {
    pub fn new(
        config: Arc<GuardConfig>,
        source: Arc<dyn SensorSource>,
        actuator: Arc<dyn Actuator>,
        session: SessionEnv,
    ) -> Self {
        let executor = MitigationExecutor::new(&config, actuator, session);
        Self::with_executor(config, source, executor)
    }

    pub fn with_executor(
        config: Arc<GuardConfig>,
        source: Arc<dyn SensorSource>,
        executor: MitigationExecutor,
    ) -> Self {
        let log = RetentionLog::new(config.log_file.clone());
        Self { config, source, log, executor }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn log(&self) -> &RetentionLog {
        &self.log
    }

    pub fn run_cycle(&self) -> CycleOutcome {
        self.run_cycle_at(Local::now())
    }

    /// One full cycle. Blocking: runs the sensor command and file I/O.
    pub fn run_cycle_at(&self, now: DateTime<Local>) -> CycleOutcome {
        let snapshot = acquire_snapshot(self.source.as_ref());

        // The log records every cycle, unknown readings included
        let logged = match self.log.record_at(&snapshot, now) {
            Ok(stats) => {
                debug!("RETENTION: appended record ({} pruned)", stats.dropped);
                true
            }
            Err(e) => {
                warn!("RETENTION: could not update {}: {}", self.log.path().display(), e);
                false
            }
        };

        let Some(temp_c) = snapshot.primary_temp else {
            warn!("READ: primary CPU temperature unavailable, skipping classification");
            return CycleOutcome { snapshot, tier: None, logged, mitigation: None };
        };

        let tier = classify(temp_c, self.config.warn_c, self.config.critical_c);
        debug!("READ: CPU {}°C -> {}", temp_c, tier);

        let mitigation = if tier.needs_mitigation() {
            warn!("ACTION: CPU at {}°C ({}), mitigating", temp_c, tier);
            Some(self.executor.execute(tier, temp_c))
        } else {
            None
        };

        CycleOutcome { snapshot, tier: Some(tier), logged, mitigation }
    }
}

/// Sleep, cycle, repeat until `shutdown` fires. The shutdown cuts the sleep
/// short; a cycle already in progress is allowed to finish.
pub async fn run_poll_loop(guard: Arc<Guard>, shutdown: Arc<ShutdownSignal>) -> PollState {
    let interval = guard.config().poll_interval;
    info!("Poll loop starting (interval: {}s)", interval.as_secs_f64());

    let mut state = PollState::Running;
    let mut cycles: u64 = 0;

    while state == PollState::Running {
        if shutdown.is_triggered() {
            state = PollState::Terminated;
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.notified() => {
                debug!("Poll loop woken up by shutdown signal");
                state = PollState::Terminated;
                continue;
            }
        }

        cycles += 1;
        let cycle_guard = Arc::clone(&guard);
        // Background alert/escalation threads are detached when the report drops
        match tokio::task::spawn_blocking(move || cycle_guard.run_cycle()).await {
            Ok(outcome) => debug!("Cycle {} done (tier: {:?})", cycles, outcome.tier),
            Err(e) => error!("Cycle {} aborted: {}", cycles, e),
        }
    }

    info!("Poll loop stopped after {} cycle(s)", cycles);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::MockSensorSource;
    use crate::test_utils::{
        at, block, sensors_output_with_cpu, test_config, Call, RecordingActuator, StaticSource,
        SAMPLE_SENSORS_OUTPUT,
    };
    use chrono::TimeZone;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tg_error::ThermguardError;

    struct Harness {
        _dir: TempDir,
        actuator: Arc<RecordingActuator>,
        guard: Arc<Guard>,
    }

    fn harness(source: Arc<dyn SensorSource>, actuator: RecordingActuator) -> Harness {
        let dir = TempDir::new().unwrap();
        let mut config = test_config();
        config.log_file = dir.path().join("temp.log");
        let config = Arc::new(config);
        let actuator = Arc::new(actuator);
        let dyn_actuator: Arc<dyn Actuator> = actuator.clone();
        let executor = MitigationExecutor::new(&config, dyn_actuator, SessionEnv::default())
            .with_escalation_delay(Duration::from_millis(5));
        let guard = Arc::new(Guard::with_executor(config, source, executor));
        Harness { _dir: dir, actuator, guard }
    }

    fn join(outcome: &mut CycleOutcome) {
        if let Some(report) = outcome.mitigation.as_mut() {
            if let Some(h) = report.alert.take() {
                h.join().unwrap();
            }
            if let Some(h) = report.escalation.take() {
                h.join().unwrap();
            }
        }
    }

    fn local(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.from_local_datetime(&at(h, m, s)).unwrap()
    }

    #[test]
    fn test_normal_cycle_logs_without_mitigation() {
        let h = harness(Arc::new(StaticSource(SAMPLE_SENSORS_OUTPUT.into())), RecordingActuator::default());
        let outcome = h.guard.run_cycle();

        assert_eq!(outcome.tier, Some(SeverityTier::Normal));
        assert!(outcome.logged);
        assert!(outcome.mitigation.is_none());
        assert!(h.actuator.calls().is_empty());
        let content = fs::read_to_string(h.guard.log().path()).unwrap();
        assert!(content.ends_with("--\n"));
    }

    #[test]
    fn test_warning_cycle_notifies() {
        let h = harness(Arc::new(StaticSource(sensors_output_with_cpu(75.0))), RecordingActuator::default());
        let mut outcome = h.guard.run_cycle();
        join(&mut outcome);

        assert_eq!(outcome.tier, Some(SeverityTier::Warning));
        let calls = h.actuator.calls();
        assert!(calls.iter().any(|c| matches!(c, Call::Notify(_))));
        assert!(calls.iter().any(|c| matches!(c, Call::Alert(_))));
        assert!(!calls.iter().any(|c| matches!(c, Call::Signal(..) | Call::Run(_))));
    }

    #[test]
    fn test_sensor_failure_still_logs_unknown_record() {
        let mut source = MockSensorSource::new();
        source
            .expect_read_raw()
            .times(1)
            .returning(|| Err(ThermguardError::SensorQuery("sensors: not found".into())));
        let h = harness(Arc::new(source), RecordingActuator::default());

        let outcome = h.guard.run_cycle();
        assert_eq!(outcome.tier, None);
        assert!(outcome.logged);
        assert!(h.actuator.calls().is_empty());
        let content = fs::read_to_string(h.guard.log().path()).unwrap();
        assert!(content.contains("temp1: N/A"));
    }

    #[test]
    fn test_cycle_prunes_before_append() {
        let h = harness(Arc::new(StaticSource(SAMPLE_SENSORS_OUTPUT.into())), RecordingActuator::default());
        fs::write(h.guard.log().path(), format!("{}{}", block(12, 10), block(12, 27))).unwrap();

        h.guard.run_cycle_at(local(12, 30, 0));
        let content = fs::read_to_string(h.guard.log().path()).unwrap();
        assert!(!content.starts_with("12 10"));
        assert!(content.starts_with("12 27"));
        assert!(content.contains("\n12 30 temp1: +38.0°C"));
        assert_eq!(content.matches("\n--\n").count(), 2);
    }

    #[test]
    fn test_unwritable_log_does_not_stop_mitigation() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config();
        // A directory where the file should be
        config.log_file = dir.path().to_path_buf();
        let actuator = Arc::new(RecordingActuator::default());
        let guard = Guard::new(
            Arc::new(config),
            Arc::new(StaticSource(sensors_output_with_cpu(75.0))),
            actuator.clone(),
            SessionEnv::default(),
        );

        let mut outcome = guard.run_cycle();
        join(&mut outcome);
        assert!(!outcome.logged);
        assert!(outcome.mitigation.is_some_and(|r| r.notified));
        assert!(actuator.calls().iter().any(|c| matches!(c, Call::Notify(_))));
    }

    #[tokio::test]
    async fn test_poll_loop_terminates_on_shutdown() {
        let h = harness(Arc::new(StaticSource(SAMPLE_SENSORS_OUTPUT.into())), RecordingActuator::default());
        let shutdown = Arc::new(ShutdownSignal::new());

        let loop_handle = tokio::spawn(run_poll_loop(Arc::clone(&h.guard), Arc::clone(&shutdown)));
        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown.trigger();

        let state = tokio::time::timeout(Duration::from_secs(5), loop_handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state, PollState::Terminated);

        let content = fs::read_to_string(h.guard.log().path()).unwrap();
        assert!(content.matches("--\n").count() >= 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_runs_no_cycle() {
        let h = harness(Arc::new(StaticSource(SAMPLE_SENSORS_OUTPUT.into())), RecordingActuator::default());
        let shutdown = Arc::new(ShutdownSignal::new());
        shutdown.trigger();

        let state = run_poll_loop(Arc::clone(&h.guard), shutdown).await;
        assert_eq!(state, PollState::Terminated);
        assert!(!h.guard.log().path().exists());
    }
}
