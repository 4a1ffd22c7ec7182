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

//! thermguard daemon (thermguardd)
//!
//! Runs in the foreground, normally as a systemd user or system service.
//! SIGINT/SIGTERM end the poll loop at the next sleep.

mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use thermguard::config::{load_config_file, GuardConfig};
use thermguard::logging::{init_logging, log_level_from_env};
use thermguard::mitigation::{SessionEnv, SystemActuator};
use thermguard::scheduler::{run_poll_loop, Guard, ShutdownSignal};
use thermguard::sensors::SensorsCommand;
use thermguard::ThermguardError;

use cli::Cli;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        // stderr is captured by journald when running as a service
        eprintln!("PANIC at {}: {}", location, message);
    }));
}

fn build_config(cli: &Cli) -> anyhow::Result<GuardConfig> {
    let file = match &cli.config {
        Some(path) => Some(
            load_config_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
        ),
        None => None,
    };
    let config = GuardConfig::resolve(file.as_ref(), &cli.overrides())
        .context("invalid configuration")?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    install_panic_hook();

    let cli = Cli::parse();

    let log_level = log_level_from_env();
    let sink = init_logging(&log_level);

    let config = match build_config(&cli) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            let invalid = e
                .downcast_ref::<ThermguardError>()
                .is_some_and(ThermguardError::is_config_error);
            if invalid {
                error!("STARTUP: refusing to start with invalid configuration: {:#}", e);
            } else {
                error!("STARTUP: {:#}", e);
            }
            return Err(e);
        }
    };

    info!(
        "STARTUP: thermguard {} (warn: {}°C, critical: {}°C, interval: {}s)",
        VERSION,
        config.warn_c,
        config.critical_c,
        config.poll_interval.as_secs()
    );
    info!("STARTUP: Logging to {}", config.log_file.display());
    info!("STARTUP: Diagnostics to {} (level: {})", sink.describe(), log_level);
    info!("STARTUP: PID: {}", std::process::id());

    let session = SessionEnv::from_env();
    if session.display.is_none() {
        warn!("STARTUP: DISPLAY is not set, display power-off will be unavailable");
    }

    let guard = Arc::new(Guard::new(
        Arc::clone(&config),
        Arc::new(SensorsCommand::default()),
        Arc::new(SystemActuator),
        session,
    ));

    if cli.once {
        let cycle_guard = Arc::clone(&guard);
        let tier = tokio::task::spawn_blocking(move || {
            let outcome = cycle_guard.run_cycle();
            // Let the alert window and escalation finish before the process exits
            if let Some(mut report) = outcome.mitigation {
                if let Some(handle) = report.alert.take() {
                    let _ = handle.join();
                }
                if let Some(handle) = report.escalation.take() {
                    let _ = handle.join();
                }
            }
            outcome.tier
        })
        .await
        .context("poll cycle panicked")?;
        info!("Single cycle complete (tier: {:?})", tier);
        return Ok(());
    }

    let shutdown = Arc::new(ShutdownSignal::new());
    let handler_shutdown = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        handler_shutdown.trigger();
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    let state = run_poll_loop(guard, shutdown).await;
    info!("SHUTDOWN: thermguard stopped ({:?})", state);
    Ok(())
}
