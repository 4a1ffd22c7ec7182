//! Command line interface of the daemon

use std::path::PathBuf;

use clap::Parser;

use thermguard::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(name = "thermguardd")]
#[command(version)]
#[command(about = "thermguard - CPU thermal guard daemon")]
#[command(long_about = "thermguard - CPU thermal guard daemon

Samples lm-sensors every 30 seconds, keeps the last ten minutes of readings
in a rolling log, and steps in when the CPU runs hot: a desktop notification
and alert window at the warning threshold, then terminating heavy processes,
locking the session and blanking the display at the critical threshold.

EXAMPLES:
    thermguardd                              Run with defaults (73°C / 78°C)
    thermguardd --warn 70 --critical 80      Custom thresholds
    thermguardd --once                       Run a single cycle and exit

ENVIRONMENT VARIABLES:
    THERMGUARD_LOG=debug    Diagnostic log filter (default: info)")]
pub struct Cli {
    /// Warning threshold in °C
    #[arg(short, long, value_name = "CELSIUS")]
    pub warn: Option<f64>,

    /// Critical threshold in °C
    #[arg(short, long, value_name = "CELSIUS")]
    pub critical: Option<f64>,

    /// Retention log location
    #[arg(short, long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// JSON file with warn_c, critical_c and log_file keys
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            warn_c: self.warn,
            critical_c: self.critical,
            log_file: self.log_file.clone(),
        }
    }
}
