//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "axle", version, about = "axle motor-control server CLI")]
pub struct Cli {
    /// Path to config TOML (typed); missing file falls back to defaults
    #[arg(long, value_name = "FILE", default_value = "etc/axle.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
    /// Drive one PWM pin for a few seconds, then stop it
    Pwm {
        /// Output pin (BCM numbering, 0-27)
        #[arg(long)]
        pin: u8,
        /// Duty cycle 0-255
        #[arg(long)]
        duty: u16,
        /// Carrier frequency in Hz (1-8000)
        #[arg(long, default_value_t = 1000)]
        frequency: u32,
        /// How long to hold the output before stopping
        #[arg(long, value_name = "SECS", default_value_t = 2.0)]
        seconds: f64,
    },
    /// Run the closed RPM loop and stream telemetry as JSON lines
    Track {
        /// Setpoint in revolutions per minute
        #[arg(long, value_name = "RPM")]
        target_rpm: f64,
        /// Control output pin; defaults to [pins].control from the config
        #[arg(long)]
        control_pin: Option<u8>,
        /// Encoder input pin; defaults to [pins].sensor from the config
        #[arg(long)]
        sensor_pin: Option<u8>,
        /// Sensor id to register; defaults to [pins].sensor_id
        #[arg(long)]
        sensor_id: Option<u8>,
        /// Run duration; the loop also stops on Ctrl-C
        #[arg(long, value_name = "SECS", default_value_t = 10.0)]
        seconds: f64,
        /// Enable real-time mode (SCHED_FIFO + mlockall, Linux only)
        #[arg(long, action = ArgAction::SetTrue)]
        rt: bool,
        /// SCHED_FIFO priority when --rt is enabled (Linux only)
        #[arg(long, value_name = "PRIO")]
        rt_prio: Option<i32>,
    },
    /// Watch raw encoder telemetry without driving anything
    Monitor {
        /// Encoder input pin; defaults to [pins].sensor from the config
        #[arg(long)]
        sensor_pin: Option<u8>,
        /// Sensor id to register; defaults to [pins].sensor_id
        #[arg(long)]
        sensor_id: Option<u8>,
        /// Watch duration
        #[arg(long, value_name = "SECS", default_value_t = 10.0)]
        seconds: f64,
    },
}
