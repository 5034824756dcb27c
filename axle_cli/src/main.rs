mod cli;
mod error_fmt;
mod rt;
mod track;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use axle_config::Config;
use axle_core::{ControllerCfg, EncoderCfg, GainSchedule, Gains, MotionSystem, SystemCfg};
use axle_hardware::{SimBackend, SpinPlant, SpinPlantCfg};
use axle_traits::GpioBackend;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::humanize;
use crate::track::{TrackParams, install_sigint_handler, run_monitor, run_track};

/// Non-blocking sink for `[logging] file`, honoring the rotation policy.
/// The worker guard parks in a OnceLock so the writer outlives main's
/// stack frames; returns None when no file is configured.
fn file_writer(
    logging: &axle_config::Logging,
) -> Option<tracing_appender::non_blocking::NonBlocking> {
    let path = logging.file.as_deref()?;
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let appender = match logging.rotation.as_deref() {
        Some(r) if r.eq_ignore_ascii_case("daily") => tracing_appender::rolling::daily(".", path),
        Some(r) if r.eq_ignore_ascii_case("hourly") => tracing_appender::rolling::hourly(".", path),
        _ => tracing_appender::rolling::never(".", path),
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    Some(writer)
}

/// Initialize tracing once for the whole app. Logs go to stderr and the
/// optional file sink; telemetry owns stdout, so JSONL output stays clean.
fn init_tracing(json: bool, level: &str, logging: &axle_config::Logging) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let file = file_writer(logging).map(|writer| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer)
    });
    let registry = tracing_subscriber::registry().with(filter).with(file);

    // The console layer types diverge on the formatter, hence the branch.
    if json {
        registry
            .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().pretty().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

/// Map the TOML config onto the core's controller/encoder structs.
fn system_cfg(cfg: &Config) -> SystemCfg {
    let c = &cfg.controller;
    SystemCfg {
        controller: ControllerCfg {
            update_rate_ms: c.update_rate_ms,
            deadband_rpm: c.deadband_rpm,
            gains: GainSchedule {
                low: Gains {
                    kp: c.low_kp,
                    ki: c.low_ki,
                    kd: c.low_kd,
                },
                high: Gains {
                    kp: c.high_kp,
                    ki: c.high_ki,
                    kd: c.high_kd,
                },
                low_speed_threshold_rpm: c.low_speed_threshold_rpm,
            },
            base_kick: c.base_kick,
            kick_per_target_rpm: c.kick_per_target_rpm,
            integral_limit: c.integral_limit,
            pwm_frequency_hz: c.pwm_frequency_hz,
            ..ControllerCfg::default()
        },
        encoder: EncoderCfg {
            pulses_per_rotation: cfg.encoder.pulses_per_rotation,
            debounce_us: cfg.encoder.debounce_us,
            window_us: cfg.encoder.window_us,
            min_window_us: cfg.encoder.min_window_us,
            filter_alpha: cfg.encoder.filter_alpha,
        },
    }
}

/// Probe the native driver; fall back to simulation, keeping the concrete
/// sim handle so a plant model can stand in for the motor.
fn build_backend() -> (Arc<dyn GpioBackend>, Option<Arc<SimBackend>>) {
    #[cfg(feature = "hardware")]
    {
        match axle_hardware::hardware::PiBackend::try_new() {
            Ok(b) => {
                tracing::info!("native GPIO driver ready");
                return (Arc::new(b), None);
            }
            Err(e) => {
                tracing::warn!(error = %e, "native GPIO unavailable; continuing in simulation");
            }
        }
    }
    let sim = Arc::new(SimBackend::new());
    (sim.clone(), Some(sim))
}

/// In simulation, attach the plant model so closed-loop commands have
/// something to spin.
fn spawn_plant_if_simulated(
    sim: Option<&Arc<SimBackend>>,
    cfg: &Config,
    drive_pin: u8,
    sensor_pin: u8,
) -> Option<SpinPlant> {
    let sim = sim?;
    let plant_cfg = SpinPlantCfg {
        rpm_per_duty: cfg.plant.rpm_per_duty,
        tau_s: cfg.plant.tau_s,
        breakaway_duty: cfg.plant.breakaway_duty,
        pulses_per_rotation: cfg.encoder.pulses_per_rotation,
    }
    .with_env_overrides();
    tracing::info!(drive_pin, sensor_pin, "simulated drivetrain attached");
    Some(SpinPlant::spawn(sim.clone(), drive_pin, sensor_pin, plant_cfg))
}

fn main() -> eyre::Result<()> {
    if let Err(e) = real_main() {
        if JSON_MODE.get().copied().unwrap_or(false) {
            let line = serde_json::json!({ "error": e.to_string() });
            println!("{line}");
        }
        eprintln!("{}", humanize(&e));
        std::process::exit(2);
    }
    Ok(())
}

fn real_main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    // Load the typed config; a missing file means defaults, a present but
    // broken file is an error the operator should see.
    let cfg: Config = match fs::read_to_string(&cli.config) {
        Ok(text) => axle_config::load_toml(&text)
            .wrap_err_with(|| format!("parse config {:?}", cli.config))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e).wrap_err_with(|| format!("read config {:?}", cli.config)),
    };
    cfg.validate().wrap_err("invalid configuration")?;

    init_tracing(cli.json, &cli.log_level, &cfg.logging);
    install_sigint_handler();

    let (backend, sim) = build_backend();
    let system = MotionSystem::new(backend, system_cfg(&cfg))?;

    match cli.cmd {
        Commands::SelfCheck => {
            tracing::info!("self-check starting");

            // Probe the output path: open, drive low, release.
            system.pwm_set(cfg.pins.control, 0, cfg.controller.pwm_frequency_hz, true)?;
            system.pwm_stop(cfg.pins.control)?;

            // Probe the input path: open with pull-up, then close.
            system.sensor_enable(cfg.pins.sensor_id, cfg.pins.sensor)?;
            system.sensor_disable(cfg.pins.sensor_id)?;

            let mode = if system.simulated() { "simulation" } else { "hardware" };
            tracing::info!(mode, "self-check ok");
            println!("OK ({mode})");
            Ok(())
        }
        Commands::Pwm {
            pin,
            duty,
            frequency,
            seconds,
        } => {
            system.pwm_set(pin, duty, frequency, true)?;
            println!(
                "{}",
                serde_json::to_string(&system.pwm_status()).unwrap_or_default()
            );
            std::thread::sleep(Duration::from_secs_f64(seconds.max(0.0)));
            system.pwm_stop(pin)?;
            Ok(())
        }
        Commands::Track {
            target_rpm,
            control_pin,
            sensor_pin,
            sensor_id,
            seconds,
            rt,
            rt_prio,
        } => {
            let params = TrackParams {
                target_rpm,
                control_pin: control_pin.unwrap_or(cfg.pins.control),
                sensor_pin: sensor_pin.unwrap_or(cfg.pins.sensor),
                sensor_id: sensor_id.unwrap_or(cfg.pins.sensor_id),
                seconds,
                rt,
                rt_prio,
            };
            let plant =
                spawn_plant_if_simulated(sim.as_ref(), &cfg, params.control_pin, params.sensor_pin);
            let res = run_track(&system, &params);
            if let Some(p) = plant {
                p.stop();
            }
            system.shutdown();
            res
        }
        Commands::Monitor {
            sensor_pin,
            sensor_id,
            seconds,
        } => {
            let pin = sensor_pin.unwrap_or(cfg.pins.sensor);
            let id = sensor_id.unwrap_or(cfg.pins.sensor_id);
            run_monitor(&system, id, pin, seconds)
        }
    }
}
