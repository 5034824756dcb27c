//! Closed-loop RPM controller.
//!
//! A single state machine with two observable states, `Idle` and `Active`.
//! While active, a periodic tick samples the bound sensor's filtered RPM,
//! runs a gain-scheduled PID with a feed-forward break-away kick, and
//! writes the resulting duty to the control pin. The controller talks to
//! the rest of the system through two narrow capability handles injected
//! at construction: a [`Tachometer`] for measurements and an [`Actuator`]
//! for duty writes.
//!
//! Known, deliberate behavior: if the bound sensor is disabled while the
//! loop is active, the controller keeps steering against the last held
//! measurement (for an unknown sensor id, it re-emits its last duty) until
//! the operator stops it.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axle_traits::{Clock, MonotonicClock};

use crate::bus::{Event, EventBus};
use crate::config::ControllerCfg;
use crate::error::{BuildError, MotionError, Result};
use crate::status::ControllerSnapshot;
use crate::ticker::Ticker;
use crate::util::{validate_pin, wall_ms};

/// Read side of the loop: filtered RPM per sensor id.
pub trait Tachometer: Send + Sync {
    /// Whether the sensor currently delivers edges.
    fn enabled(&self, sensor_id: u8) -> bool;
    /// Last filtered RPM. `None` means the sensor id is unknown; a known
    /// sensor with no estimate yet reads 0.0.
    fn filtered_rpm(&self, sensor_id: u8) -> Option<f64>;
    /// Drop the sensor's estimate so a fresh loop starts clean.
    fn reset_filter(&self, sensor_id: u8);
}

/// Write side of the loop: one duty write per tick.
pub trait Actuator: Send + Sync {
    fn apply_duty(&self, pin: u8, duty: u8) -> Result<()>;
}

struct LoopState {
    active: bool,
    target_rpm: f64,
    current_rpm: f64,
    current_pwm: u8,
    error: f64,
    control_pin: u8,
    sensor_id: u8,
    integral: f64,
    last_error: f64,
    sat_timer_s: f64,
}

impl LoopState {
    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            active: self.active,
            target_rpm: self.target_rpm,
            current_rpm: self.current_rpm,
            current_pwm: self.current_pwm,
            error: self.error,
            control_pin: self.control_pin,
            sensor_id: self.sensor_id,
            wall_ms: wall_ms(),
        }
    }
}

struct Shared {
    cfg: ControllerCfg,
    tach: Arc<dyn Tachometer>,
    actuator: Arc<dyn Actuator>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock + Send + Sync>,
    state: Mutex<LoopState>,
}

pub struct RpmController {
    shared: Arc<Shared>,
    ticker: Mutex<Option<Ticker>>,
}

impl std::fmt::Debug for RpmController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpmController").finish_non_exhaustive()
    }
}

impl RpmController {
    pub fn builder() -> RpmControllerBuilder<Missing, Missing> {
        RpmControllerBuilder::default()
    }

    /// Begin (or atomically restart) the closed loop.
    pub fn start(&self, target_rpm: f64, control_pin: u8, sensor_id: u8) -> Result<()> {
        if !target_rpm.is_finite() || target_rpm <= 0.0 {
            return Err(
                MotionError::Validation(format!("target rpm {target_rpm} must be > 0")).into(),
            );
        }
        validate_pin(control_pin)?;
        if !self.shared.tach.enabled(sensor_id) {
            return Err(
                MotionError::Precondition(format!("sensor {sensor_id} is not enabled")).into(),
            );
        }

        // The ticker slot doubles as the command lock: concurrent start and
        // stop calls are serialized here.
        let mut ticker_slot = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
        self.stop_inner(&mut ticker_slot)?;

        self.shared.tach.reset_filter(sensor_id);
        let kick = self.shared.cfg.kick_floor(target_rpm);
        let snapshot = {
            let mut st = self.lock_state();
            st.active = true;
            st.target_rpm = target_rpm;
            st.control_pin = control_pin;
            st.sensor_id = sensor_id;
            st.current_rpm = 0.0;
            st.error = target_rpm;
            st.integral = 0.0;
            st.sat_timer_s = 0.0;
            // Seeding last_error with the target suppresses the derivative
            // spike on the first tick.
            st.last_error = target_rpm;
            st.current_pwm = kick.round() as u8;
            st.snapshot()
        };

        let shared = self.shared.clone();
        let period = Duration::from_millis(self.shared.cfg.update_rate_ms);
        *ticker_slot = Some(Ticker::spawn(period, self.shared.clock.clone(), move || {
            shared.step()
        }));
        drop(ticker_slot);

        tracing::info!(target_rpm, control_pin, sensor_id, "rpm loop started");
        self.shared.bus.publish(Event::ControllerStatus(snapshot));
        Ok(())
    }

    /// Halt the loop and drive the control pin low. Idempotent; after it
    /// returns the controller writes nothing further.
    pub fn stop(&self) -> Result<()> {
        let mut ticker_slot = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
        self.stop_inner(&mut ticker_slot)
    }

    fn stop_inner(&self, ticker_slot: &mut Option<Ticker>) -> Result<()> {
        let (was_active, pin) = {
            let mut st = self.lock_state();
            let was = st.active;
            st.active = false;
            (was, st.control_pin)
        };
        if let Some(t) = ticker_slot.take() {
            // Joins the tick thread; an in-flight tick finishes first.
            t.stop();
        }
        if !was_active {
            return Ok(());
        }

        let write = self.shared.actuator.apply_duty(pin, 0);
        let snapshot = {
            let mut st = self.lock_state();
            st.current_pwm = 0;
            st.integral = 0.0;
            st.sat_timer_s = 0.0;
            st.snapshot()
        };
        tracing::info!(control_pin = pin, "rpm loop stopped");
        self.shared.bus.publish(Event::ControllerStatus(snapshot));
        write
    }

    /// Update the setpoint live; 0 while active is a stop.
    pub fn set_target(&self, target_rpm: f64) -> Result<()> {
        if !target_rpm.is_finite() || target_rpm < 0.0 {
            return Err(
                MotionError::Validation(format!("target rpm {target_rpm} must be >= 0")).into(),
            );
        }
        if target_rpm == 0.0 && self.is_active() {
            return self.stop();
        }
        let snapshot = {
            let mut st = self.lock_state();
            st.target_rpm = target_rpm;
            st.snapshot()
        };
        tracing::debug!(target_rpm, "target updated");
        self.shared.bus.publish(Event::ControllerStatus(snapshot));
        Ok(())
    }

    /// Re-route the loop without restarting it. When the control pin
    /// changes while active, the old pin is driven low first; a duty left
    /// behind on an unmanaged pin would never be cleared.
    pub fn set_params(&self, control_pin: Option<u8>, sensor_id: Option<u8>) -> Result<()> {
        if let Some(pin) = control_pin {
            validate_pin(pin)?;
        }
        let mut released_pin = None;
        let snapshot = {
            let mut st = self.lock_state();
            if let Some(id) = sensor_id {
                if st.active && !self.shared.tach.enabled(id) {
                    return Err(
                        MotionError::Precondition(format!("sensor {id} is not enabled")).into(),
                    );
                }
                st.sensor_id = id;
            }
            if let Some(pin) = control_pin
                && pin != st.control_pin
            {
                if st.active {
                    released_pin = Some(st.control_pin);
                }
                st.control_pin = pin;
            }
            st.snapshot()
        };
        if let Some(old) = released_pin
            && let Err(e) = self.shared.actuator.apply_duty(old, 0)
        {
            tracing::warn!(pin = old, error = %e, "failed to park the previous control pin");
        }
        tracing::debug!(?control_pin, ?sensor_id, "routing updated");
        self.shared.bus.publish(Event::ControllerStatus(snapshot));
        Ok(())
    }

    pub fn status(&self) -> ControllerSnapshot {
        self.lock_state().snapshot()
    }

    pub fn is_active(&self) -> bool {
        self.lock_state().active
    }

    /// Run one control iteration immediately. The spawned ticker calls this
    /// on its own thread; tests drive it directly for determinism.
    pub fn step(&self) {
        self.shared.step();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LoopState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for RpmController {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl Shared {
    /// One periodic control tick. Never fails: actuation errors are logged
    /// and retried on the next tick.
    fn step(&self) {
        let cfg = &self.cfg;
        let dt = cfg.update_rate_ms as f64 / 1000.0;

        let mut write: Option<(u8, u8)> = None;
        let snapshot;
        {
            let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !st.active {
                return;
            }
            match self.tach.filtered_rpm(st.sensor_id) {
                None => {
                    // Unknown sensor id: hold the last duty on the wire.
                    write = Some((st.control_pin, st.current_pwm));
                    snapshot = st.snapshot();
                }
                Some(rpm) => {
                    st.current_rpm = rpm;
                    let error = st.target_rpm - rpm;
                    st.error = error;

                    if error.abs() < cfg.deadband_rpm {
                        // In the deadband the last actuation stays on the
                        // wire untouched.
                        snapshot = st.snapshot();
                    } else {
                        let gains = cfg.gains.for_target(st.target_rpm);
                        let p = gains.kp * error;
                        st.integral = (st.integral + gains.ki * error * dt)
                            .clamp(-cfg.integral_limit, cfg.integral_limit);
                        let d = if st.last_error != st.target_rpm {
                            gains.kd * (error - st.last_error) / dt
                        } else {
                            0.0
                        };

                        let mut u = p + st.integral + d;
                        let kick = cfg.kick_floor(st.target_rpm);
                        if error > 0.0 && u < kick {
                            // Accelerating: guarantee break-away torque.
                            u = kick;
                        }
                        // Decelerating may coast below the kick, down to 0.
                        let min_allowed = if error > 0.0 { kick } else { 0.0 };
                        let duty = u.clamp(min_allowed, 255.0).round() as u8;
                        st.current_pwm = duty;

                        if duty == 0 || duty == 255 {
                            st.sat_timer_s += dt;
                            if st.sat_timer_s > cfg.sat_bleed_after_s {
                                st.integral *= cfg.sat_bleed_factor;
                            }
                        } else {
                            st.sat_timer_s = 0.0;
                        }
                        st.last_error = error;

                        write = Some((st.control_pin, duty));
                        snapshot = st.snapshot();
                    }
                }
            }
        }

        if let Some((pin, duty)) = write
            && let Err(e) = self.actuator.apply_duty(pin, duty)
        {
            tracing::warn!(pin, duty, error = %e, "pwm write failed; retrying next tick");
        }
        self.bus.publish(Event::ControllerStatus(snapshot));
    }
}

// ── Type-state builder ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for [`RpmController`]. The tachometer and actuator handles are
/// enforced at compile time; `try_build` stays available for dynamic
/// wiring.
pub struct RpmControllerBuilder<T, A> {
    tach: Option<Arc<dyn Tachometer>>,
    actuator: Option<Arc<dyn Actuator>>,
    bus: Option<Arc<EventBus>>,
    cfg: Option<ControllerCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _t: PhantomData<T>,
    _a: PhantomData<A>,
}

impl Default for RpmControllerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            tach: None,
            actuator: None,
            bus: None,
            cfg: None,
            clock: None,
            _t: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<T, A> RpmControllerBuilder<T, A> {
    pub fn with_tachometer(self, tach: Arc<dyn Tachometer>) -> RpmControllerBuilder<Set, A> {
        RpmControllerBuilder {
            tach: Some(tach),
            actuator: self.actuator,
            bus: self.bus,
            cfg: self.cfg,
            clock: self.clock,
            _t: PhantomData,
            _a: PhantomData,
        }
    }

    pub fn with_actuator(self, actuator: Arc<dyn Actuator>) -> RpmControllerBuilder<T, Set> {
        RpmControllerBuilder {
            tach: self.tach,
            actuator: Some(actuator),
            bus: self.bus,
            cfg: self.cfg,
            clock: self.clock,
            _t: PhantomData,
            _a: PhantomData,
        }
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_cfg(mut self, cfg: ControllerCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Dynamic build; fails on missing handles or invalid config.
    pub fn try_build(self) -> Result<RpmController> {
        let tach = self.tach.ok_or(BuildError::MissingTachometer)?;
        let actuator = self.actuator.ok_or(BuildError::MissingActuator)?;
        let cfg = self.cfg.unwrap_or_default();
        cfg.validate()?;
        let bus = self.bus.unwrap_or_else(|| Arc::new(EventBus::new()));
        let clock: Arc<dyn Clock + Send + Sync> =
            self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        Ok(RpmController {
            shared: Arc::new(Shared {
                cfg,
                tach,
                actuator,
                bus,
                clock,
                state: Mutex::new(LoopState {
                    active: false,
                    target_rpm: 0.0,
                    current_rpm: 0.0,
                    current_pwm: 0,
                    error: 0.0,
                    control_pin: 0,
                    sensor_id: 0,
                    integral: 0.0,
                    last_error: 0.0,
                    sat_timer_s: 0.0,
                }),
            }),
            ticker: Mutex::new(None),
        })
    }
}

impl RpmControllerBuilder<Set, Set> {
    /// Build with both capability handles statically present.
    pub fn build(self) -> Result<RpmController> {
        self.try_build()
    }
}
