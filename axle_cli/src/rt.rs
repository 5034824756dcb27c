//! Real-time scheduling helpers (Linux SCHED_FIFO + mlockall).
//!
//! Best-effort: missing privileges produce warnings, never failures; the
//! control loop runs fine without them, just with more jitter.

#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>) {
    use libc::{
        MCL_CURRENT, SCHED_FIFO, mlockall, sched_get_priority_max, sched_get_priority_min,
        sched_param, sched_setscheduler,
    };
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }
    RT_ONCE.get_or_init(|| {
        unsafe {
            let min = sched_get_priority_min(SCHED_FIFO);
            let max = sched_get_priority_max(SCHED_FIFO);
            let wanted = prio.unwrap_or(min.max(1)).clamp(min, max);
            let param = sched_param {
                sched_priority: wanted,
            };
            if sched_setscheduler(0, SCHED_FIFO, &param) != 0 {
                tracing::warn!(
                    error = %std::io::Error::last_os_error(),
                    "SCHED_FIFO unavailable; continuing with the default scheduler"
                );
            } else {
                tracing::info!(priority = wanted, "SCHED_FIFO enabled");
            }

            if mlockall(MCL_CURRENT) != 0 {
                tracing::warn!(
                    error = %std::io::Error::last_os_error(),
                    "mlockall failed; page faults may add jitter"
                );
            }
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>) {
    if rt {
        tracing::warn!("--rt is only effective on Linux; ignoring");
    }
}
