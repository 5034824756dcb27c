use std::sync::Arc;

use axle_core::claims::PinClaims;
use axle_core::{Event, EventBus, MotionError, PwmRegistry};
use axle_hardware::SimBackend;
use rstest::rstest;

fn registry() -> (Arc<SimBackend>, Arc<EventBus>, PwmRegistry) {
    let sim = Arc::new(SimBackend::new());
    let bus = Arc::new(EventBus::new());
    let claims = Arc::new(PinClaims::default());
    let reg = PwmRegistry::new(sim.clone(), bus.clone(), claims);
    (sim, bus, reg)
}

#[test]
fn set_then_status_round_trips() {
    let (_sim, _bus, reg) = registry();
    reg.set(18, 128, 1000, true).unwrap();

    let status = reg.status();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].pin, 18);
    assert_eq!(status[0].duty, 128);
    assert_eq!(status[0].frequency_hz, 1000);
    assert!(status[0].enabled);
}

#[rstest]
#[case(18, 0, 1000, true)]
#[case(18, 255, 1000, true)]
#[case(0, 100, 1, true)]
#[case(27, 100, 8000, true)]
fn boundary_values_are_accepted(
    #[case] pin: u8,
    #[case] duty: u16,
    #[case] frequency: u32,
    #[case] enabled: bool,
) {
    let (_sim, _bus, reg) = registry();
    reg.set(pin, duty, frequency, enabled).unwrap();
}

#[rstest]
#[case(28, 100, 1000, "pin")]
#[case(18, 256, 1000, "duty")]
#[case(18, 100, 0, "frequency")]
#[case(18, 100, 8001, "frequency")]
fn out_of_range_values_are_rejected_before_any_backend_call(
    #[case] pin: u8,
    #[case] duty: u16,
    #[case] frequency: u32,
    #[case] needle: &str,
) {
    let (sim, _bus, reg) = registry();
    let err = reg.set(pin, duty, frequency, true).unwrap_err();
    assert!(err.downcast_ref::<MotionError>().is_some_and(|e| matches!(e, MotionError::Validation(_))));
    assert!(err.to_string().contains(needle), "got: {err}");
    // No entry, no backend side effect.
    assert!(reg.status().is_empty());
    assert!(!sim.output_open(pin.min(27)));
}

#[test]
fn repeated_identical_set_is_a_backend_noop() {
    let (sim, _bus, reg) = registry();
    reg.set(18, 100, 1000, true).unwrap();
    reg.set(18, 100, 1000, true).unwrap();
    reg.set(18, 100, 1000, true).unwrap();

    assert_eq!(sim.duty_history(18), vec![100]);
}

#[test]
fn disabled_or_zero_duty_drives_low_but_retains_the_entry() {
    let (sim, _bus, reg) = registry();
    reg.set(18, 100, 1000, true).unwrap();

    reg.set(18, 100, 1000, false).unwrap();
    assert_eq!(sim.duty(18), Some(0));
    assert_eq!(reg.status().len(), 1);
    assert!(!reg.status()[0].enabled);

    reg.set(18, 0, 1000, true).unwrap();
    assert_eq!(sim.duty(18), Some(0));
    assert_eq!(reg.status().len(), 1);
}

#[test]
fn stop_on_unknown_pin_is_a_precondition_error() {
    let (_sim, _bus, reg) = registry();
    let err = reg.stop(18).unwrap_err();
    assert!(err.downcast_ref::<MotionError>().is_some_and(|e| matches!(e, MotionError::Precondition(_))));
}

#[test]
fn stop_drives_low_and_releases_the_pin() {
    let (sim, _bus, reg) = registry();
    reg.set(18, 200, 1000, true).unwrap();
    reg.stop(18).unwrap();

    assert!(reg.status().is_empty());
    assert!(!sim.output_open(18));
    assert_eq!(sim.duty_history(18), vec![200, 0]);

    // The pin is reusable afterwards.
    reg.set(18, 50, 500, true).unwrap();
}

#[test]
fn stop_all_writes_zero_everywhere_and_reports_each_pin() {
    let (sim, bus, reg) = registry();
    let stream = bus.subscribe();
    for pin in [5, 12, 18] {
        reg.set(pin, 100, 1000, true).unwrap();
    }
    let _ = stream.drain();

    let stopped = reg.stop_all();
    assert_eq!(stopped, vec![5, 12, 18]);
    assert!(reg.status().is_empty());
    for pin in [5u8, 12, 18] {
        assert_eq!(sim.duty_history(pin).last(), Some(&0));
    }

    // One PwmUpdated per stopped pin.
    let mut event_pins: Vec<u8> = stream
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            Event::PwmUpdated(p) => {
                assert_eq!(p.duty, 0);
                Some(p.pin)
            }
            _ => None,
        })
        .collect();
    event_pins.sort_unstable();
    assert_eq!(event_pins, vec![5, 12, 18]);
}

#[test]
fn successful_set_publishes_pwm_updated() {
    let (_sim, bus, reg) = registry();
    let stream = bus.subscribe();
    reg.set(18, 77, 2000, true).unwrap();

    match stream.try_next() {
        Some(Event::PwmUpdated(p)) => {
            assert_eq!((p.pin, p.duty, p.frequency_hz), (18, 77, 2000));
        }
        other => panic!("expected PwmUpdated, got {other:?}"),
    }
}

#[test]
fn conflicting_pin_roles_are_rejected() {
    let sim = Arc::new(SimBackend::new());
    let bus = Arc::new(EventBus::new());
    let claims = Arc::new(PinClaims::default());
    let reg = PwmRegistry::new(sim.clone(), bus.clone(), claims.clone());

    claims
        .claim(21, axle_core::claims::PinRole::EncoderInput)
        .unwrap();
    let err = reg.set(21, 100, 1000, true).unwrap_err();
    assert!(err.downcast_ref::<MotionError>().is_some_and(|e| matches!(e, MotionError::Conflict(_))));
    assert!(reg.status().is_empty());
}
