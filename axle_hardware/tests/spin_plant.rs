use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axle_hardware::{SimBackend, SpinPlant, SpinPlantCfg};
use axle_traits::GpioBackend;

fn counting_input(sim: &SimBackend, pin: u8) -> (Arc<AtomicU64>, Box<dyn axle_traits::EdgeInput>) {
    let count = Arc::new(AtomicU64::new(0));
    let count_cb = count.clone();
    let input = sim
        .open_input(pin, Box::new(move |_, _| {
            count_cb.fetch_add(1, Ordering::Relaxed);
        }))
        .expect("open input");
    (count, input)
}

#[test]
fn spins_up_and_emits_edges_above_breakaway() {
    let sim = Arc::new(SimBackend::new());
    let (count, _input) = counting_input(&sim, 21);

    let mut out = sim.open_output(18).expect("open output");
    out.write_duty(150).unwrap();

    let plant = SpinPlant::spawn(
        sim.clone(),
        18,
        21,
        SpinPlantCfg {
            tau_s: 0.05,
            ..SpinPlantCfg::default()
        },
    );

    std::thread::sleep(Duration::from_millis(400));
    plant.stop();

    // 150 duty * 0.8 rpm/duty = 120 RPM => 90 pulses/s once spun up.
    assert!(
        count.load(Ordering::Relaxed) > 10,
        "expected edges from a spinning plant, saw {}",
        count.load(Ordering::Relaxed)
    );
}

#[test]
fn stays_stalled_below_breakaway_duty() {
    let sim = Arc::new(SimBackend::new());
    let (count, _input) = counting_input(&sim, 23);

    let mut out = sim.open_output(19).expect("open output");
    out.write_duty(3).unwrap(); // below the default break-away of 6

    let plant = SpinPlant::spawn(sim.clone(), 19, 23, SpinPlantCfg::default());
    std::thread::sleep(Duration::from_millis(200));
    plant.stop();

    assert_eq!(count.load(Ordering::Relaxed), 0);
}

#[test]
fn plant_thread_exits_on_drop() {
    let sim = Arc::new(SimBackend::new());
    let plant = SpinPlant::spawn(sim.clone(), 18, 21, SpinPlantCfg::default());
    std::thread::sleep(Duration::from_millis(20));

    let start = std::time::Instant::now();
    drop(plant);
    assert!(
        start.elapsed() < Duration::from_millis(200),
        "plant shutdown should be prompt"
    );
}
