use axle_core::{Event, EventBus, PwmUpdated};

fn pwm_event(pin: u8, duty: u8) -> Event {
    Event::PwmUpdated(PwmUpdated {
        pin,
        duty,
        frequency_hz: 1000,
    })
}

fn duty_of(event: &Event) -> u8 {
    match event {
        Event::PwmUpdated(p) => p.duty,
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn every_subscriber_sees_every_event() {
    let bus = EventBus::new();
    let a = bus.subscribe();
    let b = bus.subscribe();

    bus.publish(pwm_event(18, 10));
    bus.publish(pwm_event(18, 20));

    assert_eq!(a.drain().iter().map(duty_of).collect::<Vec<_>>(), vec![10, 20]);
    assert_eq!(b.drain().iter().map(duty_of).collect::<Vec<_>>(), vec![10, 20]);
}

#[test]
fn slow_subscribers_lose_the_oldest_events() {
    let bus = EventBus::new();
    let slow = bus.subscribe_with_depth(4);

    for duty in 0..10u8 {
        bus.publish(pwm_event(18, duty));
    }

    // Drop-oldest: the freshest four survive.
    let seen: Vec<u8> = slow.drain().iter().map(duty_of).collect();
    assert_eq!(seen, vec![6, 7, 8, 9]);
}

#[test]
fn a_stalled_subscriber_does_not_block_publishing() {
    let bus = EventBus::new();
    let _stalled = bus.subscribe_with_depth(1);
    let live = bus.subscribe();

    // Far beyond the stalled queue's depth; publish must stay non-blocking
    // and the live subscriber must see everything.
    for duty in 0..100u8 {
        bus.publish(pwm_event(18, duty));
    }
    assert_eq!(live.drain().len(), 100);
}

#[test]
fn dropped_streams_are_pruned() {
    let bus = EventBus::new();
    let keep = bus.subscribe();
    {
        let _short_lived = bus.subscribe();
        bus.publish(pwm_event(18, 1));
    }
    bus.publish(pwm_event(18, 2));

    assert_eq!(bus.subscriber_count(), 1);
    assert_eq!(keep.drain().len(), 2);
}

#[test]
fn next_timeout_returns_queued_events() {
    let bus = EventBus::new();
    let stream = bus.subscribe();
    bus.publish(pwm_event(5, 42));

    let ev = stream
        .next_timeout(std::time::Duration::from_millis(50))
        .expect("queued event");
    assert_eq!(duty_of(&ev), 42);
    assert!(stream
        .next_timeout(std::time::Duration::from_millis(10))
        .is_none());
}
