//! Bus delivery guarantees: each subscriber sees a published message once,
//! nothing is replayed to late subscribers, and a failing subscriber does
//! not starve its neighbours.

use crate::prelude::*;
use colony_bus::{BusConfig, BusError, DeliveryError, PubSubBus};
use colony_core::test_support::{task_message, Recorder};
use colony_core::Message;
use std::collections::HashSet;
use std::time::Duration;

fn recording(recorder: &Recorder) -> impl Fn(&Message) -> Result<(), DeliveryError> + Send + Sync + 'static {
    let recorder = recorder.clone();
    move |msg: &Message| {
        recorder.record(msg);
        Ok(())
    }
}

#[test]
fn every_subscriber_sees_each_message_exactly_once() {
    let runtime = runtime();
    let bus = runtime.bus();
    let subscribers: Vec<Recorder> = (0..3).map(|_| Recorder::new()).collect();
    for recorder in &subscribers {
        bus.subscribe("jobs", recording(recorder));
    }

    for i in 0..20 {
        bus.publish("jobs", task_message("feeder", "jobs", &format!("t{i}")))
            .unwrap();
    }

    for recorder in &subscribers {
        assert!(settles_at(recorder, 20));
        let ids: HashSet<_> = recorder.messages().iter().map(|m| m.id().clone()).collect();
        assert_eq!(ids.len(), 20, "a message was delivered twice");
    }
}

#[test]
fn late_subscriber_gets_no_replay() {
    let runtime = runtime();
    let bus = runtime.bus();
    let early = Recorder::new();
    bus.subscribe("news", recording(&early));
    bus.publish("news", task_message("a", "news", "old")).unwrap();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || early.len() == 1));

    let late = Recorder::new();
    bus.subscribe("news", recording(&late));
    bus.publish("news", task_message("a", "news", "new")).unwrap();

    assert!(settles_at(&late, 1));
    assert_eq!(late.messages()[0].content_str("task_id"), Some("new"));
    assert!(settles_at(&early, 2));
}

#[test]
fn failing_subscriber_does_not_block_the_rest() {
    let runtime = runtime();
    let bus = runtime.bus();
    bus.subscribe("t", |_: &Message| Err(DeliveryError::new("boom")));
    bus.subscribe("t", |_: &Message| -> Result<(), DeliveryError> { panic!("kaboom") });
    let healthy = Recorder::new();
    bus.subscribe("t", recording(&healthy));

    bus.publish("t", task_message("a", "t", "1")).unwrap();
    bus.publish("t", task_message("a", "t", "2")).unwrap();

    assert!(settles_at(&healthy, 2));
}

#[test]
fn unsubscribed_callback_hears_nothing_more() {
    let runtime = runtime();
    let bus = runtime.bus();
    let seen = Recorder::new();
    let id = bus.subscribe("t", recording(&seen));
    bus.publish("t", task_message("a", "t", "1")).unwrap();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || seen.len() == 1));

    assert!(bus.unsubscribe("t", id));
    bus.publish("t", task_message("a", "t", "2")).unwrap();
    assert!(settles_at(&seen, 1));
}

#[test]
fn full_queue_rejects_publish() {
    let bus = PubSubBus::new(BusConfig {
        capacity: 2,
        poll_interval: Duration::from_millis(10),
        ..BusConfig::default()
    });
    bus.publish("t", task_message("a", "b", "1")).unwrap();
    bus.publish("t", task_message("a", "b", "2")).unwrap();

    let err = bus.publish("t", task_message("a", "b", "3")).unwrap_err();
    assert!(matches!(err, BusError::QueueFull { capacity: 2 }));
    assert_eq!(bus.queue_len(), 2);

    // draining makes room again
    let seen = Recorder::new();
    bus.subscribe("t", recording(&seen));
    bus.start().unwrap();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || seen.len() == 2));
    bus.publish("t", task_message("a", "b", "3")).unwrap();
    assert!(settles_at(&seen, 3));
}
