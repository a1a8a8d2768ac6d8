//! Integration tests for frame dispatch
//!
//! These tests validate how decoded frames reach the bus:
//! - Field selection and ordering per sensor type
//! - Topic layout and payload formatting
//! - Failure isolation between fields
//! - Draining the slot at shutdown

mod common;

use common::builders::FrameBuilder;
use common::mock_helpers::RecordingBus;
use rx868_relay::pipeline::{Dispatcher, DispatcherOptions, HandoffSlot, RunFlag};
use rx868_relay::types::QosLevel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn options(prefix: &str) -> DispatcherOptions {
    DispatcherOptions {
        topic_prefix: prefix.to_string(),
        qos: QosLevel::AtLeastOnce,
        poll_interval: Duration::from_millis(2),
        stats_interval: Some(Duration::from_millis(5)),
    }
}

fn published(log: &std::sync::Mutex<common::mock_helpers::BusLog>) -> Vec<(String, String)> {
    log.lock()
        .unwrap()
        .published
        .iter()
        .map(|p| (p.topic.clone(), p.payload.clone()))
        .collect()
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(t, p)| (t.to_string(), p.to_string()))
        .collect()
}

#[test]
fn test_each_sensor_type_routes_its_fields() {
    let (bus, log) = RecordingBus::new();
    let slot = Arc::new(HandoffSlot::new());
    let mut dispatcher = Dispatcher::new(bus, Arc::clone(&slot), RunFlag::new(), options("ws"));

    let frames = [
        FrameBuilder::new(1, 1).temperature(20.0).humidity(40.0).build(),
        FrameBuilder::new(4, 4)
            .temperature(19.5)
            .humidity(41.0)
            .pressure(998)
            .build(),
        FrameBuilder::new(7, 7)
            .temperature(-0.5)
            .humidity(90.0)
            .wind(14.2)
            .rain(301, false)
            .build(),
        FrameBuilder::new(9, 3).temperature(5.0).humidity(10.0).build(),
    ];
    for frame in frames {
        slot.publish(frame);
        assert!(dispatcher.poll_once());
    }

    assert_eq!(
        published(&log),
        pairs(&[
            ("ws/1/temperature", "20.0"),
            ("ws/1/humidity", "40.0"),
            ("ws/4/temperature", "19.5"),
            ("ws/4/humidity", "41.0"),
            ("ws/4/pressure", "998"),
            ("ws/7/temperature", "-0.5"),
            ("ws/7/humidity", "90.0"),
            ("ws/7/wind", "14.2"),
            ("ws/7/rain_sum", "301"),
            ("ws/7/rain_detect", "0"),
            ("ws/9/temperature", "5.0"),
        ])
    );
    assert!(log
        .lock()
        .unwrap()
        .published
        .iter()
        .all(|p| p.qos == QosLevel::AtLeastOnce));
}

#[test]
fn test_failed_field_does_not_block_the_rest() {
    let (bus, log) = RecordingBus::new();
    let bus = bus.timing_out("weatherstation/42/temperature");
    let mut dispatcher = Dispatcher::new(
        bus,
        Arc::new(HandoffSlot::new()),
        RunFlag::new(),
        options("weatherstation"),
    );

    let frame = FrameBuilder::new(42, 1).temperature(21.3).humidity(45.0).build();
    assert_eq!(dispatcher.dispatch_frame(&frame), 1);

    assert_eq!(
        published(&log),
        pairs(&[("weatherstation/42/humidity", "45.0")])
    );
    let stats = dispatcher.stats();
    assert_eq!(stats.frames, 1);
    assert_eq!(stats.publish_failures, 1);
    assert_eq!(stats.publish_timeouts, 1);
}

#[test]
fn test_run_loop_until_stopped() {
    let (bus, log) = RecordingBus::new();
    let slot = Arc::new(HandoffSlot::new());
    let running = RunFlag::new();

    let worker_slot = Arc::clone(&slot);
    let worker_flag = running.clone();
    let handle = thread::spawn(move || {
        let mut dispatcher = Dispatcher::new(bus, worker_slot, worker_flag, options("ws"));
        let stats = dispatcher.run();
        (stats, dispatcher.into_inner())
    });

    slot.publish(FrameBuilder::new(11, 0).temperature(1.0).build());
    assert!(common::wait_until(|| log.lock().unwrap().published.len() == 1));

    // Either the next poll or the shutdown drain delivers it
    slot.publish(FrameBuilder::new(12, 0).temperature(2.0).build());
    running.stop();

    let (stats, _bus) = handle.join().unwrap();
    assert_eq!(stats.frames, 2);
    assert_eq!(
        published(&log),
        pairs(&[("ws/11/temperature", "1.0"), ("ws/12/temperature", "2.0")])
    );
    assert!(slot.try_take().is_none());
}
