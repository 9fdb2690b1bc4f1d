use std::sync::atomic::AtomicBool;
use std::time::Duration;

use blinds_core::mocks::NoIndicator;
use blinds_core::{Command, Controller, ControllerCfg, Node, TopicMap};
use blinds_hardware::{BusHandle, LoopbackBus, SimPlant, SimulatedIndicator};
use blinds_traits::clock::test_clock::TestClock;

fn topics() -> TopicMap {
    TopicMap {
        command: "blinds/set".into(),
        set_position: "blinds/set_position".into(),
        feedback: "blinds/feedback".into(),
        position: "blinds/position".into(),
    }
}

fn node() -> (Node<LoopbackBus, SimulatedIndicator>, BusHandle, SimPlant, SimulatedIndicator) {
    let plant = SimPlant::new(650);
    let clock = TestClock::new();
    let mut controller = Controller::builder()
        .with_actuator(plant.actuator())
        .with_encoder(plant.encoder(4096))
        .with_cfg(ControllerCfg::default())
        .with_clock(Box::new(clock.clone()))
        .build()
        .unwrap();
    controller.begin().unwrap();
    let (bus, handle) = LoopbackBus::new();
    let led = SimulatedIndicator::new();
    let n = Node::new(controller, bus, Some(led.clone()), topics(), "test-blinds")
        .with_clock(Box::new(clock));
    (n, handle, plant, led)
}

#[test]
fn first_tick_connects_subscribes_and_reports() {
    let (mut n, handle, _plant, _led) = node();
    let t = n.tick();
    assert_eq!(handle.client_id().as_deref(), Some("test-blinds"));
    assert_eq!(
        handle.subscriptions(),
        vec!["blinds/set", "blinds/set_position", "blinds/feedback"]
    );
    assert_eq!(t.published, Some(100));
    let out = handle.take_published();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].topic, "blinds/position");
    assert_eq!(out[0].payload, "100");

    n.tick();
    assert!(handle.take_published().is_empty());
}

#[test]
fn drains_one_message_per_tick_in_order() {
    let (mut n, handle, _plant, _led) = node();
    n.tick();
    handle.send("blinds/set_position", "50");
    handle.send("blinds/set", "STOP");
    let t = n.tick();
    assert_eq!(t.command, Some(Command::SetPosition(50)));
    assert_eq!(n.controller().target(), -89_150);
    let t = n.tick();
    assert_eq!(t.command, Some(Command::Stop));
    assert!(t.outcome.status.is_settled());
    let frozen = n.controller().target();
    n.tick();
    assert_eq!(n.controller().target(), frozen);
}

#[test]
fn malformed_and_foreign_messages_are_dropped() {
    let (mut n, handle, _plant, _led) = node();
    n.tick();
    let before = n.controller().target();
    handle.send("blinds/set", "open");
    handle.send("blinds/set_position", "fifty");
    handle.send("other/topic", "OPEN");
    for _ in 0..3 {
        assert_eq!(n.tick().command, None);
    }
    assert_eq!(n.controller().target(), before);
}

#[test]
fn led_commands_drive_indicator() {
    let (mut n, handle, _plant, led) = node();
    handle.send("blinds/set", "ledon");
    n.tick();
    assert!(led.is_on());
    handle.send("blinds/set", "ledoff");
    n.tick();
    assert!(!led.is_on());
}

#[test]
fn control_continues_offline_and_report_waits_for_link() {
    let (mut n, handle, plant, _led) = node();
    handle.set_refuse_connect(true);
    let t = n.tick();
    assert_eq!(t.published, None);
    assert!(n.controller().publish_pending());

    n.controller_mut().apply(Command::Close);
    n.tick();
    assert_eq!(plant.moves().len(), 1);

    handle.set_refuse_connect(false);
    n.controller_mut().apply(Command::Stop);
    n.controller_mut().apply(Command::SetPosition(100));
    // Back within the deadzone of the top: the owed report goes out on reconnect.
    let t = n.tick();
    assert!(t.published.is_some());
    assert!(handle.connects() >= 3);
}

#[test]
fn failed_publish_is_retried_next_tick() {
    let (mut n, handle, _plant, _led) = node();
    n.tick();
    handle.take_published();
    n.controller_mut().apply(Command::Feedback(100));
    handle.set_fail_publish(true);
    assert_eq!(n.tick().published, None);
    assert!(n.controller().publish_pending());
    handle.set_fail_publish(false);
    assert_eq!(n.tick().published, Some(100));
    assert!(!n.controller().publish_pending());
}

#[test]
fn resubscribes_after_link_drop() {
    let (mut n, handle, _plant, _led) = node();
    n.tick();
    handle.drop_link();
    n.tick();
    assert_eq!(handle.subscriptions().len(), 3);
    assert_eq!(handle.connects(), 2);
}

#[test]
fn run_stops_at_tick_bound_and_releases_driver() {
    let (mut n, handle, plant, _led) = node();
    handle.send("blinds/set", "CLOSE");
    let shutdown = AtomicBool::new(false);
    let summary = n
        .run(Duration::from_millis(10), &shutdown, Some(20))
        .unwrap();
    assert_eq!(summary.ticks, 20);
    assert_eq!(summary.commands, 1);
    assert!(summary.publications >= 19);
    assert!(!plant.enabled());
}

#[test]
fn run_honors_shutdown_flag() {
    let plant = SimPlant::new(0);
    let controller = Controller::builder()
        .with_actuator(plant.actuator())
        .with_encoder(plant.encoder(4096))
        .build()
        .unwrap();
    let (bus, _handle) = LoopbackBus::new();
    let mut n: Node<LoopbackBus, NoIndicator> =
        Node::new(controller, bus, None, topics(), "x").with_clock(Box::new(TestClock::new()));
    let shutdown = AtomicBool::new(true);
    let summary = n.run(Duration::from_millis(10), &shutdown, None).unwrap();
    assert_eq!(summary.ticks, 0);
}
