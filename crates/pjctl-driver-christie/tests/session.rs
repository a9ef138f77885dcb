//! Session behaviour against a recording transport.

use pjctl_core::capabilities::SwitchOutcome;
use pjctl_core::mock::MockTransport;
use pjctl_core::transport::Transport;
use pjctl_driver_christie::{
    ChristieProjector, ProjectorConfig, ProjectorEvent, ProjectorModel, ProjectorProperties,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const RGB: &str = "Christie4k25rgbProjector";
const HS: &str = "Christie4k7hsProjector";

fn session(type_name: &str) -> (ChristieProjector, Arc<MockTransport>) {
    session_with(ProjectorConfig::tcp("proj-1", "127.0.0.1", 3002).with_type_name(type_name))
}

fn session_with(config: ProjectorConfig) -> (ChristieProjector, Arc<MockTransport>) {
    let transport = MockTransport::connected();
    let t = transport.clone();
    let projector = ChristieProjector::with_transport(&config, move |_| t as Arc<dyn Transport>);
    (projector, transport)
}

fn drain(rx: &mut broadcast::Receiver<ProjectorEvent>) -> Vec<ProjectorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// =============================================================================
// Input selection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_select_sends_feedback_code_for_every_input() {
    for (type_name, model) in [
        (HS, ProjectorModel::Christie4k7Hs),
        (RGB, ProjectorModel::Christie4k25Rgb),
    ] {
        let (projector, transport) = session(type_name);
        projector.handle_frame("(PWR!1)");
        let dialect = model.dialect();

        for (i, port) in dialect.inputs.iter().enumerate() {
            transport.take_sent();
            assert_eq!(projector.request_input(i + 1).await, SwitchOutcome::Selected);
            settle().await;

            let expected = format!("({}{})", dialect.input_code, port.feedback_match_code);
            assert_eq!(transport.sent().first(), Some(&expected), "{}", port.key);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_select_queries_input_after_settle() {
    let (projector, transport) = session(RGB);
    projector.handle_frame("(PWR!1)");

    projector.request_input(2).await;
    settle().await;
    assert_eq!(transport.sent(), vec!["(SIN2)"]);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(transport.sent(), vec!["(SIN2)", "(SIN?)"]);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_ordinal_sends_nothing() {
    let (projector, transport) = session(HS);
    projector.handle_frame("(PWR!1)");

    assert_eq!(projector.request_input(0).await, SwitchOutcome::Rejected);
    assert_eq!(projector.request_input(7).await, SwitchOutcome::Rejected);
    settle().await;
    assert!(transport.sent().is_empty());

    // Also while off: no power-on is triggered either.
    let (projector, transport) = session(HS);
    assert_eq!(projector.request_input(99).await, SwitchOutcome::Rejected);
    assert!(transport.sent().is_empty());
    assert!(!projector.feedback().warming.get());
}

#[tokio::test(start_paused = true)]
async fn test_input_toggle_is_unsupported() {
    let (projector, transport) = session(HS);
    assert!(projector.input_toggle().await.is_err());
    assert!(transport.sent().is_empty());
}

// =============================================================================
// Deferred switch
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_switch_while_off_runs_once_after_warm_up() {
    let (projector, transport) = session(HS);

    assert_eq!(projector.request_input(3).await, SwitchOutcome::Deferred);
    assert_eq!(projector.pending_input(), Some(3));
    assert_eq!(transport.sent(), vec!["(PWR1)", "(PWR?)"]);
    assert!(projector.feedback().warming.get());

    projector.handle_frame("(PWR!1)");
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert!(!projector.feedback().warming.get());
    assert_eq!(projector.pending_input(), None);
    assert_eq!(transport.count("(SIN+MAIN5)"), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.count("(SIN+MAIN5)"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_newer_deferred_request_replaces_older() {
    let (projector, transport) = session(HS);

    projector.request_input(1).await;
    // Second request while warming: power on is ignored, slot is overwritten.
    assert_eq!(projector.request_input(4).await, SwitchOutcome::Deferred);
    assert_eq!(projector.pending_input(), Some(4));
    assert_eq!(transport.count("(PWR1)"), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(transport.count("(SIN+MAIN3)"), 0);
    assert_eq!(transport.count("(SIN+MAIN6)"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_select_clears_pending_switch() {
    let (projector, transport) = session(RGB);

    projector.request_input(5).await;
    projector.handle_frame("(PWR!1)");
    assert_eq!(projector.request_input(2).await, SwitchOutcome::Selected);
    assert_eq!(projector.pending_input(), None);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(transport.count("(SIN2)"), 1);
    assert_eq!(transport.count("(SIN5)"), 0);
}

// =============================================================================
// Power interlock
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_double_power_on_sends_once() {
    let (projector, transport) = session(RGB);

    projector.power_on().await;
    projector.power_on().await;
    assert_eq!(transport.count("(PWR1)"), 1);

    // After warm-up the command goes through again.
    tokio::time::sleep(Duration::from_secs(30)).await;
    projector.power_on().await;
    assert_eq!(transport.count("(PWR1)"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_power_off_raises_cooling_and_blocks_power_on() {
    let (projector, transport) = session(RGB);
    projector.handle_frame("(PWR!1)");

    projector.power_off().await;
    assert!(projector.feedback().cooling.get());
    assert_eq!(transport.sent(), vec!["(PWR0)", "(PWR?)"]);

    projector.power_on().await;
    assert_eq!(transport.count("(PWR1)"), 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!projector.feedback().cooling.get());
}

#[tokio::test(start_paused = true)]
async fn test_warming_uses_configured_time() {
    let props = ProjectorProperties {
        warming_time_ms: 60_000,
        ..Default::default()
    };
    let (projector, _transport) =
        session_with(ProjectorConfig::tcp("proj-1", "127.0.0.1", 3002).with_properties(props));

    projector.power_on().await;
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert!(projector.feedback().warming.get());
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(!projector.feedback().warming.get());
}

#[tokio::test(start_paused = true)]
async fn test_power_feedback_does_not_clear_warming() {
    let (projector, _transport) = session(HS);
    projector.power_on().await;
    projector.handle_frame("(PWR!1)");

    assert!(projector.feedback().power_on.get());
    assert!(projector.feedback().warming.get());
}

#[tokio::test(start_paused = true)]
async fn test_power_toggle_follows_feedback() {
    let (projector, transport) = session(RGB);

    projector.power_toggle().await;
    assert_eq!(transport.count("(PWR1)"), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    projector.handle_frame("(PWR!1)");
    projector.power_toggle().await;
    assert_eq!(transport.count("(PWR0)"), 1);
}

// =============================================================================
// Feedback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_power_feedback_notifies_on_change_only() {
    let (projector, _transport) = session(RGB);
    let mut rx = projector.subscribe();

    projector.handle_frame("(PWR!1)");
    projector.handle_frame("(PWR!1)");
    projector.handle_frame("(PWR!0)");

    assert!(!projector.feedback().power_on.get());
    let power: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, ProjectorEvent::Power { .. }))
        .collect();
    assert_eq!(
        power,
        vec![
            ProjectorEvent::Power { on: true },
            ProjectorEvent::Power { on: false }
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_input_feedback_notifies_once() {
    let (projector, _transport) = session(HS);
    let mut rx = projector.subscribe();

    projector.handle_frame("(SIN+MAIN!3)");
    projector.handle_frame("(SIN+MAIN!3)");

    assert_eq!(
        drain(&mut rx),
        vec![ProjectorEvent::Input {
            ordinal: 1,
            key: "hdmiIn1".into()
        }]
    );
    assert_eq!(projector.current_input_number(), 1);
    assert!(projector.is_input_selected(1));
    assert!(!projector.is_input_selected(2));
    assert!(!projector.is_input_selected(0));
    assert_eq!(projector.status().current_input.as_deref(), Some("HDMI 1"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_input_code_leaves_state() {
    let (projector, _transport) = session(HS);
    projector.handle_frame("(SIN+MAIN!42)");
    assert_eq!(projector.current_input_number(), 0);
    assert_eq!(projector.feedback().current_input.get(), None);
}

#[tokio::test(start_paused = true)]
async fn test_lamp_hours_line() {
    let (projector, _transport) = session(RGB);
    let mut rx = projector.subscribe();

    projector.handle_frame("Lamp Hours = 1234:56)");
    assert_eq!(projector.feedback().lamp_hours.get(), Some(1234));

    projector.handle_frame("Lamp Hours = 12345)");
    assert_eq!(projector.feedback().lamp_hours.get(), Some(1234));

    projector.handle_frame("Lamp Hours = 12)");
    assert_eq!(
        drain(&mut rx),
        vec![ProjectorEvent::LampHours { hours: 1234 }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_lamp_response_code_per_model() {
    let (hs, _t) = session(HS);
    hs.handle_frame("(ILI!2500)");
    assert_eq!(hs.status().lamp_hours, Some(2500));

    let (rgb, _t) = session(RGB);
    rgb.handle_frame("(ILI!2500)");
    assert_eq!(rgb.status().lamp_hours, None);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_are_dropped() {
    let (projector, _transport) = session(RGB);
    let mut rx = projector.subscribe();

    projector.handle_frame("(PWR1)");
    projector.handle_frame("garbage");
    projector.handle_frame("(PWR!)");
    projector.handle_frame("(PWR!99999999999)");

    assert!(drain(&mut rx).is_empty());
    assert!(!projector.status().power_on);
}

#[tokio::test(start_paused = true)]
async fn test_frames_through_the_queue_apply_in_order() {
    let (projector, _transport) = session(RGB);
    let sink = projector.frame_sink();

    for frame in ["(PWR!1)", "(SIN!7)", "(SHU!1)", "(PWR!0)"] {
        assert!(sink.enqueue(frame));
    }
    settle().await;

    let status = projector.status();
    assert!(!status.power_on);
    assert!(status.video_mute);
    assert_eq!(status.current_input_key.as_deref(), Some("rgbIn2"));
    assert_eq!(status.current_input_number, 7);
}

#[tokio::test(start_paused = true)]
async fn test_queue_survives_bad_frames() {
    let (projector, _transport) = session(RGB);
    let sink = projector.frame_sink();

    sink.enqueue("(PWR!99999999999)");
    sink.enqueue("Lamp Hours = 1)");
    sink.enqueue("(PWR!1)");
    settle().await;

    assert!(projector.feedback().power_on.get());
}

// =============================================================================
// Video mute
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_video_mute_commands() {
    let (projector, transport) = session(RGB);

    projector.video_mute_on().await;
    assert_eq!(transport.take_sent(), vec!["(SHU1)", "(SHU?)"]);

    projector.handle_frame("(SHU!1)");
    projector.video_mute_toggle().await;
    assert_eq!(transport.take_sent(), vec!["(SHU0)", "(SHU?)"]);

    projector.video_mute_get().await;
    assert_eq!(transport.take_sent(), vec!["(SHU?)"]);
}

#[tokio::test(start_paused = true)]
async fn test_video_mute_feedback_notifies_on_change_only() {
    let (projector, _transport) = session(HS);
    let mut rx = projector.subscribe();

    projector.handle_frame("(SHU!1)");
    projector.handle_frame("(SHU!1)");
    projector.handle_frame("(SHU!0)");

    assert_eq!(
        drain(&mut rx),
        vec![
            ProjectorEvent::VideoMute { on: true },
            ProjectorEvent::VideoMute { on: false }
        ]
    );
}

// =============================================================================
// Queries and lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_explicit_queries() {
    let (hs, transport) = session(HS);
    hs.power_get().await;
    hs.input_get().await;
    hs.lamp_get().await;
    assert_eq!(transport.sent(), vec!["(PWR?)", "(SIN+MAIN?)", "(ILI?)"]);

    let (rgb, transport) = session(RGB);
    rgb.input_get().await;
    assert_eq!(transport.sent(), vec!["(SIN?)"]);
}

#[tokio::test(start_paused = true)]
async fn test_commands_dropped_while_disconnected() {
    let (projector, transport) = session(RGB);
    transport.set_connected(false);

    projector.power_on().await;
    projector.video_mute_on().await;
    assert!(transport.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_polls_and_reports_online() {
    let (projector, transport) = session(HS);
    projector.start().await;
    settle().await;

    assert_eq!(transport.connect_count(), 1);
    assert_eq!(transport.sent(), vec!["(PWR?)"]);

    projector.handle_frame("(PWR!0)");
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(transport.count("(PWR?)"), 2);
    assert!(projector.feedback().online.get());

    projector.shutdown().await;
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(transport.count("(PWR?)"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_start_survives_failed_connect() {
    let transport = MockTransport::disconnected();
    transport.fail_connects(true);
    let config = ProjectorConfig::tcp("proj-1", "127.0.0.1", 3002);
    let t = transport.clone();
    let projector = ChristieProjector::with_transport(&config, move |_| t as Arc<dyn Transport>);

    projector.start().await;
    settle().await;
    assert!(!projector.status().online);

    transport.fail_connects(false);
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert!(transport.is_connected());

    projector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_list_input_ports_and_names() {
    let (projector, _transport) = session(RGB);
    let ports = projector.list_input_ports();
    assert_eq!(ports.len(), 11);
    assert_eq!(projector.input_names()[0], ports[0].display_name);
}

#[tokio::test(start_paused = true)]
async fn test_status_serializes() {
    let (projector, _transport) = session(RGB);
    projector.handle_frame("(PWR!1)");

    let json = serde_json::to_value(projector.status()).unwrap();
    assert_eq!(json["key"], "proj-1");
    assert_eq!(json["model"], "christie_4k25_rgb");
    assert_eq!(json["power_on"], true);
    assert_eq!(json["communication"], "ok");
    assert_eq!(json["online"], true);

    let event = serde_json::to_value(ProjectorEvent::Power { on: true }).unwrap();
    assert_eq!(event["event"], "power");
}
