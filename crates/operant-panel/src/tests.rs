use std::sync::Arc;
use std::time::Duration;

use operant_core::channel::ChannelAddress;
use operant_core::config::{PanelConfig, TimeoutConfig};
use operant_core::fault::ComponentFault;
use operant_core::sim::{SimAudio, SimClock, SimDio};

use crate::builder::{build_panel, standard_registry};
use crate::hopper::HopperState;
use crate::panel::{Panel, PanelError};

fn addr(line: u16) -> ChannelAddress {
    ChannelAddress::new("sim", line)
}

const SOLENOID: u16 = 10;
const HOPPER_IR: u16 = 11;
const KEY_IR: u16 = 4;
const KEY_LED: u16 = 8;
const MAIN_LIGHT: u16 = 9;

fn panel_config() -> PanelConfig {
    serde_json::from_value(serde_json::json!({
        "id": "box5",
        "components": [
            {"role": "hopper", "kind": "hopper", "channels": {
                "solenoid": {"device": "sim", "line": SOLENOID},
                "ir_beam": {"device": "sim", "line": HOPPER_IR}
            }},
            {"role": "peck_key", "kind": "peck_port", "channels": {
                "ir_beam": {"device": "sim", "line": KEY_IR},
                "led": {"device": "sim", "line": KEY_LED}
            }},
            {"role": "house_light", "kind": "house_light", "channels": {
                "light": {"device": "sim", "line": MAIN_LIGHT}
            }},
            {"role": "cue", "kind": "cue_light", "channels": {
                "red": {"device": "sim", "line": 12},
                "green": {"device": "sim", "line": 13},
                "blue": {"device": "sim", "line": 14}
            }},
            {"role": "speaker", "kind": "speaker"}
        ]
    }))
    .unwrap()
}

struct Bench {
    dio: Arc<SimDio>,
    #[allow(dead_code)]
    audio: Arc<SimAudio>,
    panel: Panel,
}

fn bench() -> Bench {
    let dio = Arc::new(SimDio::new());
    let audio = Arc::new(SimAudio::new());
    let clock = Arc::new(SimClock::new());
    let registry = standard_registry(
        dio.clone(),
        audio.clone(),
        clock.clone(),
        &TimeoutConfig::default(),
    );
    let panel = build_panel(&panel_config(), &registry).unwrap();
    Bench { dio, audio, panel }
}

#[test]
fn hopper_feed_happy_path() {
    let mut b = bench();
    // Position sensor tracks the solenoid with one read of settle lag.
    b.dio.follow(addr(HOPPER_IR), addr(SOLENOID), 1);

    let hopper = b.panel.hopper("hopper").unwrap();
    let summary = hopper.feed(Duration::from_secs(2)).unwrap();

    assert_eq!(hopper.state(), HopperState::Down);
    assert!(summary.raised_for >= summary.commanded);
    assert!(!b.dio.output_value(&addr(SOLENOID)));
}

#[test]
fn hopper_jam_raises_actuation_mismatch_and_latches_fault() {
    let mut b = bench();
    // Sensor never follows the solenoid: mechanical jam.
    b.dio.set_input(addr(HOPPER_IR), false);

    let hopper = b.panel.hopper("hopper").unwrap();
    let fault = hopper.feed(Duration::from_secs(2)).unwrap_err();

    assert!(matches!(
        fault,
        ComponentFault::ActuationMismatch {
            commanded: true,
            ..
        }
    ));
    assert_eq!(hopper.state(), HopperState::Fault);

    // Fault is latched: further feeds abort before acting.
    assert!(matches!(
        hopper.feed(Duration::from_secs(2)),
        Err(ComponentFault::PrecheckFailed { .. })
    ));

    // Explicit reset recovers once the sensor agrees the hopper is down.
    hopper.reset().unwrap();
    assert_eq!(hopper.state(), HopperState::Down);
}

#[test]
fn hopper_precheck_failure_does_not_transition() {
    let mut b = bench();
    // Beam already broken: hopper sitting raised before anyone commanded it.
    b.dio.set_input(addr(HOPPER_IR), true);

    let hopper = b.panel.hopper("hopper").unwrap();
    let fault = hopper.feed(Duration::from_secs(1)).unwrap_err();

    assert!(matches!(fault, ComponentFault::PrecheckFailed { .. }));
    assert_eq!(hopper.state(), HopperState::Down);
}

#[test]
fn hopper_dropping_mid_hold_faults() {
    let mut b = bench();
    // Sensor confirms the raise, then drops out mid-hold.
    b.dio.pulse_after(addr(HOPPER_IR), 2, 5);

    let hopper = b.panel.hopper("hopper").unwrap();
    let fault = hopper.feed(Duration::from_secs(2)).unwrap_err();

    assert!(matches!(
        fault,
        ComponentFault::ActuationMismatch {
            commanded: true,
            sensed: false,
            ..
        }
    ));
    assert_eq!(hopper.state(), HopperState::Fault);
    // The safety lower was still commanded.
    assert!(!b.dio.output_value(&addr(SOLENOID)));
}

#[test]
fn panel_reset_is_best_effort_and_aggregates_faults() {
    let mut b = bench();
    b.dio.follow(addr(HOPPER_IR), addr(SOLENOID), 1);
    b.dio.make_unavailable(addr(MAIN_LIGHT));

    let report = b.panel.reset();

    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults[0].0, "house_light");
    // The hopper after the faulted light was still driven safe.
    assert_eq!(
        b.panel.hopper("hopper").unwrap().state(),
        HopperState::Down
    );
    // Fatal fault takes the component out of service.
    assert!(matches!(
        b.panel.house_light("house_light"),
        Err(PanelError::ComponentUnusable { .. })
    ));
}

#[test]
fn self_test_reports_every_component() {
    let mut b = bench();
    // Hopper jammed, everything else healthy.
    b.dio.set_input(addr(HOPPER_IR), false);

    let entries = b.panel.self_test();

    assert_eq!(entries.len(), 5);
    let hopper_entry = entries.iter().find(|e| e.role == "hopper").unwrap();
    assert!(!hopper_entry.passed);
    assert!(hopper_entry.fault.as_deref().unwrap().contains("sensor"));
    assert!(entries.iter().filter(|e| e.passed).count() >= 4);
}

#[test]
fn ready_and_idle_drive_the_key_light() {
    let mut b = bench();

    b.panel.ready().unwrap();
    assert!(b.dio.output_value(&addr(KEY_LED)));

    b.panel.idle().unwrap();
    assert!(!b.dio.output_value(&addr(KEY_LED)));
}

#[test]
fn sleep_darkens_the_box() {
    let mut b = bench();
    b.dio.follow(addr(HOPPER_IR), addr(SOLENOID), 1);
    b.panel.reset();
    assert!(b.dio.output_value(&addr(MAIN_LIGHT)));

    let report = b.panel.sleep();
    assert!(report.is_clean());
    assert!(!b.dio.output_value(&addr(MAIN_LIGHT)));
}

#[test]
fn role_addressing_is_typed() {
    let mut b = bench();

    assert!(matches!(
        b.panel.hopper("house_light"),
        Err(PanelError::RoleKindMismatch { .. })
    ));
    assert!(matches!(
        b.panel.hopper("no_such_role"),
        Err(PanelError::UnknownRole { .. })
    ));
}

#[test]
fn unknown_component_kind_is_refused_at_load() {
    let dio = Arc::new(SimDio::new());
    let audio = Arc::new(SimAudio::new());
    let clock = Arc::new(SimClock::new());
    let registry = standard_registry(
        dio.clone(),
        audio.clone(),
        clock,
        &TimeoutConfig::default(),
    );

    let config: PanelConfig = serde_json::from_value(serde_json::json!({
        "id": "box9",
        "components": [{"role": "zapper", "kind": "laser"}]
    }))
    .unwrap();

    let err = build_panel(&config, &registry).unwrap_err();
    assert!(err.to_string().contains("unknown kind"));
}
