use std::sync::{Arc, Mutex};
use std::time::Duration;

use operant_core::AudioDriver;
use operant_core::channel::ChannelAddress;
use operant_core::clock::Clock;
use operant_core::config::{ExpectedResponse, SessionConfig};
use operant_core::sim::{SimAudio, SimClock, SimDio};
use operant_panel::builder::{build_panel, standard_registry};

use crate::consequence::{
    Consequence, ConsequencePolicy, ContinuousReinforcement, FixedRatioReinforcement,
};
use crate::engine::{SessionError, TrialPhase};
use crate::record::MemorySink;
use crate::scoring::{
    GoNoGoScoring, ObservedResponse, Outcome, ScoringPolicy, TwoAltChoiceScoring,
};
use crate::session::{SessionRunner, StopHandle};

fn addr(line: u16) -> ChannelAddress {
    ChannelAddress::new("sim", line)
}

const SOLENOID: u16 = 10;
const HOPPER_IR: u16 = 11;
const KEY_IR: u16 = 4;
const KEY_LED: u16 = 8;
const MAIN_LIGHT: u16 = 9;

fn peck(latency_ms: u64) -> ObservedResponse {
    ObservedResponse::Peck {
        role: "peck_key".to_string(),
        latency: Duration::from_millis(latency_ms),
    }
}

// --- scoring decision tables -----------------------------------------------

#[test]
fn go_no_go_table_is_deterministic() {
    let scoring = GoNoGoScoring;
    let table = [
        (ExpectedResponse::Reward, peck(120), Outcome::Hit),
        (ExpectedResponse::Reward, ObservedResponse::Timeout, Outcome::NoResponse),
        (ExpectedResponse::NoReward, peck(120), Outcome::FalseAlarm),
        (
            ExpectedResponse::NoReward,
            ObservedResponse::Timeout,
            Outcome::CorrectRejection,
        ),
        (ExpectedResponse::Neutral, peck(120), Outcome::FalseAlarm),
        (
            ExpectedResponse::Neutral,
            ObservedResponse::Timeout,
            Outcome::CorrectRejection,
        ),
    ];
    for (expected, observed, want) in table {
        assert_eq!(scoring.score(expected, &observed), want);
        // Same pair, same verdict, every time.
        assert_eq!(scoring.score(expected, &observed), want);
    }
}

#[test]
fn two_alt_choice_maps_sides_to_outcomes() {
    let scoring = TwoAltChoiceScoring {
        reward_role: "left_key".to_string(),
        noreward_role: "right_key".to_string(),
    };
    let left = ObservedResponse::Peck {
        role: "left_key".to_string(),
        latency: Duration::from_millis(80),
    };
    let right = ObservedResponse::Peck {
        role: "right_key".to_string(),
        latency: Duration::from_millis(80),
    };

    assert_eq!(scoring.score(ExpectedResponse::Reward, &left), Outcome::Hit);
    assert_eq!(scoring.score(ExpectedResponse::Reward, &right), Outcome::Miss);
    assert_eq!(
        scoring.score(ExpectedResponse::NoReward, &right),
        Outcome::CorrectRejection
    );
    assert_eq!(
        scoring.score(ExpectedResponse::NoReward, &left),
        Outcome::FalseAlarm
    );
    assert_eq!(
        scoring.score(ExpectedResponse::Reward, &ObservedResponse::Timeout),
        Outcome::NoResponse
    );
}

// --- reinforcement policies ------------------------------------------------

#[test]
fn continuous_reinforcement_honors_condition_flags() {
    let mut policy = ContinuousReinforcement;

    assert_eq!(policy.consequence(Outcome::Hit, true, true), Consequence::Reward);
    assert_eq!(policy.consequence(Outcome::FalseAlarm, true, true), Consequence::Punish);
    assert_eq!(policy.consequence(Outcome::Miss, true, true), Consequence::Punish);
    assert_eq!(policy.consequence(Outcome::CorrectRejection, true, true), Consequence::None);
    assert_eq!(policy.consequence(Outcome::NoResponse, true, true), Consequence::None);

    // Probe conditions: scored, never consequated.
    assert_eq!(policy.consequence(Outcome::Hit, false, false), Consequence::None);
    assert_eq!(policy.consequence(Outcome::FalseAlarm, false, false), Consequence::None);
}

#[test]
fn fixed_ratio_rewards_every_nth_hit() {
    let mut policy = FixedRatioReinforcement::new(2);

    assert_eq!(policy.consequence(Outcome::Hit, true, true), Consequence::None);
    assert_eq!(policy.consequence(Outcome::Hit, true, true), Consequence::Reward);
    assert_eq!(policy.consequence(Outcome::Hit, true, true), Consequence::None);
    assert_eq!(policy.consequence(Outcome::Hit, true, true), Consequence::Reward);
    // Punishment stays continuous.
    assert_eq!(policy.consequence(Outcome::FalseAlarm, true, true), Consequence::Punish);
}

// --- full-session harness --------------------------------------------------

fn session_config(blocks: serde_json::Value) -> SessionConfig {
    serde_json::from_value(serde_json::json!({
        "panel": {
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
                {"role": "speaker", "kind": "speaker"}
            ]
        },
        "subject": "b1083",
        "rng_seed": 7,
        "blocks": blocks
    }))
    .unwrap()
}

struct Harness {
    dio: Arc<SimDio>,
    audio: Arc<SimAudio>,
    clock: Arc<SimClock>,
    runner: SessionRunner<MemorySink>,
}

fn harness(config: SessionConfig) -> Harness {
    harness_with_audio(config, Arc::new(SimAudio::new()))
}

fn harness_with_audio(config: SessionConfig, audio: Arc<SimAudio>) -> Harness {
    let dio = Arc::new(SimDio::new());
    let clock = Arc::new(SimClock::new());
    let registry = standard_registry(
        dio.clone(),
        audio.clone(),
        clock.clone(),
        &config.timeouts,
    );
    let panel = build_panel(&config.panel, &registry).unwrap();
    let runner = SessionRunner::new(
        panel,
        config,
        Box::new(GoNoGoScoring),
        Box::new(ContinuousReinforcement),
        MemorySink::new(),
        clock.clone(),
    );
    Harness {
        dio,
        audio,
        clock,
        runner,
    }
}

fn capped_two_condition_block() -> serde_json::Value {
    serde_json::json!([{
        "conditions": [
            {"name": "reward", "weight": 0.8, "max_items": 2, "stimuli": [
                {"path": "go1.wav", "label": "reward", "duration_ms": 1000},
                {"path": "go2.wav", "label": "reward", "duration_ms": 1000}
            ]},
            {"name": "nonreward", "weight": 0.2, "max_items": 2, "stimuli": [
                {"path": "nogo1.wav", "label": "no_reward", "duration_ms": 1000},
                {"path": "nogo2.wav", "label": "no_reward", "duration_ms": 1000}
            ]}
        ]
    }])
}

#[test]
fn silent_subject_times_out_every_trial() {
    let mut h = harness(session_config(capped_two_condition_block()));

    let summary = h.runner.run().unwrap();

    assert_eq!(summary.trials, 4);
    assert_eq!(summary.blocks_completed, 1);
    assert!(!summary.stopped);

    let records = &h.runner.sink().records;
    assert_eq!(records.len(), 4);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.index, i as u64 + 1);
        assert_eq!(record.response, ObservedResponse::Timeout);
        assert!(!record.fault);
        assert_eq!(record.consequence, Consequence::None);
        match record.expected {
            ExpectedResponse::Reward => assert_eq!(record.outcome, Outcome::NoResponse),
            _ => assert_eq!(record.outcome, Outcome::CorrectRejection),
        }
    }
    let reward_trials = records.iter().filter(|r| r.condition == "reward").count();
    assert_eq!(reward_trials, 2);
    // Every presentation reached the speaker.
    assert_eq!(h.audio.played().len(), 4);
}

#[test]
fn peck_on_reward_stimulus_feeds_the_hopper() {
    let config = session_config(serde_json::json!([{
        "conditions": [
            {"name": "reward", "max_items": 1, "stimuli": [
                {"path": "go1.wav", "label": "reward", "duration_ms": 1000, "gain_db": -3.0}
            ]}
        ]
    }]));
    let mut h = harness(config);
    h.dio.follow(addr(HOPPER_IR), addr(SOLENOID), 1);
    h.dio.pulse_after(addr(KEY_IR), 0, 5);

    let summary = h.runner.run().unwrap();

    assert_eq!(summary.trials, 1);
    let record = &h.runner.sink().records[0];
    assert_eq!(record.outcome, Outcome::Hit);
    assert_eq!(record.consequence, Consequence::Reward);
    assert!(!record.fault);
    assert!(record.latency_ms.is_some());

    // Stimulus reached the speaker with the condition's attenuation, and the
    // peck interrupted playback.
    assert_eq!(h.audio.played(), vec![("go1.wav".to_string(), -3.0)]);
    assert!(!h.audio.is_playing());
    // The hopper finished back down.
    assert!(!h.dio.output_value(&addr(SOLENOID)));
}

#[test]
fn peck_on_no_reward_stimulus_darkens_the_box() {
    let config = session_config(serde_json::json!([{
        "conditions": [
            {"name": "nonreward", "max_items": 1, "stimuli": [
                {"path": "nogo1.wav", "label": "no_reward", "duration_ms": 1000}
            ]}
        ]
    }]));
    let mut h = harness(config);
    h.dio.pulse_after(addr(KEY_IR), 0, 5);

    h.runner.run().unwrap();

    let record = &h.runner.sink().records[0];
    assert_eq!(record.outcome, Outcome::FalseAlarm);
    assert_eq!(record.consequence, Consequence::Punish);
    // Punishment is over and the session reset the panel: lights back on.
    assert!(h.dio.output_value(&addr(MAIN_LIGHT)));
    // The dark period actually elapsed on the clock.
    assert!(h.clock.elapsed() >= Duration::from_secs(10));
}

#[test]
fn neutral_probe_trials_are_never_consequated() {
    let config = session_config(serde_json::json!([{
        "conditions": [
            {"name": "probe", "max_items": 1, "is_rewarded": false, "is_punished": false,
             "stimuli": [{"path": "probe1.wav", "label": "neutral", "duration_ms": 1000}]}
        ]
    }]));
    let mut h = harness(config);
    h.dio.pulse_after(addr(KEY_IR), 0, 5);

    h.runner.run().unwrap();

    let record = &h.runner.sink().records[0];
    assert_eq!(record.outcome, Outcome::FalseAlarm);
    assert_eq!(record.consequence, Consequence::None);
}

#[test]
fn jammed_hopper_is_contained_and_trials_keep_logging() {
    let config = session_config(serde_json::json!([{
        "conditions": [
            {"name": "reward", "max_items": 2, "stimuli": [
                {"path": "go1.wav", "label": "reward", "duration_ms": 1000},
                {"path": "go2.wav", "label": "reward", "duration_ms": 1000}
            ]}
        ]
    }]));
    let mut h = harness(config);
    // Sensor never follows the solenoid; every feed jams. Budget default 3
    // tolerates both trials.
    h.dio.set_input(addr(HOPPER_IR), false);
    h.dio.pulse_after(addr(KEY_IR), 0, 200);

    let summary = h.runner.run().unwrap();

    assert_eq!(summary.trials, 2);
    let records = &h.runner.sink().records;
    assert_eq!(records.len(), 2);
    for record in records {
        assert_eq!(record.outcome, Outcome::Hit);
        assert_eq!(record.consequence, Consequence::Reward);
        assert!(record.fault, "hopper jam must flag the trial");
    }
    // The engine is back at idle, not wedged mid-machine.
    assert_eq!(h.runner.engine().phase(), TrialPhase::Idle);
}

#[test]
fn fault_budget_exhaustion_aborts_with_panel_safe_and_records_kept() {
    let mut config = session_config(serde_json::json!([{
        "conditions": [
            {"name": "reward", "max_items": 4, "stimuli": [
                {"path": "go1.wav", "label": "reward", "duration_ms": 1000},
                {"path": "go2.wav", "label": "reward", "duration_ms": 1000}
            ]}
        ]
    }]));
    config.fault_retry_budget = 1;
    let mut h = harness(config);
    h.dio.set_input(addr(HOPPER_IR), false);
    h.dio.pulse_after(addr(KEY_IR), 0, 400);

    let err = h.runner.run().unwrap_err();

    assert!(matches!(
        err,
        SessionError::FaultBudgetExhausted { recoveries: 2 }
    ));
    // Both fault-affected trials were persisted before the abort.
    assert_eq!(h.runner.sink().records.len(), 2);
    // Abort leaves the panel in its safe reset state.
    assert!(h.dio.output_value(&addr(MAIN_LIGHT)));
    assert!(!h.dio.output_value(&addr(SOLENOID)));
}

/// Clock that fires a stop request after a fixed number of sleeps, to land a
/// cancellation inside the response wait.
struct TriggerClock {
    inner: SimClock,
    stop: Mutex<Option<StopHandle>>,
    sleeps_left: Mutex<u32>,
}

impl TriggerClock {
    fn new(after_sleeps: u32) -> Self {
        Self {
            inner: SimClock::new(),
            stop: Mutex::new(None),
            sleeps_left: Mutex::new(after_sleeps),
        }
    }

    fn arm(&self, handle: StopHandle) {
        *self.stop.lock().unwrap() = Some(handle);
    }
}

impl Clock for TriggerClock {
    fn elapsed(&self) -> Duration {
        self.inner.elapsed()
    }

    fn sleep(&self, dur: Duration) {
        self.inner.sleep(dur);
        let mut left = self.sleeps_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            if *left == 0 {
                if let Some(stop) = self.stop.lock().unwrap().as_ref() {
                    stop.request_stop();
                }
            }
        }
    }
}

#[test]
fn stop_request_interrupts_the_response_wait() {
    let config = session_config(serde_json::json!([{
        "conditions": [
            {"name": "reward", "stimuli": [
                {"path": "go1.wav", "label": "reward", "duration_ms": 1000}
            ]}
        ]
    }]));
    let dio = Arc::new(SimDio::new());
    let audio = Arc::new(SimAudio::new());
    let clock = Arc::new(TriggerClock::new(10));
    let registry = standard_registry(dio.clone(), audio.clone(), clock.clone(), &config.timeouts);
    let panel = build_panel(&config.panel, &registry).unwrap();
    let mut runner = SessionRunner::new(
        panel,
        config,
        Box::new(GoNoGoScoring),
        Box::new(ContinuousReinforcement),
        MemorySink::new(),
        clock.clone(),
    );
    clock.arm(runner.stop_handle());

    let summary = runner.run().unwrap();

    // The wait was cut short, scored as no-response, logged, and the loop
    // stopped at the next boundary.
    assert!(summary.stopped);
    assert_eq!(summary.trials, 1);
    assert_eq!(runner.sink().records.len(), 1);
    assert_eq!(runner.sink().records[0].outcome, Outcome::NoResponse);
    // Well short of the 5 s response timeout.
    assert!(clock.elapsed() < Duration::from_secs(2));
}

#[test]
fn malformed_block_refuses_before_any_trial() {
    let config = session_config(serde_json::json!([{
        "conditions": [
            {"name": "reward", "weight": -1.0, "stimuli": [
                {"path": "go1.wav", "label": "reward", "duration_ms": 1000}
            ]}
        ]
    }]));
    let mut h = harness(config);

    let err = h.runner.run().unwrap_err();

    assert!(matches!(err, SessionError::Queue(_)));
    assert!(h.runner.sink().records.is_empty());
}

#[test]
fn unavailable_audio_marks_the_trial_faulted() {
    let config = session_config(serde_json::json!([{
        "conditions": [
            {"name": "reward", "max_items": 1, "stimuli": [
                {"path": "go1.wav", "label": "reward", "duration_ms": 1000}
            ]}
        ]
    }]));
    let mut h = harness_with_audio(config, Arc::new(SimAudio::unavailable()));
    h.dio.pulse_after(addr(KEY_IR), 0, 5);

    let summary = h.runner.run().unwrap();

    assert_eq!(summary.trials, 1);
    let record = &h.runner.sink().records[0];
    assert!(record.fault);
    // Fault-affected trials are excluded from consequation.
    assert_eq!(record.consequence, Consequence::None);
}

#[test]
fn seeded_sessions_replay_identical_condition_sequences() {
    let blocks = serde_json::json!([{
        "conditions": [
            {"name": "reward", "weight": 0.6, "max_items": 3, "stimuli": [
                {"path": "go1.wav", "label": "reward", "duration_ms": 1000},
                {"path": "go2.wav", "label": "reward", "duration_ms": 1000}
            ]},
            {"name": "nonreward", "weight": 0.4, "max_items": 3, "stimuli": [
                {"path": "nogo1.wav", "label": "no_reward", "duration_ms": 1000}
            ]}
        ]
    }]);
    let run_once = || {
        let mut h = harness(session_config(blocks.clone()));
        h.runner.run().unwrap();
        h.runner
            .sink()
            .records
            .iter()
            .map(|r| (r.condition.clone(), r.stimulus.clone()))
            .collect::<Vec<_>>()
    };

    let first = run_once();
    let second = run_once();
    assert_eq!(first.len(), 6);
    assert_eq!(first, second);
}

#[test]
fn multiple_blocks_run_in_sequence() {
    let config = session_config(serde_json::json!([
        {"max_trials": 2, "conditions": [
            {"name": "reward", "stimuli": [
                {"path": "go1.wav", "label": "reward", "duration_ms": 1000}
            ]}
        ]},
        {"max_trials": 2, "conditions": [
            {"name": "nonreward", "stimuli": [
                {"path": "nogo1.wav", "label": "no_reward", "duration_ms": 1000}
            ]}
        ]}
    ]));
    let mut h = harness(config);

    let summary = h.runner.run().unwrap();

    assert_eq!(summary.blocks_completed, 2);
    assert_eq!(summary.trials, 4);
    let conditions: Vec<_> = h
        .runner
        .sink()
        .records
        .iter()
        .map(|r| r.condition.as_str())
        .collect();
    assert_eq!(conditions, vec!["reward", "reward", "nonreward", "nonreward"]);
    // Block indices recorded per trial.
    assert_eq!(h.runner.sink().records[3].block_index, 1);
}
