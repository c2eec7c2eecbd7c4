use std::sync::Arc;
use std::time::Duration;

use pinctl::{
    AppConfig, AppError, Command, CommandDispatcher, Direction, InputState, Level,
    MockGpioBackend, Outcome, OutputState, PinRegistry, SharedBackend, StatusEvent, parse_state,
    shutdown,
};
use tokio::sync::mpsc;
use tokio::time;

const SENSOR: &str = r#"{"name": "S", "pin": 18, "direction": "in", "pull": "up", "active_low": true}"#;
const RELAY: &str = r#"{"name": "R", "pin": 23, "direction": "out", "active_high": true}"#;

fn dispatcher_for(pins: &[&str]) -> (CommandDispatcher, Arc<MockGpioBackend>) {
    let json = format!(r#"{{"pins": [{}]}}"#, pins.join(","));
    let config = AppConfig::from_json(&json).expect("valid sample config");
    let registry = Arc::new(PinRegistry::from_config(&config).expect("valid registry"));
    let mock = Arc::new(MockGpioBackend::default());
    let backend: SharedBackend = mock.clone();
    (
        CommandDispatcher::new(registry, backend, config.defaults.clone()),
        mock,
    )
}

fn sample_dispatcher() -> (CommandDispatcher, Arc<MockGpioBackend>) {
    dispatcher_for(&[SENSOR, RELAY])
}

async fn run(
    dispatcher: &CommandDispatcher,
    command: Command,
) -> (Result<Outcome, AppError>, Vec<StatusEvent>) {
    let (_trigger, shutdown) = shutdown::channel();
    let (tx, mut rx) = mpsc::unbounded_channel::<StatusEvent>();
    let result = dispatcher.execute(command, shutdown, &tx).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (result, events)
}

fn set(pin: &str, state: &str) -> Command {
    Command::Set {
        pin: pin.to_string(),
        state: state.to_string(),
    }
}

fn output_states(events: &[StatusEvent]) -> Vec<OutputState> {
    events
        .iter()
        .filter_map(|e| match e {
            StatusEvent::Output { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn list_does_not_touch_driver() {
    let (dispatcher, mock) = sample_dispatcher();
    let (result, events) = run(&dispatcher, Command::List).await;
    assert_eq!(result.unwrap(), Outcome::Completed);
    assert!(mock.journal().is_empty());

    let listed: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            StatusEvent::Pin(d) => Some(d.name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(listed, ["S", "R"]);
    assert!(!events.iter().any(|e| matches!(e, StatusEvent::Released)));
}

#[tokio::test]
async fn set_on_drives_active_high_relay_high() {
    let (dispatcher, mock) = sample_dispatcher();
    let (result, events) = run(&dispatcher, set("R", "on")).await;
    assert_eq!(result.unwrap(), Outcome::Completed);

    // the trailing LOW is the release switching the relay off
    assert_eq!(mock.writes(23), [Level::High, Level::Low]);
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Confirmed {
            state: OutputState::On,
            level: Level::High,
            ..
        }
    )));
    assert_eq!(mock.reset_count(), 1);
    assert!(matches!(events.last(), Some(StatusEvent::Released)));
}

#[tokio::test]
async fn set_spellings_produce_identical_output() {
    for state in ["HIGH", "1", "true", "On", " on "] {
        let (dispatcher, mock) = sample_dispatcher();
        let (result, _) = run(&dispatcher, set("R", state)).await;
        assert!(result.is_ok(), "state {state:?} rejected");
        assert_eq!(mock.writes(23).first(), Some(&Level::High), "state {state:?}");
    }
    for state in ["off", "LOW", "0", "False"] {
        let (dispatcher, mock) = sample_dispatcher();
        let (result, _) = run(&dispatcher, set("R", state)).await;
        assert!(result.is_ok(), "state {state:?} rejected");
        assert_eq!(mock.writes(23).first(), Some(&Level::Low), "state {state:?}");
    }
}

#[tokio::test]
async fn set_on_active_low_relay_drives_low() {
    let (dispatcher, mock) = dispatcher_for(&[
        r#"{"name": "VALVE", "pin": 7, "direction": "out", "active_high": false}"#,
    ]);
    let (result, _) = run(&dispatcher, set("VALVE", "on")).await;
    assert!(result.is_ok());
    assert_eq!(mock.writes(7), [Level::Low, Level::High]);
}

#[tokio::test]
async fn set_rejects_unknown_state_and_still_releases() {
    let (dispatcher, mock) = sample_dispatcher();
    let (result, events) = run(&dispatcher, set("R", "maybe")).await;
    assert!(matches!(result, Err(AppError::InvalidValue(_))));
    assert_eq!(mock.reset_count(), 1);
    assert!(matches!(events.last(), Some(StatusEvent::Released)));
}

#[test]
fn parse_state_accepts_documented_spellings() {
    for raw in ["on", "ON", "high", "1", "true", "TRUE"] {
        assert!(parse_state(raw).unwrap(), "{raw}");
    }
    for raw in ["off", "Off", "low", "0", "false"] {
        assert!(!parse_state(raw).unwrap(), "{raw}");
    }
    assert!(parse_state("2").is_err());
}

#[tokio::test]
async fn test_performs_exact_cycle_count() {
    let (dispatcher, mock) = sample_dispatcher();
    let command = Command::Test {
        pin: "R".to_string(),
        cycles: Some(3),
        delay: Some(Duration::ZERO),
    };
    let (result, events) = run(&dispatcher, command).await;
    assert_eq!(result.unwrap(), Outcome::Completed);

    use OutputState::{Off, On};
    assert_eq!(output_states(&events), [On, Off, On, Off, On, Off]);
    assert_eq!(
        mock.writes(23),
        [
            Level::High,
            Level::Low,
            Level::High,
            Level::Low,
            Level::High,
            Level::Low,
            Level::Low
        ]
    );
    assert_eq!(mock.reset_count(), 1);
}

#[tokio::test]
async fn test_numbers_cycles_from_one() {
    let (dispatcher, _mock) = sample_dispatcher();
    let command = Command::Test {
        pin: "R".to_string(),
        cycles: Some(2),
        delay: Some(Duration::ZERO),
    };
    let (_, events) = run(&dispatcher, command).await;
    let cycles: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            StatusEvent::Output { cycle, .. } => *cycle,
            _ => None,
        })
        .collect();
    assert_eq!(cycles, [1, 1, 2, 2]);
}

#[tokio::test]
async fn test_on_input_fails_with_wrong_direction() {
    let (dispatcher, mock) = sample_dispatcher();
    let command = Command::Test {
        pin: "S".to_string(),
        cycles: Some(3),
        delay: Some(Duration::ZERO),
    };
    let (result, events) = run(&dispatcher, command).await;
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        AppError::WrongDirection {
            direction: Direction::Input,
            hint: "watch",
            ..
        }
    ));
    assert_eq!(err.to_string(), "S is INPUT, use watch instead");
    // only the release switching R off
    assert_eq!(mock.writes(23), [Level::Low]);
    assert_eq!(mock.reset_count(), 1);
    assert!(matches!(events.last(), Some(StatusEvent::Released)));
}

#[tokio::test]
async fn set_on_input_fails_with_wrong_direction() {
    let (dispatcher, mock) = sample_dispatcher();
    let (result, _) = run(&dispatcher, set("S", "on")).await;
    assert!(matches!(result, Err(AppError::WrongDirection { .. })));
    assert_eq!(mock.reset_count(), 1);
}

#[tokio::test]
async fn unknown_pin_aborts_cleanly() {
    let (dispatcher, mock) = sample_dispatcher();
    let (result, _) = run(&dispatcher, set("NOPE", "on")).await;
    assert!(matches!(result, Err(AppError::UnknownPin(ref name)) if name == "NOPE"));
    assert_eq!(mock.writes(23), [Level::Low]);
    assert_eq!(mock.reset_count(), 1);
}

#[tokio::test]
async fn driver_fault_still_releases() {
    let (dispatcher, mock) = sample_dispatcher();
    mock.fail_writes(23);
    let command = Command::Test {
        pin: "R".to_string(),
        cycles: Some(3),
        delay: Some(Duration::ZERO),
    };
    let (result, events) = run(&dispatcher, command).await;
    assert!(matches!(result, Err(AppError::Driver(_))));
    assert_eq!(mock.reset_count(), 1);
    assert!(matches!(events.last(), Some(StatusEvent::Released)));
}

#[tokio::test]
async fn cycle_without_outputs_warns_and_writes_nothing() {
    let (dispatcher, mock) = dispatcher_for(&[SENSOR]);
    let command = Command::Cycle {
        delay: Some(Duration::ZERO),
    };
    let (result, events) = run(&dispatcher, command).await;
    assert!(matches!(result, Err(AppError::EmptyDeviceSet)));
    assert_eq!(mock.write_count(), 0);
    assert_eq!(mock.reset_count(), 1);
    assert!(events.iter().any(|e| matches!(e, StatusEvent::Warning(_))));
}

#[tokio::test(start_paused = true)]
async fn cycle_interrupted_during_hold_releases_once() {
    let (dispatcher, mock) = dispatcher_for(&[
        SENSOR,
        RELAY,
        r#"{"name": "LED", "pin": 24, "direction": "out"}"#,
    ]);
    let (trigger, shutdown) = shutdown::channel();
    let (tx, mut rx) = mpsc::unbounded_channel::<StatusEvent>();

    let interrupt = tokio::spawn(async move {
        time::sleep(Duration::from_millis(2500)).await;
        trigger.trigger();
    });

    let command = Command::Cycle {
        delay: Some(Duration::from_secs(1)),
    };
    let outcome = dispatcher.execute(command, shutdown, &tx).await.unwrap();
    interrupt.await.unwrap();
    assert_eq!(outcome, Outcome::Cancelled);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    // R on, R off, LED on, then the interrupt lands in the LED hold
    let switched: Vec<(String, OutputState)> = events
        .iter()
        .filter_map(|e| match e {
            StatusEvent::Output { device, state, .. } => Some((device.clone(), *state)),
            _ => None,
        })
        .collect();
    assert_eq!(
        switched,
        [
            ("R".to_string(), OutputState::On),
            ("R".to_string(), OutputState::Off),
            ("LED".to_string(), OutputState::On),
        ]
    );
    assert!(events.iter().any(|e| matches!(e, StatusEvent::Interrupted)));
    assert!(matches!(events.last(), Some(StatusEvent::Released)));
    assert_eq!(mock.reset_count(), 1);
    // release leaves every output logically off
    assert_eq!(mock.writes(24).last(), Some(&Level::Low));
    assert_eq!(mock.writes(23).last(), Some(&Level::Low));
}

#[tokio::test(start_paused = true)]
async fn watch_reports_sensor_activation() {
    let (dispatcher, mock) = sample_dispatcher();
    let stimulus = mock.clone();
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(100)).await;
        for level in [Level::Low, Level::High, Level::Low] {
            stimulus.set_input_level(18, level).unwrap();
        }
    });

    let command = Command::Watch {
        pin: "S".to_string(),
        duration: Some(Duration::from_secs(1)),
        debounce: Some(Duration::from_millis(50)),
    };
    let (result, events) = run(&dispatcher, command).await;
    assert_eq!(result.unwrap(), Outcome::Expired);

    let edges: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StatusEvent::Edge(edge) => Some(edge),
            _ => None,
        })
        .collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].device, "S");
    assert_eq!(edges[0].raw_level, Level::Low);
    assert_eq!(edges[0].logical_state, InputState::Active);
    assert!(events.iter().any(|e| matches!(
        e,
        StatusEvent::Info(msg) if msg == "Done watching input."
    )));
    assert!(matches!(events.last(), Some(StatusEvent::Released)));
    assert_eq!(mock.reset_count(), 1);
}

#[tokio::test]
async fn watch_on_output_fails_with_wrong_direction() {
    let (dispatcher, mock) = sample_dispatcher();
    let command = Command::Watch {
        pin: "R".to_string(),
        duration: Some(Duration::from_secs(1)),
        debounce: None,
    };
    let (result, _) = run(&dispatcher, command).await;
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "R is OUTPUT, use test or set instead");
    assert_eq!(mock.reset_count(), 1);
}

#[test]
fn status_lines_read_like_the_console_output() {
    let line = StatusEvent::Output {
        device: "R".to_string(),
        pin_id: 23,
        state: OutputState::On,
        cycle: Some(2),
    };
    assert_eq!(line.to_string(), "[CYCLE 2] R (GPIO 23) -> ON");
    assert_eq!(StatusEvent::Released.to_string(), "[CLEANUP] GPIO reset.");
}
