use std::io::ErrorKind;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tiltcontrol::connection::{ConnectionState, ConnectionSupervisor, RetryEveryTicks};
use tiltcontrol::mapping::{
    AxisSelector, ChannelState, ControlSignal, MappingConfig, OrientationMapper, SignalConditioner,
    WIRE_ORDER,
};
use tiltcontrol::pipeline::{
    Pipeline, PipelineError, PipelineHandle, Running, TickInput, TickOutcome,
};
use tiltcontrol::sensor::{self, ParseError};
use tiltcontrol::serial::{ReaderSettings, ReplayConnector, ReplayEvent, ReplayTransport};

const DT: Duration = Duration::from_millis(16);

fn running(connector: ReplayConnector, config: MappingConfig) -> Pipeline<Running> {
    let supervisor = ConnectionSupervisor::new(Box::new(connector), ReaderSettings::default());
    Pipeline::create(config, supervisor).unwrap().initialize()
}

fn paddle_without_lag() -> MappingConfig {
    let mut config = MappingConfig::paddle();
    config.smoothing = tiltcontrol::mapping::SmoothingLaw::Exponential { factor: 0.0 };
    config
}

#[test]
fn identity_line_maps_to_output_midpoint() {
    let sample = sensor::parse("1,0,0,0").unwrap();
    let config = MappingConfig::paddle();

    let angle = OrientationMapper::new(config.component_map).to_angle(
        &sample,
        AxisSelector::Roll,
        false,
    );
    assert!(angle.abs() < 1e-6);

    let conditioner = SignalConditioner::from_config(&config);
    assert!(conditioner.target(angle).abs() < 1e-6);
}

#[test]
fn empty_line_keeps_signal_and_records_nothing() {
    let transport = ReplayTransport::new(
        "sensor",
        vec![ReplayEvent::line("1,0,0,0"), ReplayEvent::line("")],
    );
    let mut pipeline = running(ReplayConnector::single(transport), MappingConfig::paddle());

    let TickOutcome::Updated(signal) = pipeline.tick(TickInput::new(DT)) else {
        panic!("first frame should apply");
    };

    assert_eq!(
        pipeline.tick(TickInput::new(DT)),
        TickOutcome::ParseRejected(ParseError::Empty)
    );
    assert_eq!(*pipeline.signal(), signal);
    assert!(pipeline.diagnostics().last_parse_error.is_none());
    assert_eq!(pipeline.diagnostics().parse_failures, 0);
}

#[test]
fn malformed_frames_freeze_output() {
    // 30 degrees of roll with the MPU6050 mount: engine z comes from wire x
    let half = 15f32.to_radians();
    let tilted = format!("{},{},0,0", half.cos(), half.sin());
    let transport = ReplayTransport::new(
        "sensor",
        vec![
            ReplayEvent::line(&tilted),
            ReplayEvent::line("1,0,0"),
            ReplayEvent::line("1,0,zz,0"),
            ReplayEvent::Timeout,
        ],
    );
    let mut pipeline = running(ReplayConnector::single(transport), paddle_without_lag());

    match pipeline.tick(TickInput::new(DT)) {
        TickOutcome::Updated(ControlSignal::Single(channel)) => {
            assert!((channel.value - 8.0).abs() < 1e-3)
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let frozen = *pipeline.signal();

    assert!(matches!(
        pipeline.tick(TickInput::new(DT)),
        TickOutcome::ParseRejected(ParseError::Incomplete { fields: 3, .. })
    ));
    assert!(matches!(
        pipeline.tick(TickInput::new(DT)),
        TickOutcome::ParseRejected(ParseError::MalformedField { index: 2, .. })
    ));
    assert_eq!(pipeline.tick(TickInput::new(DT)), TickOutcome::Idle);

    assert_eq!(*pipeline.signal(), frozen);
    assert_eq!(pipeline.diagnostics().parse_failures, 2);
}

#[test]
fn paddle_keeps_easing_towards_target_without_new_frames() {
    let half = 15f32.to_radians();
    let tilted = format!("{},{},0,0", half.cos(), half.sin());
    let mut events = vec![ReplayEvent::line(&tilted)];
    events.extend(std::iter::repeat_with(|| ReplayEvent::Timeout).take(20));
    let transport = ReplayTransport::new("sensor", events);
    let mut pipeline = running(ReplayConnector::single(transport), MappingConfig::paddle());

    match pipeline.tick(TickInput::new(DT)) {
        TickOutcome::Updated(ControlSignal::Single(channel)) => {
            assert!((channel.value - 4.0).abs() < 1e-3);
            assert!((channel.target - 8.0).abs() < 1e-3);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    for _ in 0..20 {
        assert_eq!(pipeline.tick(TickInput::new(DT)), TickOutcome::Idle);
    }
    assert!((pipeline.signal().values().0 - 8.0).abs() < 1e-3);
    assert_eq!(pipeline.diagnostics().frames_applied, 1);
    assert_eq!(pipeline.diagnostics().idle_ticks, 20);
}

#[test]
fn maze_tilt_crosses_half_turn_along_short_arc() {
    let mut config = MappingConfig::maze();
    config.component_map = WIRE_ORDER;
    let about_z = |degrees: f32| {
        let half = (degrees / 2.0).to_radians();
        format!("{},0,0,{}", half.cos(), half.sin())
    };
    let transport = ReplayTransport::new(
        "sensor",
        vec![ReplayEvent::line(&about_z(179.0)), ReplayEvent::line(&about_z(-179.0))],
    );
    let mut pipeline = running(ReplayConnector::single(transport), config);

    // dt * speed = 1 lands on the target
    let TickOutcome::Updated(ControlSignal::Dual { second, .. }) =
        pipeline.tick(TickInput::new(Duration::from_millis(100)))
    else {
        panic!("first frame should apply");
    };
    assert!((second.value - 179.0).abs() < 1e-2);

    let TickOutcome::Updated(ControlSignal::Dual { first, second }) =
        pipeline.tick(TickInput::new(Duration::from_millis(50)))
    else {
        panic!("second frame should apply");
    };
    assert!(
        (second.value.abs() - 180.0).abs() < 1e-2,
        "roll went the long way: {}",
        second.value
    );
    assert!(first.value.abs() < 1e-2);
}

#[test]
fn transport_fault_skips_ticks_and_closes_once() {
    let transport = ReplayTransport::new(
        "sensor",
        vec![
            ReplayEvent::line("1,0,0,0"),
            ReplayEvent::Fault(ErrorKind::BrokenPipe),
            ReplayEvent::line("1,0,0,0"),
        ],
    );
    let closes = transport.close_counter();
    let mut pipeline = running(ReplayConnector::single(transport), MappingConfig::paddle());

    assert!(matches!(
        pipeline.tick(TickInput::new(DT)),
        TickOutcome::Updated(_)
    ));
    let before = *pipeline.signal();

    assert_eq!(pipeline.tick(TickInput::new(DT)), TickOutcome::Faulted);
    assert_eq!(pipeline.connection_state(), ConnectionState::Faulted);

    for _ in 0..5 {
        assert_eq!(pipeline.tick(TickInput::new(DT)), TickOutcome::Skipped);
    }
    assert_eq!(*pipeline.signal(), before);
    assert_eq!(pipeline.diagnostics().skipped_ticks, 5);
    assert_eq!(pipeline.diagnostics().frames_applied, 1);

    pipeline.shutdown_token().cancel();
    assert_eq!(
        pipeline.tick(TickInput::new(DT)),
        TickOutcome::ShutdownRequested
    );
    let stopped = pipeline.shutdown();
    assert_eq!(stopped.connection_state(), ConnectionState::Closed);
    drop(stopped);

    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn retry_policy_resumes_after_fault() {
    let first = ReplayTransport::new("sensor", vec![ReplayEvent::Fault(ErrorKind::Other)]);
    let second = ReplayTransport::new("sensor", vec![ReplayEvent::line("1,0,0,0")]);
    let connector = ReplayConnector::new("sensor", vec![Some(first), Some(second)]);
    let supervisor = ConnectionSupervisor::new(Box::new(connector), ReaderSettings::default())
        .with_retry_policy(Box::new(RetryEveryTicks::new(3, None)));
    let mut pipeline = Pipeline::create(MappingConfig::paddle(), supervisor)
        .unwrap()
        .initialize();

    assert_eq!(pipeline.tick(TickInput::new(DT)), TickOutcome::Faulted);
    assert_eq!(pipeline.tick(TickInput::new(DT)), TickOutcome::Skipped);
    assert_eq!(pipeline.tick(TickInput::new(DT)), TickOutcome::Skipped);
    assert!(matches!(
        pipeline.tick(TickInput::new(DT)),
        TickOutcome::Updated(_)
    ));
}

#[test]
fn hold_leaves_transport_open() {
    let transport = ReplayTransport::new("sensor", vec![ReplayEvent::line("1,0,0,0")]);
    let mut pipeline = running(ReplayConnector::single(transport), MappingConfig::paddle());

    for _ in 0..3 {
        assert_eq!(pipeline.tick(TickInput::held(DT)), TickOutcome::Held);
    }
    assert_eq!(pipeline.connection_state(), ConnectionState::Open);
    assert_eq!(pipeline.diagnostics().frames_applied, 0);
    assert!(matches!(
        pipeline.tick(TickInput::new(DT)),
        TickOutcome::Updated(_)
    ));
}

#[test]
fn bird_profile_follows_raw_component() {
    let transport = ReplayTransport::new("sensor", vec![ReplayEvent::line("0.9,0.0,0.5,0.0")]);
    let mut pipeline = running(ReplayConnector::single(transport), MappingConfig::bird());

    assert_eq!(
        *pipeline.signal(),
        ControlSignal::Single(ChannelState::at(1.0))
    );
    match pipeline.tick(TickInput::new(DT)) {
        TickOutcome::Updated(ControlSignal::Single(channel)) => {
            assert_eq!(channel.target, 5.0);
            assert!(channel.value > 1.0 && channel.value < 5.0);
            assert!(channel.velocity > 0.0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handle_publishes_and_releases_on_shutdown() {
    let transport = ReplayTransport::new("sensor", vec![ReplayEvent::line("1,0,0,0")])
        .idle_when_exhausted();
    let closes = transport.close_counter();
    let pipeline = running(ReplayConnector::single(transport), paddle_without_lag());

    let mut handle = PipelineHandle::spawn(pipeline, 200.0).unwrap();
    let mut diagnostics_rx = handle.subscribe_diagnostics();

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if diagnostics_rx.borrow_and_update().frames_applied > 0 {
                break;
            }
            if diagnostics_rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .unwrap();

    handle.set_hold(true);
    let final_signal = handle.shutdown().await.unwrap();

    assert_eq!(final_signal, ControlSignal::Single(ChannelState::at(0.0)));
    assert!(handle.is_finished());
    assert_eq!(handle.diagnostics().connection_state, ConnectionState::Closed);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_tick_rate_is_rejected() {
    let transport = ReplayTransport::new("sensor", vec![]);
    let pipeline = running(ReplayConnector::single(transport), MappingConfig::paddle());
    assert!(PipelineHandle::spawn(pipeline, 0.0).is_err());
}

#[tokio::test]
async fn tick_rate_too_small_for_a_period_is_rejected() {
    let transport = ReplayTransport::new("sensor", vec![]);
    let pipeline = running(ReplayConnector::single(transport), MappingConfig::paddle());
    assert!(matches!(
        PipelineHandle::spawn(pipeline, 1e-20),
        Err(PipelineError::InvalidTickRate(_))
    ));
}
