//! Integration tests: end-to-end control scenarios through the public API.
//!
//! These drive `LedController` with an in-memory transport and scripted
//! connectors, checking outcomes, confirmations and the reachability record
//! together.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use elitelight_lib::backoff::BackoffConfig;
use elitelight_lib::config::Config;
use elitelight_lib::controller::{
    ControlOutcome, ControlRequest, ControlSettings, LedChanged, LedController, RequestSource,
};
use elitelight_lib::endpoint::DeviceEndpoint;
use elitelight_lib::led::{LedState, Rgb};
use elitelight_lib::mapping::{EventMapping, default_entries};
use elitelight_lib::probe::{Connector, ProbeConfig, Reachability, ReachabilityProber};
use elitelight_lib::transport::mock::{MockReply, MockTransport};
use elitelight_lib::transport::{DryRunTransport, TransportError};

const RED: LedState = LedState::SolidColor(Rgb::new(255, 0, 0));

/// Connector that waits out the whole timeout and then fails.
struct Blackhole;

impl Connector for Blackhole {
    fn connect(&self, _addr: SocketAddr, timeout: Duration) -> io::Result<()> {
        std::thread::sleep(timeout);
        Err(io::Error::new(io::ErrorKind::TimedOut, "no answer"))
    }
}

/// Connector that answers from a script (true = up) and counts probes.
struct Scripted {
    answers: std::sync::Mutex<Vec<bool>>,
    probes: AtomicUsize,
}

impl Scripted {
    fn new(answers: &[bool]) -> Self {
        Self {
            answers: std::sync::Mutex::new(answers.iter().rev().copied().collect()),
            probes: AtomicUsize::new(0),
        }
    }

    fn always_up() -> Self {
        Self::new(&[])
    }

    fn answer(&self) -> io::Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let up = self.answers.lock().unwrap().pop().unwrap_or(true);
        if up {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }
    }
}

impl Connector for Scripted {
    fn connect(&self, _addr: SocketAddr, _timeout: Duration) -> io::Result<()> {
        self.answer()
    }
}

impl Connector for &Scripted {
    fn connect(&self, _addr: SocketAddr, _timeout: Duration) -> io::Result<()> {
        self.answer()
    }
}

fn endpoint() -> DeviceEndpoint {
    DeviceEndpoint::new("bf0123456789abcdef", "192.168.1.50", "localkey", "3.3", 6668).unwrap()
}

fn mapping() -> EventMapping {
    EventMapping::from_entries(&default_entries()).unwrap()
}

fn settings(probe_timeout: Duration) -> ControlSettings {
    ControlSettings {
        probe: ProbeConfig {
            timeout: probe_timeout,
            ..ProbeConfig::default()
        },
        ..ControlSettings::default()
    }
}

// ── Scenario: unreachable device ──

#[test]
fn unreachable_device_is_skipped_within_probe_bound() {
    let (tx, rx) = mpsc::channel::<LedChanged>();
    let transport = MockTransport::new();
    let c = LedController::with_connector(
        endpoint(),
        mapping(),
        transport,
        Blackhole,
        settings(Duration::from_millis(200)),
        tx,
    );

    let started = Instant::now();
    let result = c.apply(ControlRequest::manual(RED));
    let elapsed = started.elapsed();

    assert_eq!(result.outcome, ControlOutcome::SkippedUnreachable);
    assert!(elapsed <= Duration::from_millis(500), "took {elapsed:?}");
    assert!(rx.try_recv().is_err(), "no confirmation for a skipped write");

    // Cooldown: the next call does not probe again and returns at once.
    let started = Instant::now();
    let again = c.apply(ControlRequest::event("Docked"));
    assert_eq!(again.outcome, ControlOutcome::SkippedUnreachable);
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(rx.try_recv().is_err());
}

// ── Scenario: Docked applied ──

#[test]
fn docked_event_applies_white_and_confirms_once() {
    let (tx, rx) = mpsc::channel();
    let c = LedController::with_connector(
        endpoint(),
        mapping(),
        MockTransport::new(),
        Scripted::always_up(),
        ControlSettings::default(),
        tx,
    );

    let result = c.apply(ControlRequest::event("Docked"));
    assert_eq!(result.outcome, ControlOutcome::Applied);

    let confirmations: Vec<LedChanged> = rx.try_iter().collect();
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].state, LedState::SolidColor(Rgb::WHITE));
    assert_eq!(
        confirmations[0].source,
        RequestSource::EventTriggered("Docked".into())
    );
}

// ── Scenario: write error ──

#[test]
fn write_error_fails_without_confirmation_and_keeps_reachability() {
    let (tx, rx) = mpsc::channel();
    let transport = MockTransport::new();
    transport.push_reply(MockReply::Fail(TransportError::Write("device closed session".into())));
    let c = LedController::with_connector(
        endpoint(),
        mapping(),
        transport,
        Scripted::always_up(),
        ControlSettings::default(),
        tx,
    );

    let result = c.apply(ControlRequest::manual(RED));
    match &result.outcome {
        ControlOutcome::Failed(reason) => assert!(reason.contains("device closed session")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(rx.try_recv().is_err());

    let record = c.reachability().expect("device was probed");
    assert_eq!(record.last_result, Reachability::Reachable);
    assert_eq!(record.consecutive_failures, 0);
    assert_eq!(c.check_reachable(), Reachability::Reachable);

    // The lane recovers for the next request.
    assert!(c.apply(ControlRequest::manual(RED)).outcome.is_applied());
    assert_eq!(rx.try_iter().count(), 1);
}

// ── Concurrency ──

#[test]
fn concurrent_applies_keep_per_caller_order() {
    let (tx, rx) = mpsc::channel();
    let c = Arc::new(LedController::with_connector(
        endpoint(),
        mapping(),
        MockTransport::with_write_delay(Duration::from_millis(5)),
        Scripted::always_up(),
        ControlSettings::default(),
        tx,
    ));

    let workers: Vec<_> = (0..4u8)
        .map(|worker| {
            let c = Arc::clone(&c);
            std::thread::spawn(move || {
                for seq in 0..6u8 {
                    let state = LedState::SolidColor(Rgb::new(worker, seq, 0));
                    let result = c.apply(ControlRequest::manual(state));
                    assert!(result.outcome.is_applied(), "{:?}", result.outcome);
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let confirmed: Vec<LedState> = rx.try_iter().map(|c| c.state).collect();
    assert_eq!(confirmed.len(), 24);
    for worker in 0..4u8 {
        let seqs: Vec<u8> = confirmed
            .iter()
            .filter_map(|s| match s {
                LedState::SolidColor(Rgb { r, g, .. }) if *r == worker => Some(*g),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, (0..6).collect::<Vec<u8>>());
    }
}

#[test]
fn failed_apply_under_backlog_means_not_written() {
    let (tx, rx) = mpsc::channel::<LedChanged>();
    let c = Arc::new(LedController::with_connector(
        endpoint(),
        mapping(),
        MockTransport::with_write_delay(Duration::from_millis(150)),
        Scripted::always_up(),
        ControlSettings {
            write_timeout: Duration::from_millis(200),
            ..ControlSettings::default()
        },
        tx,
    ));

    let callers: Vec<_> = (0..12u8)
        .map(|n| {
            let c = Arc::clone(&c);
            std::thread::spawn(move || {
                let state = LedState::SolidColor(Rgb::new(n, 0, 0));
                (state, c.apply(ControlRequest::manual(state)).outcome)
            })
        })
        .collect();
    let outcomes: Vec<(LedState, ControlOutcome)> =
        callers.into_iter().map(|h| h.join().unwrap()).collect();
    c.shutdown();

    let written = c.transport().states();
    let confirmed: Vec<LedState> = rx.try_iter().map(|change| change.state).collect();
    let applied: Vec<LedState> = outcomes
        .iter()
        .filter(|(_, o)| o.is_applied())
        .map(|(s, _)| *s)
        .collect();

    assert!(applied.len() < 12, "backlog should outlast some callers");
    assert_eq!(written.len(), applied.len());
    assert_eq!(confirmed.len(), applied.len());
    for (state, outcome) in &outcomes {
        match outcome {
            ControlOutcome::Applied => {
                assert!(written.contains(state));
                assert!(confirmed.contains(state));
            }
            ControlOutcome::Failed(_) => assert!(!written.contains(state), "{state} was written"),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(c.last_applied(), written.last().copied());
}

#[test]
fn queued_submissions_keep_order() {
    let (tx, rx) = mpsc::channel();
    let c = LedController::with_connector(
        endpoint(),
        mapping(),
        MockTransport::with_write_delay(Duration::from_millis(2)),
        Scripted::always_up(),
        ControlSettings::default(),
        tx,
    );
    let events = ["LoadGame", "Undocked", "StartJump", "UnderAttack", "Docked"];
    let pending: Vec<_> = events
        .iter()
        .map(|e| c.submit(ControlRequest::event(e)))
        .collect();
    for p in pending {
        assert!(p.wait().outcome.is_applied());
    }
    let sources: Vec<String> = rx.try_iter().map(|c| c.source.to_string()).collect();
    let expected: Vec<String> = events.iter().map(|e| format!("event:{e}")).collect();
    assert_eq!(sources, expected);
}

// ── Idempotence and unmapped events ──

#[test]
fn same_state_twice_is_applied_twice() {
    let (tx, rx) = mpsc::channel();
    let c = LedController::with_connector(
        endpoint(),
        mapping(),
        MockTransport::new(),
        Scripted::always_up(),
        ControlSettings::default(),
        tx,
    );
    for _ in 0..2 {
        assert_eq!(
            c.apply(ControlRequest::manual(RED)).outcome,
            ControlOutcome::Applied
        );
    }
    assert_eq!(rx.try_iter().count(), 2);
}

#[test]
fn unmapped_events_never_fail() {
    let (tx, rx) = mpsc::channel();
    let c = LedController::with_connector(
        endpoint(),
        EventMapping::default(),
        MockTransport::new(),
        Blackhole,
        settings(Duration::from_millis(50)),
        tx,
    );
    for event in ["Docked", "", "FSDTarget", "docked"] {
        let outcome = c.apply(ControlRequest::event(event)).outcome;
        assert_eq!(outcome, ControlOutcome::Unmapped);
        assert!(!matches!(outcome, ControlOutcome::Failed(_)));
    }
    assert!(rx.try_recv().is_err());
}

// ── Prober properties ──

#[test]
fn two_checks_within_cache_ttl_probe_once() {
    let connector = Scripted::always_up();
    let prober = ReachabilityProber::with_connector(ProbeConfig::default(), &connector);
    let ep = endpoint();
    assert_eq!(prober.check_reachable(&ep), Reachability::Reachable);
    assert_eq!(prober.check_reachable(&ep), Reachability::Reachable);
    assert_eq!(connector.probes.load(Ordering::SeqCst), 1);
}

#[test]
fn cooldown_grows_then_resets_on_success() {
    let connector = Scripted::new(&[false, false, false, false, true]);
    let config = ProbeConfig {
        cache_ttl: Duration::ZERO,
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            multiplier: 2.0,
        },
        ..ProbeConfig::default()
    };
    let prober = ReachabilityProber::with_connector(config, &connector);
    let ep = endpoint();

    let mut cooldowns = Vec::new();
    for _ in 0..4 {
        // Wait out any cooldown so each call really probes.
        if let Some(rec) = prober.record(&ep) {
            let wait = rec.next_allowed_check_at.saturating_duration_since(Instant::now());
            std::thread::sleep(wait + Duration::from_millis(1));
        }
        assert_eq!(prober.check_reachable(&ep), Reachability::Unreachable);
        let rec = prober.record(&ep).unwrap();
        cooldowns.push(rec.next_allowed_check_at - rec.last_checked_at);
    }
    assert_eq!(connector.probes.load(Ordering::SeqCst), 4);
    assert!(cooldowns.windows(2).all(|w| w[0] <= w[1]), "{cooldowns:?}");
    assert_eq!(*cooldowns.last().unwrap(), Duration::from_millis(40));

    let rec = prober.record(&ep).unwrap();
    let wait = rec.next_allowed_check_at.saturating_duration_since(Instant::now());
    std::thread::sleep(wait + Duration::from_millis(1));
    assert_eq!(prober.check_reachable(&ep), Reachability::Reachable);
    let rec = prober.record(&ep).unwrap();
    assert_eq!(rec.consecutive_failures, 0);
    assert_eq!(rec.next_allowed_check_at, rec.last_checked_at);
}

// ── Real sockets ──

#[test]
fn dry_run_against_live_listener_applies() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = Config {
        device_id: "bf01".into(),
        device_host: "127.0.0.1".into(),
        local_key: "k".into(),
        device_port: port,
        ..Config::default()
    };
    let (tx, rx) = mpsc::channel();
    let c = LedController::new(
        config.endpoint().unwrap(),
        config.event_mapping().unwrap(),
        DryRunTransport,
        config.control_settings(),
        tx,
    );
    assert!(c.apply(ControlRequest::event("StartJump")).outcome.is_applied());
    assert_eq!(rx.try_iter().count(), 1);
}

#[test]
fn closed_port_is_skipped() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let ep = DeviceEndpoint::new("bf01", "127.0.0.1", "k", "3.3", port).unwrap();
    let (tx, rx) = mpsc::channel();
    let c = LedController::new(ep, mapping(), DryRunTransport, ControlSettings::default(), tx);
    assert_eq!(
        c.apply(ControlRequest::manual(RED)).outcome,
        ControlOutcome::SkippedUnreachable
    );
    assert!(rx.try_recv().is_err());
}
