//! Control facade: the single entry point for changing the strip.
//!
//! Manual requests and game events go through the same gate:
//!
//! 1. events are resolved through the [`EventMapping`]; unmapped ones are a no-op
//! 2. optional duplicate suppression against the last applied state
//! 3. the reachability prober; an offline device is skipped without I/O
//! 4. the device's write lane
//!
//! A [`LedChanged`] confirmation goes to the [`ConfirmationSink`] only after
//! the transport reported success.

use std::fmt;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use serde::{Serialize, Serializer};

use crate::endpoint::DeviceEndpoint;
use crate::led::LedState;
use crate::mapping::{self, EventMapping};
use crate::probe::{
    Connector, ProbeConfig, Reachability, ReachabilityProber, ReachabilityRecord, TcpConnector,
    lock,
};
use crate::serializer::{CommandSerializer, WriteTicket};
use crate::transport::DeviceTransport;

/// Extra time a caller waits on the lane beyond the transport's own bound.
const LANE_GRACE: Duration = Duration::from_secs(1);

/// Where a request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSource {
    Manual,
    EventTriggered(String),
}

impl fmt::Display for RequestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestSource::Manual => f.write_str("manual"),
            RequestSource::EventTriggered(id) => write!(f, "event:{id}"),
        }
    }
}

impl Serialize for RequestSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone)]
pub struct ControlRequest {
    source: RequestSource,
    desired_state: Option<LedState>,
    submitted_at: Instant,
}

impl ControlRequest {
    /// A user asked for `state` directly.
    pub fn manual(state: LedState) -> Self {
        Self {
            source: RequestSource::Manual,
            desired_state: Some(state),
            submitted_at: Instant::now(),
        }
    }

    /// A game event; the state is looked up when the request is applied.
    pub fn event(event_id: &str) -> Self {
        Self {
            source: RequestSource::EventTriggered(event_id.to_string()),
            desired_state: None,
            submitted_at: Instant::now(),
        }
    }

    pub fn source(&self) -> &RequestSource {
        &self.source
    }

    pub fn desired_state(&self) -> Option<LedState> {
        self.desired_state
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ControlOutcome {
    /// The transport confirmed the write.
    Applied,
    /// The prober reported the device offline; nothing was sent.
    SkippedUnreachable,
    /// The event has no entry in the mapping.
    Unmapped,
    /// Duplicate of the last applied state, suppressed.
    Unchanged,
    Failed(String),
}

impl ControlOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ControlOutcome::Applied)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ControlOutcome::Failed(_) | ControlOutcome::SkippedUnreachable
        )
    }
}

impl fmt::Display for ControlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlOutcome::Applied => f.write_str("applied"),
            ControlOutcome::SkippedUnreachable => f.write_str("device unreachable"),
            ControlOutcome::Unmapped => f.write_str("no mapping for event"),
            ControlOutcome::Unchanged => f.write_str("already in that state"),
            ControlOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlResult {
    #[serde(flatten)]
    pub outcome: ControlOutcome,
    pub completed_at: SystemTime,
}

impl ControlResult {
    pub(crate) fn now(outcome: ControlOutcome) -> Self {
        Self {
            outcome,
            completed_at: SystemTime::now(),
        }
    }

    /// `Ok` for applied, the outcome as an error otherwise.
    pub fn into_result(self) -> crate::error::Result<SystemTime> {
        if self.outcome.is_applied() {
            Ok(self.completed_at)
        } else {
            Err(crate::ElitelightError::NotApplied(self.outcome))
        }
    }
}

/// Confirmation that the strip now shows `state`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedChanged {
    pub state: LedState,
    pub source: RequestSource,
    pub applied_at: SystemTime,
}

/// Receives confirmations. Called from the device's write lane.
pub trait ConfirmationSink: Send + Sync {
    fn confirm(&self, change: &LedChanged);
}

impl ConfirmationSink for mpsc::Sender<LedChanged> {
    fn confirm(&self, change: &LedChanged) {
        if self.send(change.clone()).is_err() {
            log::debug!("confirmation receiver gone, dropping {}", change.state);
        }
    }
}

impl<S: ConfirmationSink + ?Sized> ConfirmationSink for Arc<S> {
    fn confirm(&self, change: &LedChanged) {
        (**self).confirm(change);
    }
}

/// Sink that ignores confirmations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardConfirmations;

impl ConfirmationSink for DiscardConfirmations {
    fn confirm(&self, _change: &LedChanged) {}
}

/// Runtime knobs for the facade.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSettings {
    pub probe: ProbeConfig,
    /// Bound on a single transport write.
    pub write_timeout: Duration,
    /// Skip writes that repeat the last applied state.
    pub dedupe_repeats: bool,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            write_timeout: Duration::from_secs(2),
            dedupe_repeats: false,
        }
    }
}

impl ControlSettings {
    /// How long `apply` waits for its write before giving up on it.
    pub fn reply_timeout(&self) -> Duration {
        self.write_timeout + LANE_GRACE
    }
}

/// A request that passed the gate.
#[derive(Debug)]
pub enum PendingControl {
    /// Finished without a write (unmapped, unchanged or unreachable).
    Ready(ControlResult),
    /// Queued on the write lane.
    Queued { ticket: WriteTicket, wait: Duration },
}

impl PendingControl {
    pub fn is_queued(&self) -> bool {
        matches!(self, PendingControl::Queued { .. })
    }

    /// Block until the result is known (bounded by the reply timeout).
    pub fn wait(self) -> ControlResult {
        match self {
            PendingControl::Ready(result) => result,
            PendingControl::Queued { ticket, wait } => ControlResult::now(ticket.wait(wait)),
        }
    }
}

/// Facade over one device.
///
/// Owns the device endpoint, its reachability state and its write lane.
/// All methods take `&self`; share it behind an `Arc` to call it from
/// several threads.
pub struct LedController<T, C = TcpConnector>
where
    T: DeviceTransport + Send + Sync + 'static,
    C: Connector,
{
    endpoint: DeviceEndpoint,
    mapping: EventMapping,
    settings: ControlSettings,
    prober: ReachabilityProber<C>,
    serializer: CommandSerializer<T>,
    sink: Arc<dyn ConfirmationSink>,
    last_applied: Arc<Mutex<Option<LedState>>>,
}

impl<T> LedController<T, TcpConnector>
where
    T: DeviceTransport + Send + Sync + 'static,
{
    pub fn new(
        endpoint: DeviceEndpoint,
        mapping: EventMapping,
        transport: T,
        settings: ControlSettings,
        sink: impl ConfirmationSink + 'static,
    ) -> Self {
        Self::with_connector(endpoint, mapping, transport, TcpConnector, settings, sink)
    }
}

impl<T, C> LedController<T, C>
where
    T: DeviceTransport + Send + Sync + 'static,
    C: Connector,
{
    pub fn with_connector(
        endpoint: DeviceEndpoint,
        mapping: EventMapping,
        transport: T,
        connector: C,
        settings: ControlSettings,
        sink: impl ConfirmationSink + 'static,
    ) -> Self {
        let prober = ReachabilityProber::with_connector(settings.probe.clone(), connector);
        Self {
            endpoint,
            mapping,
            settings,
            prober,
            serializer: CommandSerializer::new(transport),
            sink: Arc::new(sink),
            last_applied: Arc::new(Mutex::new(None)),
        }
    }

    /// Apply a request and wait for the outcome.
    pub fn apply(&self, request: ControlRequest) -> ControlResult {
        self.submit(request).wait()
    }

    /// Run the gate and queue the write without waiting for it.
    ///
    /// The confirmation for a queued write is still emitted from the lane
    /// once the transport reports success.
    pub fn submit(&self, request: ControlRequest) -> PendingControl {
        let state = match request.desired_state() {
            Some(state) => state,
            None => {
                let RequestSource::EventTriggered(event_id) = request.source() else {
                    return PendingControl::Ready(ControlResult::now(ControlOutcome::Unmapped));
                };
                match mapping::resolve(event_id, &self.mapping) {
                    Some(state) => state,
                    None => {
                        log::debug!("event {event_id} has no mapping");
                        return PendingControl::Ready(ControlResult::now(ControlOutcome::Unmapped));
                    }
                }
            }
        };

        if self.settings.dedupe_repeats && *lock(&self.last_applied) == Some(state) {
            log::debug!("{state} already applied, skipping");
            return PendingControl::Ready(ControlResult::now(ControlOutcome::Unchanged));
        }

        if self.prober.check_reachable(&self.endpoint) == Reachability::Unreachable {
            log::info!(
                "{} unreachable, not sending {state} ({})",
                self.endpoint.identity(),
                request.source()
            );
            return PendingControl::Ready(ControlResult::now(ControlOutcome::SkippedUnreachable));
        }

        let sink = Arc::clone(&self.sink);
        let last_applied = Arc::clone(&self.last_applied);
        let source = request.source().clone();
        let ticket = self.serializer.enqueue_then(&self.endpoint, state, move || {
            *lock(&last_applied) = Some(state);
            sink.confirm(&LedChanged {
                state,
                source,
                applied_at: SystemTime::now(),
            });
        });
        PendingControl::Queued {
            ticket,
            wait: self.settings.reply_timeout(),
        }
    }

    /// Run the reachability gate on its own.
    pub fn check_reachable(&self) -> Reachability {
        self.prober.check_reachable(&self.endpoint)
    }

    /// Snapshot of the device's probe record.
    pub fn reachability(&self) -> Option<ReachabilityRecord> {
        self.prober.record(&self.endpoint)
    }

    /// Last state the transport confirmed.
    pub fn last_applied(&self) -> Option<LedState> {
        *lock(&self.last_applied)
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub fn mapping(&self) -> &EventMapping {
        &self.mapping
    }

    pub fn transport(&self) -> &Arc<T> {
        self.serializer.transport()
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    /// Wait for queued writes to finish and stop the write lane.
    pub fn shutdown(&self) {
        self.serializer.shutdown();
    }
}
