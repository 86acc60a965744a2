//! Command serializer: one write lane per device.
//!
//! Every device identity gets a dedicated worker thread fed by a FIFO
//! channel. The worker is the only code that calls the transport for that
//! device, so writes are exclusive and applied in submission order, and they
//! run off the caller's thread. Transport errors, timeouts and panics are
//! turned into [`ControlOutcome::Failed`]; the lane keeps serving afterwards.
//!
//! A caller that stops waiting can only withdraw a write the lane has not
//! started yet. Once the transport has the state, the caller gets the real
//! result, so `Failed` always means the strip was not changed by that write.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::controller::{ControlOutcome, ControlResult};
use crate::endpoint::{DeviceEndpoint, DeviceIdentity};
use crate::led::LedState;
use crate::probe::lock;
use crate::transport::{self, DeviceTransport, TransportError};

type OnApplied = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
enum TicketState {
    /// Queued behind other writes.
    Pending,
    /// Handed to the transport; bounded by the transport's own timeout.
    InFlight,
    Done(ControlOutcome),
    /// The caller gave up before the lane started it; it is never sent.
    Abandoned,
}

#[derive(Debug)]
struct TicketInner {
    state: Mutex<TicketState>,
    done: Condvar,
}

impl TicketInner {
    fn new(state: TicketState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            done: Condvar::new(),
        })
    }
}

/// Handle to a queued write.
///
/// Dropping the ticket without waiting is fine: the write still happens and
/// `on_applied` still fires on success. Only [`WriteTicket::wait`] running
/// out withdraws it.
#[derive(Debug)]
pub struct WriteTicket {
    inner: Arc<TicketInner>,
}

impl WriteTicket {
    fn ready(outcome: ControlOutcome) -> Self {
        Self {
            inner: TicketInner::new(TicketState::Done(outcome)),
        }
    }

    /// Outcome, if the write has finished.
    pub fn try_outcome(&self) -> Option<ControlOutcome> {
        match &*lock(&self.inner.state) {
            TicketState::Done(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Wait up to `timeout` for the lane to pick the write up.
    ///
    /// If the write is still queued when `timeout` runs out it is withdrawn:
    /// the lane skips it and the caller gets `Failed`. A write that already
    /// reached the transport is waited for until it finishes, so its outcome
    /// is what actually happened.
    pub fn wait(self, timeout: Duration) -> ControlOutcome {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.inner.state);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match *state {
                TicketState::Done(ref outcome) => return outcome.clone(),
                TicketState::Pending if remaining.is_zero() => {
                    *state = TicketState::Abandoned;
                    return ControlOutcome::Failed(format!(
                        "write not started within {timeout:?}, withdrawn"
                    ));
                }
                TicketState::Pending => {
                    state = match self.inner.done.wait_timeout(state, remaining) {
                        Ok((guard, _)) => guard,
                        Err(e) => e.into_inner().0,
                    };
                }
                TicketState::InFlight | TicketState::Abandoned => {
                    state = self
                        .inner
                        .done
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }
}

struct Job {
    state: LedState,
    ticket: Arc<TicketInner>,
    on_applied: Option<OnApplied>,
}

impl Job {
    /// Claim the job for the transport. `false` if its caller withdrew it.
    fn start(&self) -> bool {
        let mut state = lock(&self.ticket.state);
        if matches!(*state, TicketState::Abandoned) {
            return false;
        }
        *state = TicketState::InFlight;
        self.ticket.done.notify_all();
        true
    }

    fn finish(mut self, outcome: ControlOutcome) {
        let mut state = lock(&self.ticket.state);
        if outcome.is_applied()
            && let Some(cb) = self.on_applied.take()
        {
            cb();
        }
        *state = TicketState::Done(outcome);
        self.ticket.done.notify_all();
    }
}

impl Drop for Job {
    /// A job dropped unfinished (lane gone) must still release its waiter.
    fn drop(&mut self) {
        let mut state = lock(&self.ticket.state);
        if matches!(*state, TicketState::Pending | TicketState::InFlight) {
            *state = TicketState::Done(ControlOutcome::Failed("write lane stopped".into()));
            self.ticket.done.notify_all();
        }
    }
}

struct Lane {
    tx: Sender<Job>,
    handle: JoinHandle<()>,
}

/// Per-device single-writer execution lanes over a shared transport.
pub struct CommandSerializer<T>
where
    T: DeviceTransport + Send + Sync + 'static,
{
    transport: Arc<T>,
    lanes: Mutex<HashMap<DeviceIdentity, Lane>>,
}

impl<T> CommandSerializer<T>
where
    T: DeviceTransport + Send + Sync + 'static,
{
    pub fn new(transport: T) -> Self {
        Self::with_shared(Arc::new(transport))
    }

    pub fn with_shared(transport: Arc<T>) -> Self {
        Self {
            transport,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Write `state` to `endpoint` and wait up to `wait` for the result.
    pub fn submit(&self, endpoint: &DeviceEndpoint, state: LedState, wait: Duration) -> ControlResult {
        let outcome = self.enqueue(endpoint, state).wait(wait);
        ControlResult::now(outcome)
    }

    /// Queue `state` for `endpoint` without waiting.
    pub fn enqueue(&self, endpoint: &DeviceEndpoint, state: LedState) -> WriteTicket {
        self.enqueue_job(endpoint, state, None)
    }

    /// Queue `state`, running `on_applied` on the lane once the device has
    /// accepted it. A write withdrawn by [`WriteTicket::wait`] never runs it.
    pub fn enqueue_then(
        &self,
        endpoint: &DeviceEndpoint,
        state: LedState,
        on_applied: impl FnOnce() + Send + 'static,
    ) -> WriteTicket {
        self.enqueue_job(endpoint, state, Some(Box::new(on_applied)))
    }

    fn enqueue_job(
        &self,
        endpoint: &DeviceEndpoint,
        state: LedState,
        on_applied: Option<OnApplied>,
    ) -> WriteTicket {
        let ticket = TicketInner::new(TicketState::Pending);
        let mut job = Job {
            state,
            ticket: Arc::clone(&ticket),
            on_applied,
        };
        let identity = endpoint.identity();
        let mut lanes = lock(&self.lanes);

        // A lane whose worker died is replaced once.
        for _ in 0..2 {
            if !lanes.contains_key(&identity) {
                match self.spawn_lane(endpoint) {
                    Ok(lane) => {
                        lanes.insert(identity.clone(), lane);
                    }
                    Err(e) => {
                        log::warn!("could not start write lane for {identity}: {e}");
                        return WriteTicket::ready(ControlOutcome::Failed(format!(
                            "write lane: {e}"
                        )));
                    }
                }
            }
            let Some(lane) = lanes.get(&identity) else {
                break;
            };
            match lane.tx.send(job) {
                Ok(()) => return WriteTicket { inner: ticket },
                Err(mpsc::SendError(returned)) => {
                    job = returned;
                    log::warn!("write lane for {identity} stopped, restarting");
                    if let Some(dead) = lanes.remove(&identity) {
                        let _ = dead.handle.join();
                    }
                }
            }
        }
        WriteTicket::ready(ControlOutcome::Failed("write lane unavailable".into()))
    }

    fn spawn_lane(&self, endpoint: &DeviceEndpoint) -> std::io::Result<Lane> {
        let (tx, rx) = mpsc::channel();
        let transport = Arc::clone(&self.transport);
        let endpoint = endpoint.clone();
        let handle = std::thread::Builder::new()
            .name(format!("led-lane-{}", endpoint.id()))
            .spawn(move || run_lane(&*transport, &endpoint, rx))?;
        Ok(Lane { tx, handle })
    }

    /// Close all lanes and wait for queued writes to drain.
    pub fn shutdown(&self) {
        let lanes: Vec<Lane> = lock(&self.lanes).drain().map(|(_, lane)| lane).collect();
        for Lane { tx, handle } in lanes {
            drop(tx);
            let _ = handle.join();
        }
    }
}

impl<T> Drop for CommandSerializer<T>
where
    T: DeviceTransport + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_lane<T: DeviceTransport>(transport: &T, endpoint: &DeviceEndpoint, rx: Receiver<Job>) {
    let mut session: Option<T::Session> = None;
    for job in rx {
        if !job.start() {
            log::debug!(
                "{} -> {} withdrawn before it was sent",
                endpoint.identity(),
                job.state
            );
            continue;
        }
        let outcome = write_state(transport, endpoint, &mut session, &job.state);
        match &outcome {
            ControlOutcome::Applied => log::info!("{} -> {}", endpoint.identity(), job.state),
            ControlOutcome::Failed(reason) => {
                log::warn!("{} -> {} failed: {reason}", endpoint.identity(), job.state)
            }
            _ => {}
        }
        job.finish(outcome);
    }
    log::debug!("write lane for {} closed", endpoint.identity());
}

/// One transport write. The session is kept for the next write and dropped
/// after any failure.
fn write_state<T: DeviceTransport>(
    transport: &T,
    endpoint: &DeviceEndpoint,
    session: &mut Option<T::Session>,
    state: &LedState,
) -> ControlOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| -> transport::Result<()> {
        if session.is_none() {
            *session = Some(transport.open(endpoint)?);
        }
        let Some(s) = session.as_mut() else {
            return Err(TransportError::Connect("session unavailable".into()));
        };
        transport.send(s, state)
    }));
    match result {
        Ok(Ok(())) => ControlOutcome::Applied,
        Ok(Err(e)) => {
            *session = None;
            ControlOutcome::Failed(e.to_string())
        }
        Err(_) => {
            *session = None;
            ControlOutcome::Failed("transport panicked".into())
        }
    }
}
