//! In-memory transport for tests.
//!
//! Records every write with its start/end time, lets tests inject failures,
//! delays and panics, and tracks how many writes were in flight at once.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::{DeviceTransport, Result, TransportError};
use crate::endpoint::DeviceEndpoint;
use crate::led::LedState;
use crate::probe::lock;

/// One recorded write.
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub device_id: String,
    pub state: LedState,
    pub started: Instant,
    pub finished: Instant,
}

/// Scripted behaviour for the next write.
#[derive(Debug, Clone)]
pub enum MockReply {
    Fail(TransportError),
    Panic,
}

#[derive(Default)]
pub struct MockTransport {
    /// Every successful or failed write, in the order the transport saw them.
    pub writes: Mutex<Vec<RecordedWrite>>,
    /// Sessions opened so far.
    pub opens: AtomicUsize,
    /// If set, `open` fails with this error.
    pub fail_open: Mutex<Option<TransportError>>,
    /// Scripted replies for upcoming writes (popped front first).
    pub replies: Mutex<VecDeque<MockReply>>,
    /// Artificial duration of each write.
    pub write_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_delay(delay: Duration) -> Self {
        let t = Self::new();
        *lock(&t.write_delay) = delay;
        t
    }

    /// Queue a scripted reply for the next write.
    pub fn push_reply(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    /// States written so far, in order.
    pub fn states(&self) -> Vec<LedState> {
        lock(&self.writes).iter().map(|w| w.state).collect()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    /// Writes running right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of writes observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even if the write panics.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DeviceTransport for MockTransport {
    type Session = String;

    fn open(&self, endpoint: &DeviceEndpoint) -> Result<Self::Session> {
        if let Some(e) = lock(&self.fail_open).clone() {
            return Err(e);
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(endpoint.id().to_string())
    }

    fn send(&self, session: &mut Self::Session, state: &LedState) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let started = Instant::now();
        let delay = *lock(&self.write_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let reply = lock(&self.replies).pop_front();
        lock(&self.writes).push(RecordedWrite {
            device_id: session.clone(),
            state: *state,
            started,
            finished: Instant::now(),
        });
        match reply {
            None => Ok(()),
            Some(MockReply::Fail(e)) => Err(e),
            Some(MockReply::Panic) => panic!("mock: transport panic injected"),
        }
    }
}
