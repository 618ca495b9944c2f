//! Mock recommendation transport for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::session::{EventStream, RecommendationTransport};
use crate::settings::QuerySettings;
use crate::{StreamEvent, TransportError};

/// One scripted response for a single `open()` call.
pub enum MockScript {
    /// Yield these events in order, then end the stream.
    Events(Vec<Result<StreamEvent, TransportError>>),
    /// Fail the open itself.
    OpenError(TransportError),
    /// Hand out a live stream fed by the paired sender; the test observes
    /// handle release via [`mpsc::UnboundedSender::is_closed`].
    Live(mpsc::UnboundedReceiver<Result<StreamEvent, TransportError>>),
}

/// A hand-rolled mock implementing [`RecommendationTransport`] for tests.
///
/// Scripts are consumed one per `open()` call, in order; an unscripted call
/// yields an empty stream. Records every call's query parameters and counts
/// opens via [`open_count`](MockTransport::open_count).
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<Vec<MockScript>>,
    open_count: AtomicUsize,
    opened_with: Mutex<Vec<(String, bool)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a finite event sequence for the next unscripted `open()`.
    pub fn script_events(&self, events: Vec<Result<StreamEvent, TransportError>>) {
        self.scripts.lock().unwrap().push(MockScript::Events(events));
    }

    /// Queue an open failure.
    pub fn script_open_error(&self, err: TransportError) {
        self.scripts.lock().unwrap().push(MockScript::OpenError(err));
    }

    /// Queue a live stream and return the sender that feeds it.
    pub fn script_live(&self) -> mpsc::UnboundedSender<Result<StreamEvent, TransportError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().unwrap().push(MockScript::Live(rx));
        tx
    }

    /// How many times `open()` has been called.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// `(fingerprint, force_refresh)` of each `open()` call, in order.
    pub fn opened_with(&self) -> Vec<(String, bool)> {
        self.opened_with.lock().unwrap().clone()
    }

    fn next_script(&self) -> MockScript {
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            MockScript::Events(Vec::new())
        } else {
            scripts.remove(0)
        }
    }
}

impl RecommendationTransport for MockTransport {
    fn open<'a>(
        &'a self,
        settings: &'a QuerySettings,
        force_refresh: bool,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, TransportError>> + Send + 'a>> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        self.opened_with
            .lock()
            .unwrap()
            .push((settings.fingerprint(), force_refresh));
        let script = self.next_script();

        Box::pin(async move {
            match script {
                MockScript::Events(events) => {
                    Ok(Box::pin(tokio_stream::iter(events)) as EventStream)
                }
                MockScript::OpenError(err) => Err(err),
                MockScript::Live(rx) => {
                    Ok(Box::pin(UnboundedReceiverStream::new(rx)) as EventStream)
                }
            }
        })
    }
}
