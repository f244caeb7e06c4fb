// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use http::StatusCode;
use layered::Service;
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

use crate::breaker::{CircuitClosed, CircuitEventSink, CircuitHalfOpened, CircuitOpened};
use crate::{HttpError, HttpOutcome, HttpRequest, HttpResponse};

pub(crate) fn get(uri: &str) -> HttpRequest {
    http::Request::builder().uri(uri).body(Bytes::new()).unwrap()
}

pub(crate) fn status(code: u16) -> HttpOutcome {
    let mut response = HttpResponse::new(Bytes::new());
    *response.status_mut() = StatusCode::from_u16(code).unwrap();
    Ok(response)
}

pub(crate) fn ok() -> HttpOutcome {
    status(200)
}

pub(crate) fn transport_failure() -> HttpOutcome {
    Err(HttpError::transport("connection reset by peer"))
}

/// Transport that answers from a function of the zero-based call index.
#[derive(Clone)]
pub(crate) struct FakeTransport {
    calls: Arc<AtomicUsize>,
    respond: Arc<dyn Fn(usize) -> HttpOutcome + Send + Sync>,
}

impl FakeTransport {
    pub fn new(respond: impl Fn(usize) -> HttpOutcome + Send + Sync + 'static) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            respond: Arc::new(respond),
        }
    }

    pub fn always(code: u16) -> Self {
        Self::new(move |_| status(code))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for FakeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeTransport").field("calls", &self.calls()).finish_non_exhaustive()
    }
}

impl Service<HttpRequest> for FakeTransport {
    type Out = HttpOutcome;

    async fn execute(&self, _input: HttpRequest) -> Self::Out {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(index)
    }
}

/// Sink that keeps a one-line summary of every circuit event.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl CircuitEventSink for RecordingSink {
    fn on_circuit_closed(&self, event: CircuitClosed<'_>) {
        self.events
            .lock()
            .push(format!("closed {} after {}", event.destination(), event.cause().unwrap_or("-")));
    }

    fn on_circuit_half_opened(&self, event: CircuitHalfOpened<'_>) {
        self.events.lock().push(format!("half_opened {}", event.destination()));
    }

    fn on_circuit_opened(&self, event: CircuitOpened<'_>) {
        self.events.lock().push(format!("opened {}", event.destination()));
    }
}

/// Captures formatted `tracing` output of the current thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).to_string()
    }

    pub fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(
            output.contains(expected),
            "log output does not contain '{expected}', got:\n{output}"
        );
    }

    /// Use with `set_default()` for thread-local capture.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + use<> {
        tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

#[derive(Debug)]
pub(crate) struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
