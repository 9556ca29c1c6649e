//! In-process worker harness.
//!
//! Runs a [`Dispatcher`] on a background task over an in-memory transport
//! and exposes the host side of the conversation.

use std::sync::{Arc, Once};
use std::time::Duration;

use funcworker_config::DispatchMode;
use funcworker_core::{Content, StreamingMessage, WorkerResult};
use funcworker_runtime::{
    Dispatcher, DispatcherSettings, EngineFactory, FunctionRegistry, HostEndpoint, PoolConfig,
    UnitPool, channel_transport,
};
use tokio::task::JoinHandle;

/// How long [`WorkerHarness::recv`] waits before failing the test.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Harness options.
#[derive(Debug, Clone, Default)]
pub struct HarnessOptions {
    /// Pool sizing.
    pub pool: PoolConfig,
    /// Dispatcher settings.
    pub settings: DispatcherSettings,
}

impl HarnessOptions {
    /// Concurrent dispatch over a pool of `size` units.
    #[must_use]
    pub fn concurrent(size: usize) -> Self {
        Self {
            pool: PoolConfig {
                size,
                checkout_timeout: None,
            },
            settings: DispatcherSettings {
                mode: DispatchMode::Concurrent,
                ..DispatcherSettings::default()
            },
        }
    }
}

/// A running worker and the host end of its transport.
pub struct WorkerHarness {
    host: HostEndpoint,
    dispatcher: Dispatcher,
    task: JoinHandle<WorkerResult<()>>,
}

impl WorkerHarness {
    /// Start a worker over `factory`.
    #[must_use]
    pub fn start<F>(factory: F, options: HarnessOptions) -> Self
    where
        F: EngineFactory + 'static,
    {
        let registry = Arc::new(FunctionRegistry::new());
        let pool = UnitPool::new(Arc::new(factory), Arc::clone(&registry), options.pool);
        let dispatcher = Dispatcher::new(registry, pool, options.settings);

        let (host, source, sink) = channel_transport(64);
        let runner = dispatcher.clone();
        let task = tokio::spawn(async move { runner.run(source, Arc::new(sink)).await });

        Self {
            host,
            dispatcher,
            task,
        }
    }

    /// The running dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Send a message to the worker.
    ///
    /// # Panics
    ///
    /// Panics if the worker has stopped reading.
    pub async fn send(&self, message: StreamingMessage) {
        self.host
            .requests
            .send(message)
            .await
            .expect("worker inbound stream is open");
    }

    /// Receive the next response.
    ///
    /// # Panics
    ///
    /// Panics on timeout or if the worker closed its outbound stream.
    pub async fn recv(&mut self) -> StreamingMessage {
        tokio::time::timeout(RESPONSE_TIMEOUT, self.host.responses.recv())
            .await
            .expect("worker responded in time")
            .expect("worker outbound stream is open")
    }

    /// Send a request and wait for its response.
    pub async fn request(&mut self, message: StreamingMessage) -> StreamingMessage {
        self.send(message).await;
        self.recv().await
    }

    /// Receive `count` responses in arrival order.
    pub async fn recv_many(&mut self, count: usize) -> Vec<StreamingMessage> {
        let mut responses = Vec::with_capacity(count);
        for _ in 0..count {
            responses.push(self.recv().await);
        }
        responses
    }

    /// Close the inbound stream and wait for the worker to stop.
    ///
    /// Responses still queued are returned with the run result.
    ///
    /// # Panics
    ///
    /// Panics if the worker task panicked.
    pub async fn finish(self) -> (WorkerResult<()>, Vec<StreamingMessage>) {
        let Self { host, task, .. } = self;
        let HostEndpoint {
            requests,
            mut responses,
        } = host;
        drop(requests);

        let result = task.await.expect("worker task completed");
        let mut remaining = Vec::new();
        while let Ok(message) = responses.try_recv() {
            remaining.push(message);
        }
        (result, remaining)
    }

    /// Wait for the worker to stop on its own, without closing the stream.
    ///
    /// # Panics
    ///
    /// Panics on timeout or if the worker task panicked.
    pub async fn join(self) -> WorkerResult<()> {
        tokio::time::timeout(RESPONSE_TIMEOUT, self.task)
            .await
            .expect("worker stopped in time")
            .expect("worker task completed")
    }
}

/// The status of a response payload, as a success flag.
///
/// # Panics
///
/// Panics if the message carries no status.
#[must_use]
pub fn is_success(message: &StreamingMessage) -> bool {
    message
        .content
        .status()
        .expect("message is a response")
        .is_success()
}

/// The exception message of a failed response.
#[must_use]
pub fn failure_message(message: &StreamingMessage) -> Option<String> {
    message
        .content
        .status()
        .and_then(|s| s.exception.as_ref())
        .map(|e| e.message.clone())
}

/// Unwrap an invocation response.
///
/// # Panics
///
/// Panics if the message is another kind.
#[must_use]
pub fn invocation_response(message: &StreamingMessage) -> &funcworker_core::InvocationResponse {
    match &message.content {
        Content::InvocationResponse(response) => response,
        other => panic!("expected an invocation response, got {:?}", other.kind()),
    }
}

static LOGGING: Once = Once::new();

/// Route test logs through the test writer, once per process.
///
/// Honors `RUST_LOG`; silent by default.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
