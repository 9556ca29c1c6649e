//! Request dispatcher.
//!
//! Drives the worker's protocol: reads host messages in arrival order,
//! handles each one, and writes exactly one response per request.
//!
//! - Worker init and function loads are always handled inline, in order.
//! - Invocations are handled inline in [`DispatchMode::Sequential`]. In
//!   [`DispatchMode::Concurrent`] each runs on its own task, bounded by pool
//!   capacity, and responses may come back in any order; each carries its
//!   request's id.
//!   At most `max_in_flight` invocations are admitted; past that the loop
//!   stops reading until one finishes.
//! - A request of a known kind whose payload does not decode gets a failed
//!   response of the matching kind.
//! - An unknown message kind, or a response kind arriving inbound, is a
//!   protocol violation and ends the loop without a response.
//! - An engine panic fails that invocation only; its unit is discarded.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use funcworker_config::{DEFAULT_MAX_IN_FLIGHT, DispatchMode};
use funcworker_core::{
    Content, FunctionLoadRequest, FunctionLoadResponse, FunctionMetadata, InvocationRequest,
    InvocationResponse, MessageKind, StatusResult, StreamingMessage, WorkerError,
    WorkerInitRequest, WorkerInitResponse, WorkerMetadata, WorkerResult,
};
use funcworker_telemetry::{RequestContext, RequestGuard};
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, warn};

use crate::environment::{TypeAlias, UnitSetup, WorkerEnvironment};
use crate::pool::UnitPool;
use crate::registry::FunctionRegistry;
use crate::transport::{MessageSink, MessageSource};
use crate::unit::InvocationOutcome;

/// Name reported to the host in worker metadata.
pub const RUNTIME_NAME: &str = "funcworker";

/// Dispatcher behavior.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// How invocations are scheduled.
    pub mode: DispatchMode,
    /// Concurrent mode: invocations admitted at once.
    pub max_in_flight: usize,
    /// Capabilities advertised on worker init.
    pub capabilities: BTreeMap<String, String>,
    /// Startup profile looked up in the function-app root.
    pub profile_file_name: String,
    /// Type aliases registered when the pool initializes.
    pub type_aliases: Vec<TypeAlias>,
    /// Metadata reported on worker init.
    pub worker_metadata: WorkerMetadata,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Sequential,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            capabilities: BTreeMap::new(),
            profile_file_name: "profile".to_owned(),
            type_aliases: Vec::new(),
            worker_metadata: WorkerMetadata {
                runtime_name: RUNTIME_NAME.to_owned(),
                runtime_version: None,
                worker_version: env!("CARGO_PKG_VERSION").to_owned(),
            },
        }
    }
}

/// The protocol loop.
///
/// Cloning is cheap; clones share the registry and the pool.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<FunctionRegistry>,
    pool: UnitPool,
    settings: Arc<DispatcherSettings>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry and the pool built on it.
    #[must_use]
    pub fn new(registry: Arc<FunctionRegistry>, pool: UnitPool, settings: DispatcherSettings) -> Self {
        Self {
            registry,
            pool,
            settings: Arc::new(settings),
        }
    }

    /// The function registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// The execution unit pool.
    #[must_use]
    pub fn pool(&self) -> &UnitPool {
        &self.pool
    }

    /// Run until the inbound stream closes.
    ///
    /// In-flight invocations are awaited and the pool is closed before
    /// returning, on every path.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ProtocolViolation`] for an unexpected message
    /// kind and [`WorkerError::Transport`] for stream failures.
    pub async fn run<S>(&self, mut source: S, sink: Arc<dyn MessageSink>) -> WorkerResult<()>
    where
        S: MessageSource,
    {
        info!(mode = %self.settings.mode, "Dispatcher started");

        let mut in_flight = JoinSet::new();
        let mut result = self.pump(&mut source, &sink, &mut in_flight).await;

        while let Some(joined) = in_flight.join_next().await {
            let outcome = flatten_join(joined);
            if result.is_ok() {
                result = outcome;
            }
        }

        self.pool.close().await;

        match &result {
            Ok(()) => info!("Inbound stream closed, dispatcher stopped"),
            Err(e) => error!(error = %e, "Dispatcher stopped on fatal error"),
        }
        result
    }

    async fn pump<S>(
        &self,
        source: &mut S,
        sink: &Arc<dyn MessageSink>,
        in_flight: &mut JoinSet<WorkerResult<()>>,
    ) -> WorkerResult<()>
    where
        S: MessageSource,
    {
        while let Some(message) = source.next_message().await? {
            let StreamingMessage {
                request_id,
                content,
            } = message;

            match content {
                Content::WorkerInitRequest(request) => {
                    let guard =
                        RequestGuard::new(RequestContext::new(&request_id, "workerInitRequest"));
                    let response = self.handle_worker_init(&request_id, &request);
                    sink.send(response).instrument(guard.span().clone()).await?;
                },
                Content::FunctionLoadRequest(request) => {
                    let guard = RequestGuard::new(
                        RequestContext::new(&request_id, "functionLoadRequest")
                            .with_function_id(&request.function_id),
                    );
                    let span = guard.span().clone();
                    let response = self
                        .handle_function_load(&request_id, &request)
                        .instrument(span.clone())
                        .await;
                    sink.send(response).instrument(span).await?;
                },
                Content::InvocationRequest(request) => match self.settings.mode {
                    DispatchMode::Sequential => {
                        self.dispatch_invocation(request_id, request, Arc::clone(sink))
                            .await?;
                    },
                    DispatchMode::Concurrent => {
                        while in_flight.len() >= self.settings.max_in_flight.max(1) {
                            debug!(
                                in_flight = in_flight.len(),
                                "In-flight limit reached, waiting"
                            );
                            if let Some(joined) = in_flight.join_next().await {
                                flatten_join(joined)?;
                            }
                        }
                        let this = self.clone();
                        let sink = Arc::clone(sink);
                        in_flight.spawn(async move {
                            this.dispatch_invocation(request_id, request, sink).await
                        });
                    },
                },
                Content::Malformed {
                    kind,
                    payload,
                    reason,
                } => {
                    warn!(
                        request_id = %request_id,
                        kind = %kind,
                        reason = %reason,
                        "Malformed request payload"
                    );
                    let response = reject_malformed(&request_id, kind, &payload, reason)?;
                    sink.send(response).await?;
                },
                Content::Unrecognized { kind } => {
                    error!(request_id = %request_id, kind = %kind, "Unrecognized message kind");
                    return Err(WorkerError::ProtocolViolation(format!(
                        "unrecognized message kind '{kind}'"
                    )));
                },
                other => {
                    let kind = other
                        .kind()
                        .map_or_else(|| "unknown".to_owned(), |k| k.to_string());
                    error!(request_id = %request_id, kind = %kind, "Response kind received from host");
                    return Err(WorkerError::ProtocolViolation(format!(
                        "unexpected inbound message kind '{kind}'"
                    )));
                },
            }

            while let Some(joined) = in_flight.try_join_next() {
                flatten_join(joined)?;
            }
        }
        Ok(())
    }

    fn handle_worker_init(&self, request_id: &str, request: &WorkerInitRequest) -> StreamingMessage {
        info!(
            host_version = %request.host_version,
            host_capabilities = request.capabilities.len(),
            "Worker init"
        );
        let mut metadata = self.settings.worker_metadata.clone();
        if metadata.runtime_version.is_none() {
            metadata.runtime_version = self.pool.runtime_version();
        }
        StreamingMessage::new(
            request_id,
            Content::WorkerInitResponse(WorkerInitResponse {
                capabilities: self.settings.capabilities.clone(),
                worker_metadata: Some(metadata),
                result: StatusResult::success(),
            }),
        )
    }

    async fn handle_function_load(
        &self,
        request_id: &str,
        request: &FunctionLoadRequest,
    ) -> StreamingMessage {
        let result = self.load_function(request).await;
        if let Err(e) = &result {
            warn!(
                function_id = %request.function_id,
                kind = %e.kind(),
                error = %e,
                "Function load failed"
            );
        }
        StreamingMessage::new(
            request_id,
            Content::FunctionLoadResponse(FunctionLoadResponse {
                function_id: request.function_id.clone(),
                result: StatusResult::from_result(&result),
            }),
        )
    }

    async fn load_function(&self, request: &FunctionLoadRequest) -> WorkerResult<()> {
        let metadata = FunctionMetadata::from_load_request(request)?;

        if !self.pool.is_initialized() {
            let function_id = metadata.function_id.clone();
            let environment =
                WorkerEnvironment::resolve(&metadata, &self.settings.profile_file_name)?;
            let setup =
                UnitSetup::new(environment).with_type_aliases(self.settings.type_aliases.clone());
            self.pool
                .initialize(setup)
                .await
                .map_err(|e| match e {
                    WorkerError::LoadError { .. } => e,
                    other => WorkerError::load(function_id, other),
                })?;
        }

        self.registry.register(metadata)?;
        Ok(())
    }

    async fn dispatch_invocation(
        &self,
        request_id: String,
        request: InvocationRequest,
        sink: Arc<dyn MessageSink>,
    ) -> WorkerResult<()> {
        let guard = RequestGuard::new(
            RequestContext::new(&request_id, "invocationRequest")
                .with_invocation_id(&request.invocation_id)
                .with_function_id(&request.function_id),
        );
        let span = guard.span().clone();
        let response = self
            .handle_invocation(&request_id, request)
            .instrument(span.clone())
            .await;
        sink.send(response).instrument(span).await
    }

    async fn handle_invocation(&self, request_id: &str, request: InvocationRequest) -> StreamingMessage {
        let result = self.invoke(&request).await;
        let response = match result {
            Ok(outcome) => InvocationResponse {
                invocation_id: request.invocation_id,
                output_data: outcome.output_data,
                return_value: outcome.return_value,
                result: StatusResult::success(),
            },
            Err(e) => {
                warn!(kind = %e.kind(), error = %e, "Invocation failed");
                InvocationResponse {
                    invocation_id: request.invocation_id,
                    output_data: Vec::new(),
                    return_value: None,
                    result: StatusResult::failure(&e),
                }
            },
        };
        StreamingMessage::new(request_id, Content::InvocationResponse(response))
    }

    async fn invoke(&self, request: &InvocationRequest) -> WorkerResult<InvocationOutcome> {
        let metadata = self.registry.lookup(&request.function_id)?;
        let mut lease = self.pool.checkout(&metadata).await?;
        let caught = AssertUnwindSafe(lease.invoke(&metadata, request))
            .catch_unwind()
            .await;
        match caught {
            Ok(result) => {
                self.pool.reclaim(Some(lease)).await;
                if result.is_ok() {
                    debug!("Invocation completed");
                }
                result
            },
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Engine panicked during invocation");
                self.pool.discard(lease).await;
                Err(WorkerError::engine(format!("engine panicked: {message}")))
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

/// Failed response for a request whose payload did not decode. Ids the
/// response must echo are read from the raw payload when present.
fn reject_malformed(
    request_id: &str,
    kind: MessageKind,
    payload: &serde_json::Value,
    reason: String,
) -> WorkerResult<StreamingMessage> {
    let field = |name: &str| {
        payload
            .get(name)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    let content = match kind {
        MessageKind::WorkerInitRequest => Content::WorkerInitResponse(WorkerInitResponse {
            capabilities: BTreeMap::new(),
            worker_metadata: None,
            result: StatusResult::failure(&WorkerError::MalformedRequest(reason)),
        }),
        MessageKind::FunctionLoadRequest => {
            let function_id = field("functionId");
            Content::FunctionLoadResponse(FunctionLoadResponse {
                result: StatusResult::failure(&WorkerError::load(&function_id, reason)),
                function_id,
            })
        },
        MessageKind::InvocationRequest => Content::InvocationResponse(InvocationResponse {
            invocation_id: field("invocationId"),
            output_data: Vec::new(),
            return_value: None,
            result: StatusResult::failure(&WorkerError::MalformedRequest(reason)),
        }),
        response_kind => {
            error!(request_id = %request_id, kind = %response_kind, "Response kind received from host");
            return Err(WorkerError::ProtocolViolation(format!(
                "unexpected inbound message kind '{response_kind}'"
            )));
        },
    };
    Ok(StreamingMessage::new(request_id, content))
}

fn flatten_join(joined: Result<WorkerResult<()>, tokio::task::JoinError>) -> WorkerResult<()> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            error!(error = %e, "Invocation task panicked");
            Ok(())
        },
        Err(e) => {
            warn!(error = %e, "Invocation task cancelled");
            Ok(())
        },
    }
}
