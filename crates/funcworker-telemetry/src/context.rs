//! Per-message tracing scope.
//!
//! Every inbound host message gets a [`RequestContext`] keyed by the
//! protocol request id. Invocations also carry their invocation and
//! function ids, so interleaved concurrent invocations stay apart in the
//! logs.

use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};

/// Correlation data for one inbound host message.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Protocol request id, echoed on the response.
    pub request_id: String,
    /// Wire name of the message kind.
    pub kind: &'static str,
    /// Invocation id, for invocation requests.
    pub invocation_id: Option<String>,
    /// Target function, for load and invocation requests.
    pub function_id: Option<String>,
    /// Wall-clock receive time.
    pub received_at: DateTime<Utc>,
    started: Instant,
}

impl RequestContext {
    /// Context for a message of `kind`.
    #[must_use]
    pub fn new(request_id: impl Into<String>, kind: &'static str) -> Self {
        Self {
            request_id: request_id.into(),
            kind,
            invocation_id: None,
            function_id: None,
            received_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Attach the invocation id.
    #[must_use]
    pub fn with_invocation_id(mut self, id: impl Into<String>) -> Self {
        self.invocation_id = Some(id.into());
        self
    }

    /// Attach the function id.
    #[must_use]
    pub fn with_function_id(mut self, id: impl Into<String>) -> Self {
        self.function_id = Some(id.into());
        self
    }

    /// Time since the message was received.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Span carrying the correlation fields.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "message",
            request_id = %self.request_id,
            kind = self.kind,
            invocation_id = self.invocation_id.as_deref(),
            function_id = self.function_id.as_deref(),
        )
    }
}

/// Scope for one message: logs receipt on creation and completion on drop.
///
/// The guard does not enter its span. Async handlers attach it with
/// [`tracing::Instrument`], which keeps the guard `Send` across `.await`.
#[derive(Debug)]
pub struct RequestGuard {
    context: RequestContext,
    span: tracing::Span,
}

impl RequestGuard {
    /// Open the scope for `context`.
    #[must_use]
    pub fn new(context: RequestContext) -> Self {
        let span = context.span();
        span.in_scope(|| {
            tracing::debug!(
                received_at = %context.received_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                "Message received"
            );
        });
        Self { context, span }
    }

    /// The guarded context.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// The span to instrument handler futures with.
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let elapsed_ms = u64::try_from(self.context.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.span
            .in_scope(|| tracing::debug!(elapsed_ms, "Message handled"));
    }
}
