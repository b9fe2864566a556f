//! Chain links - the type-erased wrappers the executor builds around steps

use crate::core::cancellation::CancellationToken;
use crate::core::outcome::Outcome;
use crate::core::step::{ContinuationStep, ErrorAwareStep, Next, ResultNext, TerminalStep};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// A step bound to everything inward of it
#[async_trait]
pub(crate) trait Link<Req, Res>: Send + Sync {
    async fn call(&self, request: Req, cancel: &CancellationToken) -> Outcome<Res>;
}

fn log_exit<Res>(stage: &str, outcome: &Outcome<Res>) {
    match outcome {
        Outcome::Ok(_) => debug!("Stage {} completed", stage),
        Outcome::Error(payload) if payload.is_cancelled() => {
            debug!("Stage {} cancelled", stage)
        }
        Outcome::Error(payload) => debug!("Stage {} failed: {:?}", stage, payload),
    }
}

/// Innermost link
pub(crate) struct TerminalLink<S, Req, Res> {
    step: S,
    trace: bool,
    _types: PhantomData<fn(Req) -> Res>,
}

impl<S, Req, Res> TerminalLink<S, Req, Res> {
    pub(crate) fn new(step: S, trace: bool) -> Self {
        Self {
            step,
            trace,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<S, Req, Res> Link<Req, Res> for TerminalLink<S, Req, Res>
where
    S: TerminalStep<Req, Res>,
    Req: Send + 'static,
    Res: Send + 'static,
{
    async fn call(&self, request: Req, cancel: &CancellationToken) -> Outcome<Res> {
        if cancel.is_cancelled() {
            debug!("Stage {} skipped: run cancelled", self.step.name());
            return Outcome::cancelled();
        }
        if self.trace {
            debug!("Entering terminal stage {}", self.step.name());
        }

        let outcome = self.step.handle(request, cancel).await;

        if self.trace {
            log_exit(self.step.name(), &outcome);
        }
        outcome
    }
}

/// Link around an error-blind step; downstream errors skip the step's result
pub(crate) struct ContinuationLink<S, Req, Res>
where
    S: ContinuationStep<Req, Res>,
{
    step: S,
    inner: Arc<dyn Link<S::NextRequest, S::NextResponse>>,
    trace: bool,
    _types: PhantomData<fn(Req) -> Res>,
}

impl<S, Req, Res> ContinuationLink<S, Req, Res>
where
    S: ContinuationStep<Req, Res>,
{
    pub(crate) fn new(
        step: S,
        inner: Arc<dyn Link<S::NextRequest, S::NextResponse>>,
        trace: bool,
    ) -> Self {
        Self {
            step,
            inner,
            trace,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<S, Req, Res> Link<Req, Res> for ContinuationLink<S, Req, Res>
where
    S: ContinuationStep<Req, Res>,
    Req: Send + 'static,
    Res: Send + 'static,
{
    async fn call(&self, request: Req, cancel: &CancellationToken) -> Outcome<Res> {
        if cancel.is_cancelled() {
            debug!("Stage {} skipped: run cancelled", self.step.name());
            return Outcome::cancelled();
        }
        if self.trace {
            debug!("Entering stage {}", self.step.name());
        }

        let tripped = Arc::new(OnceLock::new());
        let next = Next::new(self.inner.clone(), cancel.clone(), tripped.clone());
        let result = self.step.handle(request, next, cancel).await;

        let outcome = match tripped.get() {
            Some(downstream) => {
                if result.is_ok() {
                    warn!(
                        "Stage {} returned success after a downstream failure; propagating the failure",
                        self.step.name()
                    );
                }
                Outcome::Error(downstream.clone())
            }
            None => match result {
                Ok(value) => Outcome::Ok(value),
                Err(halt) => Outcome::Error(halt.into_payload()),
            },
        };

        if self.trace {
            log_exit(self.step.name(), &outcome);
        }
        outcome
    }
}

/// Link around a step that gets to see downstream outcomes
pub(crate) struct ErrorAwareLink<S, Req, Res>
where
    S: ErrorAwareStep<Req, Res>,
{
    step: S,
    inner: Arc<dyn Link<S::NextRequest, S::NextResponse>>,
    trace: bool,
    _types: PhantomData<fn(Req) -> Res>,
}

impl<S, Req, Res> ErrorAwareLink<S, Req, Res>
where
    S: ErrorAwareStep<Req, Res>,
{
    pub(crate) fn new(
        step: S,
        inner: Arc<dyn Link<S::NextRequest, S::NextResponse>>,
        trace: bool,
    ) -> Self {
        Self {
            step,
            inner,
            trace,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<S, Req, Res> Link<Req, Res> for ErrorAwareLink<S, Req, Res>
where
    S: ErrorAwareStep<Req, Res>,
    Req: Send + 'static,
    Res: Send + 'static,
{
    async fn call(&self, request: Req, cancel: &CancellationToken) -> Outcome<Res> {
        if cancel.is_cancelled() {
            debug!("Stage {} skipped: run cancelled", self.step.name());
            return Outcome::cancelled();
        }
        if self.trace {
            debug!("Entering error-aware stage {}", self.step.name());
        }

        let saw_cancellation = Arc::new(AtomicBool::new(false));
        let next = ResultNext::new(self.inner.clone(), cancel.clone(), saw_cancellation.clone());
        let mut outcome = self.step.handle(request, next, cancel).await;

        if saw_cancellation.load(Ordering::SeqCst)
            && !outcome.is_cancelled()
            && !self.step.recovers_cancellation()
        {
            warn!(
                "Stage {} tried to recover from a cancellation; keeping the run cancelled",
                self.step.name()
            );
            outcome = Outcome::cancelled();
        }

        if self.trace {
            log_exit(self.step.name(), &outcome);
        }
        outcome
    }
}
