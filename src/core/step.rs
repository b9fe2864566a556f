//! Step contracts
//!
//! A pipeline is made of three kinds of step:
//!
//! - [`TerminalStep`]: the innermost link, produces an [`Outcome`] on its own.
//! - [`ContinuationStep`]: may transform the request and call [`Next`]. It only
//!   ever sees downstream *success* values; a downstream error bypasses it.
//! - [`ErrorAwareStep`]: calls [`ResultNext`] and gets the full downstream
//!   [`Outcome`], so it can recover, translate or re-propagate failures.
//!
//! Delegates are handed out per invocation by the executor. Steps keep no
//! reference to what runs after them.

use crate::core::cancellation::CancellationToken;
use crate::core::outcome::{ErrorPayload, ErrorValue, Outcome};
use crate::execution::link::Link;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Innermost step of a pipeline
#[async_trait]
pub trait TerminalStep<Req, Res>: Send + Sync {
    /// Name used in logs and [`Pipeline::stages`](crate::execution::Pipeline::stages)
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, request: Req, cancel: &CancellationToken) -> Outcome<Res>;
}

/// Error-blind step that delegates to the rest of the chain
#[async_trait]
pub trait ContinuationStep<Req, Res>: Send + Sync {
    /// Request type the next stage expects
    type NextRequest: Send + 'static;
    /// Success type the next stage produces
    type NextResponse: Send + 'static;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handle `request`, usually by calling `next.run(..).await?`.
    ///
    /// If downstream fails, `next.run` returns a [`Halt`] and the downstream
    /// error is what the pipeline sees, whatever this method returns.
    async fn handle(
        &self,
        request: Req,
        next: Next<Self::NextRequest, Self::NextResponse>,
        cancel: &CancellationToken,
    ) -> Result<Res, Halt>;
}

/// Step that observes the full outcome of the rest of the chain
#[async_trait]
pub trait ErrorAwareStep<Req, Res>: Send + Sync {
    type NextRequest: Send + 'static;
    type NextResponse: Send + 'static;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether a cancellation seen from downstream may be turned into
    /// something else. Off by default: the run stays cancelled no matter
    /// what [`handle`](Self::handle) returns.
    fn recovers_cancellation(&self) -> bool {
        false
    }

    async fn handle(
        &self,
        request: Req,
        next: ResultNext<Self::NextRequest, Self::NextResponse>,
        cancel: &CancellationToken,
    ) -> Outcome<Res>;
}

/// Early exit from a [`ContinuationStep`]
///
/// Either the step raised its own error with [`Halt::error`], or the
/// delegate stopped because downstream failed. The payload is not
/// inspectable here; only error-aware steps get to look at failures.
pub struct Halt {
    payload: ErrorPayload,
}

impl fmt::Debug for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The payload stays hidden from error-blind steps
        f.write_str("Halt")
    }
}

impl Halt {
    /// Fail the current step with `error`
    pub fn error<E: ErrorValue>(error: E) -> Self {
        Self {
            payload: ErrorPayload::new(error),
        }
    }

    /// Stop because the run was cancelled
    pub fn cancelled() -> Self {
        Self::error(crate::core::outcome::Cancelled)
    }

    pub(crate) fn into_payload(self) -> ErrorPayload {
        self.payload
    }
}

/// Continuation delegate for [`ContinuationStep`]s
pub struct Next<Req, Res> {
    chain: Arc<dyn Link<Req, Res>>,
    cancel: CancellationToken,
    tripped: Arc<OnceLock<ErrorPayload>>,
}

impl<Req: Send + 'static, Res: Send + 'static> Next<Req, Res> {
    pub(crate) fn new(
        chain: Arc<dyn Link<Req, Res>>,
        cancel: CancellationToken,
        tripped: Arc<OnceLock<ErrorPayload>>,
    ) -> Self {
        Self {
            chain,
            cancel,
            tripped,
        }
    }

    /// Run the rest of the chain and unwrap its success value
    pub async fn run(&self, request: Req) -> Result<Res, Halt> {
        if let Some(payload) = self.tripped.get() {
            // Downstream already failed during this invocation
            return Err(Halt {
                payload: payload.clone(),
            });
        }

        let outcome = call_checked(&*self.chain, request, &self.cancel).await;

        match outcome {
            Outcome::Ok(value) => Ok(value),
            Outcome::Error(payload) => {
                let halt = Halt {
                    payload: payload.clone(),
                };
                let _ = self.tripped.set(payload);
                Err(halt)
            }
        }
    }
}

/// Run `chain` unless the run is cancelled, checking again once it returns.
///
/// A cancellation raised while the chain was in flight wins over whatever
/// the chain produced.
async fn call_checked<Req, Res>(
    chain: &dyn Link<Req, Res>,
    request: Req,
    cancel: &CancellationToken,
) -> Outcome<Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    if cancel.is_cancelled() {
        return Outcome::cancelled();
    }
    let outcome = chain.call(request, cancel).await;
    if cancel.is_cancelled() && !outcome.is_cancelled() {
        return Outcome::cancelled();
    }
    outcome
}

/// Continuation delegate for [`ErrorAwareStep`]s
pub struct ResultNext<Req, Res> {
    chain: Arc<dyn Link<Req, Res>>,
    cancel: CancellationToken,
    saw_cancellation: Arc<AtomicBool>,
}

impl<Req: Send + 'static, Res: Send + 'static> ResultNext<Req, Res> {
    pub(crate) fn new(
        chain: Arc<dyn Link<Req, Res>>,
        cancel: CancellationToken,
        saw_cancellation: Arc<AtomicBool>,
    ) -> Self {
        Self {
            chain,
            cancel,
            saw_cancellation,
        }
    }

    /// Run the rest of the chain and return its outcome as-is
    pub async fn run(&self, request: Req) -> Outcome<Res> {
        let outcome = call_checked(&*self.chain, request, &self.cancel).await;

        if outcome.is_cancelled() {
            self.saw_cancellation.store(true, Ordering::SeqCst);
        }
        outcome
    }
}

// Shared steps

#[async_trait]
impl<Req, Res, S> TerminalStep<Req, Res> for Arc<S>
where
    S: TerminalStep<Req, Res> + ?Sized,
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn handle(&self, request: Req, cancel: &CancellationToken) -> Outcome<Res> {
        (**self).handle(request, cancel).await
    }
}

#[async_trait]
impl<Req, Res, S> ContinuationStep<Req, Res> for Arc<S>
where
    S: ContinuationStep<Req, Res> + ?Sized,
    Req: Send + 'static,
    Res: Send + 'static,
{
    type NextRequest = S::NextRequest;
    type NextResponse = S::NextResponse;

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn handle(
        &self,
        request: Req,
        next: Next<Self::NextRequest, Self::NextResponse>,
        cancel: &CancellationToken,
    ) -> Result<Res, Halt> {
        (**self).handle(request, next, cancel).await
    }
}

#[async_trait]
impl<Req, Res, S> ErrorAwareStep<Req, Res> for Arc<S>
where
    S: ErrorAwareStep<Req, Res> + ?Sized,
    Req: Send + 'static,
    Res: Send + 'static,
{
    type NextRequest = S::NextRequest;
    type NextResponse = S::NextResponse;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn recovers_cancellation(&self) -> bool {
        (**self).recovers_cancellation()
    }

    async fn handle(
        &self,
        request: Req,
        next: ResultNext<Self::NextRequest, Self::NextResponse>,
        cancel: &CancellationToken,
    ) -> Outcome<Res> {
        (**self).handle(request, next, cancel).await
    }
}

// Closure steps

/// Terminal step backed by a closure, see [`terminal_fn`]
pub struct TerminalFn<F> {
    name: String,
    f: F,
}

/// Wrap `f(request, cancel)` as a [`TerminalStep`]
pub fn terminal_fn<Req, Res, F, Fut>(name: impl Into<String>, f: F) -> TerminalFn<F>
where
    F: Fn(Req, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome<Res>> + Send,
{
    TerminalFn {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<Req, Res, F, Fut> TerminalStep<Req, Res> for TerminalFn<F>
where
    F: Fn(Req, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome<Res>> + Send,
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, request: Req, cancel: &CancellationToken) -> Outcome<Res> {
        (self.f)(request, cancel.clone()).await
    }
}

/// Continuation step backed by a closure, see [`continuation_fn`]
pub struct ContinuationFn<F, NextReq, NextRes> {
    name: String,
    f: F,
    _next: PhantomData<fn(NextReq) -> NextRes>,
}

/// Wrap `f(request, next, cancel)` as a [`ContinuationStep`]
pub fn continuation_fn<Req, Res, NextReq, NextRes, F, Fut>(
    name: impl Into<String>,
    f: F,
) -> ContinuationFn<F, NextReq, NextRes>
where
    F: Fn(Req, Next<NextReq, NextRes>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Res, Halt>> + Send,
{
    ContinuationFn {
        name: name.into(),
        f,
        _next: PhantomData,
    }
}

#[async_trait]
impl<Req, Res, NextReq, NextRes, F, Fut> ContinuationStep<Req, Res>
    for ContinuationFn<F, NextReq, NextRes>
where
    F: Fn(Req, Next<NextReq, NextRes>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Res, Halt>> + Send,
    Req: Send + 'static,
    Res: Send + 'static,
    NextReq: Send + 'static,
    NextRes: Send + 'static,
{
    type NextRequest = NextReq;
    type NextResponse = NextRes;

    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        request: Req,
        next: Next<NextReq, NextRes>,
        cancel: &CancellationToken,
    ) -> Result<Res, Halt> {
        (self.f)(request, next, cancel.clone()).await
    }
}

/// Error-aware step backed by a closure, see [`error_aware_fn`]
pub struct ErrorAwareFn<F, NextReq, NextRes> {
    name: String,
    f: F,
    _next: PhantomData<fn(NextReq) -> NextRes>,
}

/// Wrap `f(request, next, cancel)` as an [`ErrorAwareStep`]
pub fn error_aware_fn<Req, Res, NextReq, NextRes, F, Fut>(
    name: impl Into<String>,
    f: F,
) -> ErrorAwareFn<F, NextReq, NextRes>
where
    F: Fn(Req, ResultNext<NextReq, NextRes>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome<Res>> + Send,
{
    ErrorAwareFn {
        name: name.into(),
        f,
        _next: PhantomData,
    }
}

#[async_trait]
impl<Req, Res, NextReq, NextRes, F, Fut> ErrorAwareStep<Req, Res>
    for ErrorAwareFn<F, NextReq, NextRes>
where
    F: Fn(Req, ResultNext<NextReq, NextRes>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome<Res>> + Send,
    Req: Send + 'static,
    Res: Send + 'static,
    NextReq: Send + 'static,
    NextRes: Send + 'static,
{
    type NextRequest = NextReq;
    type NextResponse = NextRes;

    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        request: Req,
        next: ResultNext<NextReq, NextRes>,
        cancel: &CancellationToken,
    ) -> Outcome<Res> {
        (self.f)(request, next, cancel.clone()).await
    }
}
