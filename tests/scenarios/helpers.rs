//! Test utilities: recording steps for scenario tests

use async_trait::async_trait;
use pipechain::{
    CancellationToken, ContinuationStep, ErrorAwareStep, Halt, Next, Outcome, ResultNext,
    TerminalStep,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared, ordered log of what the steps did
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

/// Continuation step that records entry and (successful) exit
pub struct Passthrough {
    pub name: &'static str,
    pub journal: Journal,
}

impl Passthrough {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> ContinuationStep<T, T> for Passthrough {
    type NextRequest = T;
    type NextResponse = T;

    fn name(&self) -> &str {
        self.name
    }

    async fn handle(
        &self,
        request: T,
        next: Next<T, T>,
        _cancel: &CancellationToken,
    ) -> Result<T, Halt> {
        self.journal.record(format!("enter {}", self.name));
        let value = next.run(request).await?;
        self.journal.record(format!("exit {}", self.name));
        Ok(value)
    }
}

/// Continuation step that fails without calling `next`
pub struct Reject {
    pub name: &'static str,
    pub error: &'static str,
    pub journal: Journal,
}

#[async_trait]
impl<T: Send + 'static> ContinuationStep<T, T> for Reject {
    type NextRequest = T;
    type NextResponse = T;

    fn name(&self) -> &str {
        self.name
    }

    async fn handle(
        &self,
        _request: T,
        _next: Next<T, T>,
        _cancel: &CancellationToken,
    ) -> Result<T, Halt> {
        self.journal.record(format!("reject {}", self.name));
        Err(Halt::error(self.error))
    }
}

/// Continuation step that tries to hide a downstream failure
pub struct Swallow {
    pub fallback: u32,
    pub journal: Journal,
}

#[async_trait]
impl ContinuationStep<u32, u32> for Swallow {
    type NextRequest = u32;
    type NextResponse = u32;

    fn name(&self) -> &str {
        "swallow"
    }

    async fn handle(
        &self,
        request: u32,
        next: Next<u32, u32>,
        _cancel: &CancellationToken,
    ) -> Result<u32, Halt> {
        match next.run(request).await {
            Ok(value) => Ok(value),
            Err(_) => {
                // Second call must not reach the inner chain again
                let again = next.run(request).await;
                self.journal.record(format!("swallow retry ok={}", again.is_ok()));
                Ok(self.fallback)
            }
        }
    }
}

/// Error-aware step that substitutes a fallback for any domain error
pub struct Fallback {
    pub name: &'static str,
    pub value: u32,
    pub journal: Journal,
    pub recover_cancellation: bool,
}

impl Fallback {
    pub fn new(name: &'static str, value: u32, journal: &Journal) -> Self {
        Self {
            name,
            value,
            journal: journal.clone(),
            recover_cancellation: false,
        }
    }
}

#[async_trait]
impl ErrorAwareStep<u32, u32> for Fallback {
    type NextRequest = u32;
    type NextResponse = u32;

    fn name(&self) -> &str {
        self.name
    }

    fn recovers_cancellation(&self) -> bool {
        self.recover_cancellation
    }

    async fn handle(
        &self,
        request: u32,
        next: ResultNext<u32, u32>,
        _cancel: &CancellationToken,
    ) -> Outcome<u32> {
        match next.run(request).await {
            Outcome::Ok(value) => {
                self.journal.record(format!("{} saw ok", self.name));
                Outcome::ok(value)
            }
            Outcome::Error(payload) => {
                self.journal.record(format!("{} saw {:?}", self.name, payload));
                Outcome::ok(self.value)
            }
        }
    }
}

/// Terminal step with a scripted outcome per call
pub struct Scripted {
    pub name: &'static str,
    pub script: Vec<Outcome<u32>>,
    pub calls: Arc<AtomicUsize>,
    pub journal: Journal,
}

impl Scripted {
    pub fn new(name: &'static str, script: Vec<Outcome<u32>>, journal: &Journal) -> Self {
        Self {
            name,
            script,
            calls: Arc::new(AtomicUsize::new(0)),
            journal: journal.clone(),
        }
    }

    pub fn always(name: &'static str, outcome: Outcome<u32>, journal: &Journal) -> Self {
        Self::new(name, vec![outcome], journal)
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl TerminalStep<u32, u32> for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn handle(&self, request: u32, _cancel: &CancellationToken) -> Outcome<u32> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.record(format!("{} got {}", self.name, request));
        let index = call.min(self.script.len() - 1);
        self.script[index].clone()
    }
}

/// Terminal step that waits for cancellation or `delay`, whichever is first
pub struct Slow {
    pub delay: Duration,
}

#[async_trait]
impl TerminalStep<u32, u32> for Slow {
    async fn handle(&self, request: u32, cancel: &CancellationToken) -> Outcome<u32> {
        tokio::select! {
            _ = cancel.cancelled() => Outcome::cancelled(),
            _ = tokio::time::sleep(self.delay) => Outcome::ok(request),
        }
    }
}
