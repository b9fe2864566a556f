//! Test: pass-through, onion ordering and short-circuiting

use crate::helpers::*;
use pipechain::{
    continuation_fn, terminal_fn, CancellationToken, Halt, Next, Outcome, Pipeline,
    PipelineSettings, Stage,
};
use std::sync::atomic::Ordering;

/// A success from the terminal step comes out of `run` unchanged, whatever the depth
#[tokio::test]
async fn test_pass_through_law() {
    for depth in 0..5 {
        let journal = Journal::new();
        let mut stages: Vec<Stage<u32, u32>> = (0..depth)
            .map(|_| Stage::continuation(Passthrough::new("p", &journal)))
            .collect();
        stages.push(Stage::terminal(Scripted::always("leaf", Outcome::ok(99), &journal)));

        let pipeline = Pipeline::from_stages(PipelineSettings::default(), stages).unwrap();
        let outcome = pipeline.run(5, &CancellationToken::new()).await;

        assert_eq!(outcome, Outcome::ok(99), "depth {}", depth);
    }
}

/// Steps run outermost-first on the way in, innermost-first on the way out
#[tokio::test]
async fn test_onion_ordering() {
    let journal = Journal::new();
    let pipeline = Pipeline::<u32, u32>::builder()
        .step(Passthrough::new("a", &journal))
        .step(Passthrough::new("b", &journal))
        .terminal(Scripted::always("leaf", Outcome::ok(1), &journal));

    assert_eq!(pipeline.stages(), ["a", "b", "leaf"]);
    assert_eq!(pipeline.run(1, &CancellationToken::new()).await, Outcome::ok(1));
    assert_eq!(
        journal.entries(),
        ["enter a", "enter b", "leaf got 1", "exit b", "exit a"]
    );
}

/// An error raised by a continuation step stops everything inward of it
#[tokio::test]
async fn test_short_circuit_law() {
    let journal = Journal::new();
    let leaf = Scripted::always("leaf", Outcome::ok(1), &journal);
    let leaf_calls = leaf.calls();

    let pipeline = Pipeline::<u32, u32>::builder()
        .step(Passthrough::new("a", &journal))
        .step(Reject {
            name: "r",
            error: "denied",
            journal: journal.clone(),
        })
        .step(Passthrough::new("c", &journal))
        .terminal(leaf);

    let outcome = pipeline.run(1, &CancellationToken::new()).await;

    assert_eq!(outcome, Outcome::error("denied"));
    assert_eq!(leaf_calls.load(Ordering::SeqCst), 0);
    assert_eq!(journal.entries(), ["enter a", "reject r"]);
}

/// A terminal failure travels out through continuation steps without their
/// post-processing running
#[tokio::test]
async fn test_downstream_error_bypasses_continuation_steps() {
    let journal = Journal::new();
    let pipeline = Pipeline::<u32, u32>::builder()
        .step(Passthrough::new("a", &journal))
        .step(Passthrough::new("b", &journal))
        .terminal(Scripted::always("leaf", Outcome::error("boom"), &journal));

    let outcome = pipeline.run(3, &CancellationToken::new()).await;

    assert_eq!(outcome, Outcome::error("boom"));
    assert_eq!(journal.entries(), ["enter a", "enter b", "leaf got 3"]);
}

/// A continuation step that ignores the halt still can't hide the failure
#[tokio::test]
async fn test_continuation_step_cannot_swallow_downstream_error() {
    let journal = Journal::new();
    let leaf = Scripted::always("leaf", Outcome::error("boom"), &journal);
    let leaf_calls = leaf.calls();

    let pipeline = Pipeline::<u32, u32>::builder()
        .step(Swallow {
            fallback: 0,
            journal: journal.clone(),
        })
        .terminal(leaf);

    let outcome = pipeline.run(3, &CancellationToken::new()).await;

    assert_eq!(outcome, Outcome::error("boom"));
    // The retry short-circuited without reaching the leaf
    assert_eq!(leaf_calls.load(Ordering::SeqCst), 1);
    assert!(journal.entries().contains(&"swallow retry ok=false".to_string()));
}

#[derive(Debug, PartialEq)]
struct QuotaExceeded {
    limit: u32,
}

/// Stages may fail with unrelated error types; each arrives intact
#[tokio::test]
async fn test_heterogeneous_error_types_arrive_intact() {
    let pipeline = Pipeline::<u32, u32>::builder()
        .step(continuation_fn(
            "quota",
            |n: u32, next: Next<u32, u32>, _cancel| async move {
                if n > 10 {
                    return Err(Halt::error(QuotaExceeded { limit: 10 }));
                }
                let value = next.run(n).await?;
                Ok(value)
            },
        ))
        .terminal(terminal_fn("leaf", |n: u32, _cancel| async move {
            if n == 0 {
                Outcome::error(String::from("zero"))
            } else {
                Outcome::ok(n)
            }
        }));

    let cancel = CancellationToken::new();

    let quota = pipeline.run(11, &cancel).await;
    let payload = quota.error_payload().unwrap();
    assert_eq!(payload.downcast_ref::<QuotaExceeded>(), Some(&QuotaExceeded { limit: 10 }));
    assert!(!payload.is::<String>());

    let zero = pipeline.run(0, &cancel).await;
    assert_eq!(zero, Outcome::error(String::from("zero")));

    assert_eq!(pipeline.run(4, &cancel).await, Outcome::ok(4));
}

/// A step may call `next` more than once when downstream succeeds
#[tokio::test]
async fn test_step_may_call_next_repeatedly() {
    let journal = Journal::new();
    let leaf = Scripted::always("leaf", Outcome::ok(2), &journal);
    let leaf_calls = leaf.calls();

    let pipeline = Pipeline::<u32, u32>::builder()
        .step(continuation_fn(
            "sum-twice",
            |n: u32, next: Next<u32, u32>, _cancel| async move {
                let first = next.run(n).await?;
                let second = next.run(n + 1).await?;
                Ok::<_, Halt>(first + second)
            },
        ))
        .terminal(leaf);

    assert_eq!(pipeline.run(1, &CancellationToken::new()).await, Outcome::ok(4));
    assert_eq!(leaf_calls.load(Ordering::SeqCst), 2);
    assert_eq!(journal.entries(), ["leaf got 1", "leaf got 2"]);
}
