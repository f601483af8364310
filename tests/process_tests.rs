//! Reduction behavior of the process engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ravel::env::Env;
use ravel::error::EffectError;
use ravel::process::{Process, Reduced};

fn collect_outputs<O: Clone + Send + 'static>(
    process: &Process<i32, O, String>,
    inputs: Vec<i32>,
) -> Result<Vec<O>, EffectError<String>> {
    process.reduce(
        inputs,
        Vec::new(),
        |mut acc, output| {
            acc.push(output);
            Reduced::Continue(acc)
        },
        &Env::new(),
    )
}

#[test]
fn lift_maps_each_input_to_one_output() {
    let process = Process::<i32, i32, String>::lift(|n| n * n);
    assert_eq!(collect_outputs(&process, vec![1, 2, 3]), Ok(vec![1, 4, 9]));
}

#[test]
fn filter_drops_rejected_outputs() {
    let process = Process::<i32, i32, String>::lift(|n| n).filter(|n| n % 2 == 0);
    assert_eq!(collect_outputs(&process, vec![1, 2, 3, 4]), Ok(vec![2, 4]));
}

#[test]
fn map_transforms_outputs() {
    let process = Process::<i32, i32, String>::lift(|n| n + 1).map(|n| n.to_string());
    assert_eq!(
        collect_outputs(&process, vec![1, 2]),
        Ok(vec!["2".to_string(), "3".to_string()])
    );
}

#[test]
fn compose_pipelines_left_to_right() {
    let double = Process::<i32, i32, String>::lift(|n| n * 2);
    let successor = Process::<i32, i32, String>::lift(|n| n + 1);
    let process = double.compose(successor);
    assert_eq!(collect_outputs(&process, vec![1, 2, 3]), Ok(vec![3, 5, 7]));
}

#[test]
fn bind_feeds_the_same_input_to_the_continuation() {
    let process = Process::<i32, i32, String>::lift(|n| n * 10)
        .bind(|tens| Process::lift(move |original: i32| tens + original));
    assert_eq!(collect_outputs(&process, vec![1, 2]), Ok(vec![11, 22]));
}

#[test]
fn fold_emits_the_running_accumulation() {
    let process = Process::<i32, i32, String>::lift(|n| n).fold(0, |acc, n| acc + n);
    assert_eq!(collect_outputs(&process, vec![1, 2, 3]), Ok(vec![1, 3, 6]));
}

#[test]
fn fold_result_is_the_last_emission() {
    let env = Env::new();
    let process = Process::<i32, i32, String>::lift(|n| n).fold(0, |acc, n| acc + n);
    let total = process.reduce(
        vec![1, 2, 3, 4],
        0,
        |_, latest| Reduced::Continue(latest),
        &env,
    );
    assert_eq!(total, Ok(10));
}

#[test]
fn reducer_complete_stops_early() {
    let env = Env::new();
    let process = Process::<i32, i32, String>::lift(|n| n);
    let outcome = process.reduce(
        vec![1, 2, 3, 4, 5],
        Vec::new(),
        |mut acc: Vec<i32>, n| {
            acc.push(n);
            if acc.len() == 2 {
                Reduced::Complete(acc)
            } else {
                Reduced::Continue(acc)
            }
        },
        &env,
    );
    assert_eq!(outcome, Ok(vec![1, 2]));
}

#[test]
fn reducer_failure_short_circuits() {
    let env = Env::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let probe = seen.clone();
    let process = Process::<i32, i32, String>::lift(move |n| {
        probe.fetch_add(1, Ordering::SeqCst);
        n
    });

    let outcome = process.reduce(
        vec![1, 2, 3, 4],
        (),
        |(), n| {
            if n == 2 {
                Reduced::Fail("two is forbidden".to_string())
            } else {
                Reduced::Continue(())
            }
        },
        &env,
    );
    assert_eq!(
        outcome,
        Err(EffectError::Failure("two is forbidden".to_string()))
    );
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn cancellation_terminates_the_reduction() {
    let env = Env::new();
    env.token().cancel();
    let touched = Arc::new(AtomicUsize::new(0));
    let probe = touched.clone();
    let process = Process::<i32, i32, String>::lift(move |n| {
        probe.fetch_add(1, Ordering::SeqCst);
        n
    });

    let outcome = process.reduce(vec![1, 2, 3], (), |(), _| Reduced::Continue(()), &env);
    assert_eq!(outcome, Err(EffectError::Cancelled));
    assert_eq!(touched.load(Ordering::SeqCst), 0);
}

#[test]
fn reductions_get_independent_step_state() {
    let process = Process::<i32, i32, String>::lift(|n| n).fold(0, |acc, n| acc + n);
    // Two reductions over the same description must not share the fold state.
    assert_eq!(collect_outputs(&process, vec![1, 2]), Ok(vec![1, 3]));
    assert_eq!(collect_outputs(&process, vec![1, 2]), Ok(vec![1, 3]));
}

#[test]
fn memo_replays_without_rerunning_the_step() {
    let runs = Arc::new(AtomicUsize::new(0));
    let probe = runs.clone();
    let process = Process::<i32, i32, String>::lift(move |n| {
        probe.fetch_add(1, Ordering::SeqCst);
        n * 2
    })
    .memo();

    assert_eq!(collect_outputs(&process, vec![7, 7, 7]), Ok(vec![14, 14, 14]));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // The cache survives into later reductions of the same process value.
    assert_eq!(collect_outputs(&process, vec![7]), Ok(vec![14]));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn run_many_defers_the_reduction_into_io() {
    let env = Env::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let probe = runs.clone();
    let process = Process::<i32, i32, String>::lift(move |n| {
        probe.fetch_add(1, Ordering::SeqCst);
        n
    });

    let io = process.run_many(vec![1, 2, 3], 0, |acc, n| Reduced::Continue(acc + n));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(io.run(&env), Ok(6));
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[test]
fn collect_gathers_every_output() {
    let env = Env::new();
    let process = Process::<i32, i32, String>::lift(|n| n + 100);
    assert_eq!(
        process.collect(vec![1, 2]).run(&env),
        Ok(vec![101, 102])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reduce_async_shares_the_reduction_contract() {
    let env = Env::new();
    let process = Process::<i32, i32, String>::lift(|n| n * 2);
    let outcome = process
        .reduce_async(
            vec![1, 2, 3],
            0,
            |acc, n| Reduced::Continue(acc + n),
            &env,
        )
        .await;
    assert_eq!(outcome, Ok(12));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn process_fork_offloads_the_reduction() {
    let env = Env::new();
    let process = Process::<i32, i32, String>::lift(|n| n * 3);
    let handle = process
        .fork(vec![1, 2, 3], None)
        .run_async(&env)
        .await
        .expect("fork should not fail");
    assert_eq!(handle.join().run_async(&env).await, Ok(vec![3, 6, 9]));
}
