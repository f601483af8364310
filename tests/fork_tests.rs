//! Background execution: fork, join, cancel, and fork timeouts.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use ravel::env::Env;
use ravel::error::EffectError;
use ravel::io::IO;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fork_then_join_yields_the_background_result() {
    let env = Env::new();
    let io = IO::<i32, String>::lift_async(|| async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        21
    })
    .fmap(|n| n * 2)
    .fork(None);

    let handle = io.run_async(&env).await.expect("fork should not fail");
    assert_eq!(handle.join().run_async(&env).await, Ok(42));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fork_returns_without_waiting_for_the_work() {
    let env = Env::new();
    let started = std::time::Instant::now();
    let io = IO::<(), String>::delay(Duration::from_millis(200)).fork(None);

    let handle = io.run_async(&env).await.expect("fork should not fail");
    assert!(started.elapsed() < Duration::from_millis(150));
    assert_eq!(handle.join().run_async(&env).await, Ok(()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn join_outcome_is_cached_across_observers() {
    let env = Env::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let probe = counter.clone();
    let io = IO::<usize, String>::lift(move || probe.fetch_add(1, Ordering::SeqCst) + 1)
        .fork(None);

    let handle = io.run_async(&env).await.expect("fork should not fail");
    let twin = handle.clone();
    assert_eq!(handle.join().run_async(&env).await, Ok(1));
    assert_eq!(twin.join().run_async(&env).await, Ok(1));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_stops_the_background_computation() {
    let env = Env::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let writer = log.clone();

    // Each iteration writes then pauses; the engine checks the cancellation
    // token before every lifted step, so no writes may land after the
    // cancellation point once the in-flight step finishes.
    let mut stage = IO::<(), String>::pure(());
    for index in 0..50 {
        let writer = writer.clone();
        stage = stage
            .then(IO::lift(move || writer.lock().push(index)))
            .then(IO::delay(Duration::from_millis(10)));
    }

    let handle = stage.fork(None).run_async(&env).await.expect("fork should not fail");
    tokio::time::sleep(Duration::from_millis(25)).await;
    assert_eq!(handle.cancel().run_async(&env).await, Ok(()));

    let outcome = handle.join().run_async(&env).await;
    assert_eq!(outcome, Err(EffectError::Cancelled));

    let written_at_cancel = log.lock().len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log.lock().len(), written_at_cancel);
    assert!(written_at_cancel < 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fork_timeout_resolves_join_to_timed_out() {
    let env = Env::new();
    let deadline = Duration::from_millis(20);
    let io = IO::<(), String>::delay(Duration::from_secs(5)).fork(Some(deadline));

    let handle = io.run_async(&env).await.expect("fork should not fail");
    assert_eq!(
        handle.join().run_async(&env).await,
        Err(EffectError::TimedOut(deadline))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fork_timeout_leaves_a_fast_computation_alone() {
    let env = Env::new();
    let io = IO::<i32, String>::pure(8).fork(Some(Duration::from_secs(1)));
    let handle = io.run_async(&env).await.expect("fork should not fail");
    assert_eq!(handle.join().run_async(&env).await, Ok(8));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn caller_cancellation_does_not_leak_into_the_fork() {
    let env = Env::new();
    let io = IO::<i32, String>::lift(|| 3).fork(None);
    let handle = io.run_async(&env).await.expect("fork should not fail");

    // Joining runs under the caller's environment; the background work
    // already ran under its own child token.
    let outcome = handle.join().run_async(&env).await;
    assert_eq!(outcome, Ok(3));
}

#[test]
fn fork_and_join_work_from_synchronous_code() {
    let env = Env::new();
    let handle = IO::<i32, String>::lift(|| 12)
        .fork(None)
        .run(&env)
        .expect("fork should not fail");
    assert_eq!(handle.join().run(&env), Ok(12));
}
