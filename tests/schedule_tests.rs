//! Schedule combinators observed through the repeat/retry drivers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ravel::env::Env;
use ravel::io::IO;
use ravel::schedule::Schedule;

fn counting_action() -> (Arc<AtomicUsize>, IO<usize, String>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let probe = counter.clone();
    let io = IO::lift(move || probe.fetch_add(1, Ordering::SeqCst) + 1);
    (counter, io)
}

#[test]
fn recurs_three_drives_four_executions() {
    let env = Env::new();
    let (counter, action) = counting_action();
    assert_eq!(action.repeat(Schedule::recurs(3)).run(&env), Ok(4));
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[test]
fn never_means_a_single_execution() {
    let env = Env::new();
    let (counter, action) = counting_action();
    assert_eq!(action.repeat(Schedule::never()).run(&env), Ok(1));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn intersection_bounds_an_infinite_schedule() {
    let env = Env::new();
    let (counter, action) = counting_action();

    // Spaced alone never terminates; the finite operand caps it at 2 delays,
    // so the driver performs 1 initial + 2 repeated executions.
    let bounded = Schedule::spaced(Duration::ZERO) & Schedule::recurs(2);
    assert_eq!(action.repeat(bounded).run(&env), Ok(3));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn intersection_keeps_the_longer_delay() {
    let slow = Schedule::from_delays(vec![Duration::from_millis(30)]);
    let fast = Schedule::from_delays(vec![
        Duration::from_millis(1),
        Duration::from_millis(1),
    ]);
    let delays: Vec<_> = (slow & fast).delays().collect();
    assert_eq!(delays, vec![Duration::from_millis(30)]);
}

#[test]
fn union_keeps_the_shorter_delay() {
    let slow = Schedule::spaced(Duration::from_millis(30));
    let fast = Schedule::from_delays(vec![
        Duration::from_millis(1),
        Duration::from_millis(2),
    ]);
    let delays: Vec<_> = (slow | fast).delays().collect();
    assert_eq!(
        delays,
        vec![Duration::from_millis(1), Duration::from_millis(2)]
    );
}

#[test]
fn concatenation_runs_both_schedules_out() {
    let env = Env::new();
    let (counter, action) = counting_action();

    let chained = Schedule::recurs(1).then(Schedule::recurs(2));
    assert_eq!(action.repeat(chained).run(&env), Ok(4));
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[test]
fn retry_attempts_track_the_schedule_length() {
    let env = Env::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let probe = counter.clone();
    let flaky = IO::<usize, String>::lift_result(move || {
        Err(format!("attempt {}", probe.fetch_add(1, Ordering::SeqCst) + 1))
    });

    let bounded = Schedule::spaced(Duration::ZERO) & Schedule::recurs(2);
    let outcome = flaky.retry(bounded).run(&env);
    assert!(outcome.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn schedules_are_reusable_across_drivers() {
    let env = Env::new();
    let schedule = Schedule::recurs(2);

    let (first_counter, first_action) = counting_action();
    let (second_counter, second_action) = counting_action();

    assert_eq!(first_action.repeat(schedule.clone()).run(&env), Ok(3));
    assert_eq!(second_action.repeat(schedule).run(&env), Ok(3));
    assert_eq!(first_counter.load(Ordering::SeqCst), 3);
    assert_eq!(second_counter.load(Ordering::SeqCst), 3);
}
