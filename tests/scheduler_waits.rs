#![allow(missing_docs)]
//! End-to-end coverage of the wait machinery: delivery, timeouts, the
//! prewait race, and poller lifecycle.

mod common;

use common::{init_test_logging, Lcg};
use proptest::collection::vec;
use proptest::prelude::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use weft::lab::VirtualClock;
use weft::sched::Scheduler;
use weft::{Value, WaitKey};

fn fixture() -> (Rc<VirtualClock>, Scheduler) {
    init_test_logging();
    let clock = VirtualClock::shared();
    let sched = Scheduler::new(clock.clone());
    (clock, sched)
}

#[test]
fn delivery_wins_a_same_tick_tie() {
    let (clock, sched) = fixture();
    let outcome = Rc::new(RefCell::new(None));
    let seen = outcome.clone();
    sched.spawn(Some("tied"), move |cx| async move {
        let delivered = cx
            .wait(WaitKey::from("tie"), Some(Duration::from_millis(10)))
            .await;
        *seen.borrow_mut() = Some(delivered);
        Ok(vec![])
    });

    // Both sides become ready in the same tick: the clock reaches the
    // timeout deadline, and a delivery arrives before the poller pass.
    clock.advance(10);
    assert_eq!(sched.resume(&WaitKey::from("tie"), vec![Value::Int(1)]), 1);
    sched.tick();

    assert_eq!(*outcome.borrow(), Some(Some(vec![Value::Int(1)])));
    assert_eq!(sched.pollable_count(), 0);
    assert_eq!(sched.callback_count(), 0);
}

#[test]
fn timeout_then_late_resume_is_inert() {
    let (clock, sched) = fixture();
    let outcome = Rc::new(Cell::new(None));
    let seen = outcome.clone();
    sched.spawn(None, move |cx| async move {
        let delivered = cx
            .wait(WaitKey::from("late"), Some(Duration::from_millis(5)))
            .await;
        seen.set(Some(delivered.is_some()));
        Ok(vec![])
    });

    clock.advance(5);
    sched.tick();
    assert_eq!(outcome.get(), Some(false));

    // The registration died with the timeout; nobody is listening.
    assert_eq!(sched.resume(&WaitKey::from("late"), vec![Value::Int(1)]), 0);
}

#[test]
fn sleepers_wake_in_deadline_order_across_ticks() {
    let (clock, sched) = fixture();
    let order = Rc::new(RefCell::new(Vec::new()));
    for (label, millis) in [("slow", 30u64), ("fast", 10), ("mid", 20)] {
        let order = order.clone();
        sched.spawn(Some(label), move |cx| async move {
            cx.sleep(Duration::from_millis(millis)).await;
            order.borrow_mut().push(label);
            Ok(vec![])
        });
    }
    for _ in 0..3 {
        clock.advance(10);
        sched.tick();
    }
    assert_eq!(*order.borrow(), vec!["fast", "mid", "slow"]);
    assert!(!sched.poller_active());
}

#[test]
fn waiters_on_distinct_keys_are_independent() {
    let (_clock, sched) = fixture();
    let hits = Rc::new(RefCell::new(Vec::new()));
    for key in ["alpha", "beta"] {
        let hits = hits.clone();
        sched.spawn(Some(key), move |cx| async move {
            let delivered = cx.wait(WaitKey::from(key), None).await;
            hits.borrow_mut().push((key, delivered));
            Ok(vec![])
        });
    }
    assert_eq!(sched.resume(&WaitKey::from("beta"), vec![Value::Int(2)]), 1);
    assert_eq!(*hits.borrow(), vec![("beta", Some(vec![Value::Int(2)]))]);
    assert_eq!(sched.resume(&WaitKey::from("alpha"), vec![Value::Int(1)]), 1);
    assert_eq!(sched.callback_count(), 0);
}

#[test]
fn poller_restarts_after_going_idle() {
    let (clock, sched) = fixture();
    let first = Rc::new(Cell::new(false));
    let flag = first.clone();
    sched.spawn(None, move |cx| async move {
        cx.sleep(Duration::from_millis(5)).await;
        flag.set(true);
        Ok(vec![])
    });
    clock.advance(5);
    sched.tick();
    assert!(first.get());
    assert!(!sched.poller_active());

    // A fresh registration lazily restarts it.
    let second = Rc::new(Cell::new(false));
    let flag = second.clone();
    sched.spawn(None, move |cx| async move {
        cx.sleep(Duration::from_millis(5)).await;
        flag.set(true);
        Ok(vec![])
    });
    assert!(sched.poller_active());
    clock.advance(5);
    sched.tick();
    assert!(second.get());
    assert!(!sched.poller_active());
}

#[test]
fn mass_parked_tasks_all_resume_then_registries_empty() {
    let (clock, sched) = fixture();
    let completed = Rc::new(Cell::new(0u32));
    let mut rng = Lcg(0x5EED);
    for _ in 0..1000 {
        let ticks = rng.next() % 25;
        let counter = completed.clone();
        sched.spawn(None, move |cx| async move {
            cx.cycle(ticks).await;
            counter.set(counter.get() + 1);
            Ok(vec![])
        });
    }
    let mut safety = 0;
    while sched.poller_active() {
        clock.advance(1);
        sched.tick();
        safety += 1;
        assert!(safety < 100, "poller failed to go idle");
    }
    assert_eq!(completed.get(), 1000);
    assert_eq!(sched.pollable_count(), 0);
    assert_eq!(sched.callback_count(), 0);
    assert_eq!(sched.task_count(), 0);
    assert_eq!(sched.stats().completed, 1000);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every registered waiter fires exactly once, in one `resume` call.
    #[test]
    fn resume_fires_each_waiter_exactly_once(
        waiters in 0usize..6,
        payload in vec(any::<i64>(), 0..4),
    ) {
        let (_clock, sched) = fixture();
        let hits = Rc::new(Cell::new(0usize));
        let args: Vec<Value> = payload.iter().copied().map(Value::Int).collect();
        for _ in 0..waiters {
            let hits = hits.clone();
            let expect = args.clone();
            sched.spawn(None, move |cx| async move {
                let delivered = cx.wait(WaitKey::from("prop"), None).await;
                assert_eq!(delivered, Some(expect));
                hits.set(hits.get() + 1);
                Ok(vec![])
            });
        }
        prop_assert_eq!(sched.resume(&WaitKey::from("prop"), args.clone()), waiters);
        prop_assert_eq!(hits.get(), waiters);
        // Consumed registrations never fire again.
        prop_assert_eq!(sched.resume(&WaitKey::from("prop"), args), 0);
        prop_assert_eq!(hits.get(), waiters);
    }

    /// A delivery that beats the wait is parked by prewait and handed over
    /// as soon as the wait happens, regardless of how many ticks pass in
    /// between.
    #[test]
    fn prewaited_delivery_survives_arbitrary_delay(
        delay_ticks in 0u64..5,
        value in any::<i64>(),
    ) {
        let (clock, sched) = fixture();
        let outcome = Rc::new(RefCell::new(None));
        let seen = outcome.clone();
        sched.spawn(None, move |cx| async move {
            cx.prewait(WaitKey::from("early"));
            cx.cycle(delay_ticks).await;
            let delivered = cx.wait(WaitKey::from("early"), None).await;
            *seen.borrow_mut() = Some(delivered);
            Ok(vec![])
        });
        prop_assert_eq!(sched.resume(&WaitKey::from("early"), vec![Value::Int(value)]), 0);
        for _ in 0..=delay_ticks + 1 {
            clock.advance(1);
            sched.tick();
        }
        prop_assert_eq!(outcome.borrow().clone(), Some(Some(vec![Value::Int(value)])));
    }
}
