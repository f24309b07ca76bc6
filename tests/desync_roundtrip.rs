#![allow(missing_docs)]
//! End-to-end coverage of the desynchronization protocol between
//! instances wired through the lab router.

mod common;

use common::init_test_logging;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use weft::lab::Router;
use weft::{Error, InstanceId, Value, DELIVER_FN};

fn harness() -> Router {
    init_test_logging();
    Router::new()
}

#[test]
fn double_round_trips_in_one_suspend_resume_cycle() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let b_id = b.id();

    b.register_desync("double", |_cx, args| async move {
        let n = args
            .first()
            .and_then(Value::as_int)
            .ok_or_else(|| Error::Unsupported {
                op: "double".to_owned(),
                operands: "non-integer".to_owned(),
            })?;
        Ok(Value::Int(n * 2))
    });

    let result = Rc::new(RefCell::new(None));
    let out = result.clone();
    a.spawn(Some("caller"), move |cx| async move {
        let values = cx.desync_call(b_id, "double", vec![Value::Int(21)]).await?;
        *out.borrow_mut() = Some(values);
        Ok(vec![])
    });

    // The ack came back synchronously; the body needs B's next tick.
    assert_eq!(*result.borrow(), None);
    let ticks = router.run_until_settled(20, 1);
    assert!(ticks < 20, "scenario failed to settle");
    assert_eq!(*result.borrow(), Some(vec![Value::Int(42)]));

    // The correlation key was consumed with the delivery; replaying the
    // delivery fires nothing.
    let replay = a
        .invoke(
            DELIVER_FN,
            vec![
                Value::from(format!("{b_id}#0")),
                Value::Bool(true),
                Value::Int(42),
            ],
        )
        .unwrap();
    assert_eq!(replay, Value::Int(0));
}

#[test]
fn serving_body_runs_one_tick_after_the_ack() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let b_id = b.id();

    let body_ran = Rc::new(Cell::new(false));
    let flag = body_ran.clone();
    b.register_desync("observe", move |_cx, _args| {
        let flag = flag.clone();
        async move {
            flag.set(true);
            Ok(Value::Null)
        }
    });

    a.spawn(None, move |cx| async move {
        cx.desync_call(b_id, "observe", vec![]).await?;
        Ok(vec![])
    });

    // Phase 1 happened during the spawn: the caller holds the key, parked,
    // but the body has not run.
    assert!(!body_ran.get());
    router.tick_all(1);
    assert!(body_ran.get());
}

#[test]
fn remote_failure_is_reraised_at_the_caller() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let b_id = b.id();

    b.register_desync("explode", |_cx, _args| async {
        Err(Error::Unsupported {
            op: "explode".to_owned(),
            operands: "everything".to_owned(),
        })
    });

    let caught = Rc::new(RefCell::new(None));
    let out = caught.clone();
    a.spawn(None, move |cx| async move {
        match cx.desync_call(b_id, "explode", vec![]).await {
            Ok(_) => *out.borrow_mut() = Some("ok".to_owned()),
            Err(Error::Remote(value)) => *out.borrow_mut() = Some(value.to_string()),
            Err(other) => *out.borrow_mut() = Some(format!("unexpected: {other}")),
        }
        Ok(vec![])
    });

    router.run_until_settled(20, 1);
    let message = caught.borrow().clone().expect("caller never resumed");
    assert!(message.contains("explode"), "got: {message}");
}

#[test]
fn unknown_function_surfaces_synchronously() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let b_id = b.id();

    let caught = Rc::new(RefCell::new(None));
    let out = caught.clone();
    a.spawn(None, move |cx| async move {
        let err = cx
            .desync_call(b_id, "missing", vec![])
            .await
            .expect_err("function does not exist");
        *out.borrow_mut() = Some(err);
        Ok(vec![])
    });

    assert!(matches!(
        caught.borrow().as_ref(),
        Some(Error::UnknownFunction { name, .. }) if name == "missing"
    ));
}

#[test]
fn unreachable_target_surfaces_synchronously() {
    let router = harness();
    let a = router.add_instance();
    let ghost = InstanceId::new(999);

    let caught = Rc::new(RefCell::new(None));
    let out = caught.clone();
    a.spawn(None, move |cx| async move {
        let err = cx
            .desync_call(ghost, "anything", vec![])
            .await
            .expect_err("target does not exist");
        *out.borrow_mut() = Some(err);
        Ok(vec![])
    });

    assert!(matches!(
        caught.borrow().as_ref(),
        Some(Error::Unreachable(id)) if *id == ghost
    ));
}

#[test]
fn concurrent_calls_keep_their_correlation_keys_apart() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let b_id = b.id();

    b.register_desync("echo", |_cx, args| async move {
        Ok(args.into_iter().next().unwrap_or(Value::Null))
    });

    let results = Rc::new(RefCell::new(Vec::new()));
    for n in 0..5i64 {
        let out = results.clone();
        a.spawn(None, move |cx| async move {
            let values = cx.desync_call(b_id, "echo", vec![Value::Int(n)]).await?;
            out.borrow_mut().push((n, values));
            Ok(vec![])
        });
    }

    router.run_until_settled(30, 1);
    let results = results.borrow();
    assert_eq!(results.len(), 5);
    for (n, values) in results.iter() {
        assert_eq!(values, &vec![Value::Int(*n)]);
    }
}

#[test]
fn desync_handlers_reject_direct_invocation_without_identity() {
    let router = harness();
    let b = router.add_instance();
    b.register_desync("guarded", |_cx, _args| async { Ok(Value::Null) });

    let err = b.invoke("guarded", vec![]).expect_err("identity missing");
    assert!(matches!(err, Error::Malformed { .. }));
}
