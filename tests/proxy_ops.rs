#![allow(missing_docs)]
//! End-to-end coverage of the proxy layer: resolve collapse, operation
//! forwarding, and round-trip counts.

mod common;

use common::init_test_logging;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use weft::lab::Router;
use weft::{proxy, Error, Value};

fn harness() -> Router {
    init_test_logging();
    Router::new()
}

/// Host calls per desynchronized round trip: the invocation plus the
/// delivery.
const CALLS_PER_TRIP: u64 = 2;

#[test]
fn resolve_at_home_is_free() {
    let router = harness();
    let a = router.add_instance();
    a.set_global("x", Value::Int(5));

    let resolved = a.resolve(Value::Handle(proxy(a.id(), "x")));
    assert_eq!(resolved, Value::Int(5));
    assert_eq!(router.calls(), 0);

    // A missing variable reads as null, still without leaving home.
    assert_eq!(a.resolve(Value::Handle(proxy(a.id(), "ghost"))), Value::Null);
    assert_eq!(router.calls(), 0);
}

#[test]
fn resolve_elsewhere_stays_wrapped() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    b.set_global("x", Value::Int(5));

    let resolved = a.resolve(Value::Handle(proxy(b.id(), "x")));
    match resolved {
        Value::Handle(handle) => {
            assert_eq!(handle.owner, b.id());
            assert_eq!(handle.key, "x");
        }
        other => panic!("expected a handle, got {other}"),
    }
    assert_eq!(router.calls(), 0);
}

#[test]
fn each_operation_is_one_round_trip() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let b_id = b.id();
    b.set_global("score", Value::Int(40));

    let results = Rc::new(RefCell::new(Vec::new()));
    let out = results.clone();
    a.spawn(Some("ops"), move |cx| async move {
        let score = cx.proxy(b_id, "score");
        out.borrow_mut().push(score.add(Value::Int(2)).await?);
        out.borrow_mut().push(score.mul(Value::Int(3)).await?);
        out.borrow_mut().push(score.load().await?);
        Ok(vec![])
    });

    router.run_until_settled(40, 1);
    assert_eq!(
        *results.borrow(),
        vec![Value::Int(42), Value::Int(120), Value::Int(40)]
    );
    assert_eq!(router.calls(), 3 * CALLS_PER_TRIP);
}

#[test]
fn store_and_mutation_are_visible_to_the_owner() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let b_id = b.id();
    b.set_global(
        "state",
        Value::Map(BTreeMap::from([("hp".to_owned(), Value::Int(10))])),
    );

    a.spawn(None, move |cx| async move {
        let state = cx.proxy(b_id, "state");
        state.set("hp", Value::Int(3)).await?;
        state.set("mp", Value::Int(7)).await?;
        let fresh = cx.proxy(b_id, "fresh");
        fresh.store(Value::from("written")).await?;
        Ok(vec![])
    });

    router.run_until_settled(40, 1);
    let state = b.global("state").expect("state exists");
    assert_eq!(state.index(&Value::from("hp")), Some(&Value::Int(3)));
    assert_eq!(state.index(&Value::from("mp")), Some(&Value::Int(7)));
    assert_eq!(b.global("fresh"), Some(Value::from("written")));
}

#[test]
fn comparison_concat_repr_and_len_forward() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let b_id = b.id();
    b.set_global("name", Value::from("weft"));
    b.set_global("n", Value::Int(4));

    let results = Rc::new(RefCell::new(Vec::new()));
    let out = results.clone();
    a.spawn(None, move |cx| async move {
        let name = cx.proxy(b_id, "name");
        let n = cx.proxy(b_id, "n");
        out.borrow_mut().push(Value::Bool(name.eq(Value::from("weft")).await?));
        out.borrow_mut().push(name.concat(Value::from("!")).await?);
        out.borrow_mut().push(Value::from(name.repr().await?));
        out.borrow_mut().push(name.len().await?);
        out.borrow_mut().push(Value::Bool(n.lt(Value::Int(5)).await?));
        out.borrow_mut().push(Value::Bool(n.le(Value::Int(4)).await?));
        out.borrow_mut().push(n.neg().await?);
        Ok(vec![])
    });

    router.run_until_settled(60, 1);
    assert_eq!(
        *results.borrow(),
        vec![
            Value::Bool(true),
            Value::from("weft!"),
            Value::from("weft"),
            Value::Int(4),
            Value::Bool(true),
            Value::Bool(true),
            Value::Int(-4),
        ]
    );
}

#[test]
fn get_reads_fields_and_missing_fields_are_null() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let b_id = b.id();
    b.set_global(
        "config",
        Value::Map(BTreeMap::from([("mode".to_owned(), Value::from("fast"))])),
    );

    let results = Rc::new(RefCell::new(Vec::new()));
    let out = results.clone();
    a.spawn(None, move |cx| async move {
        let config = cx.proxy(b_id, "config");
        out.borrow_mut().push(config.get("mode").await?);
        out.borrow_mut().push(config.get("absent").await?);
        Ok(vec![])
    });

    router.run_until_settled(40, 1);
    assert_eq!(*results.borrow(), vec![Value::from("fast"), Value::Null]);
}

#[test]
fn call_forwards_to_a_registered_function() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let b_id = b.id();
    b.register("greet", |_inst, args| {
        let who = args.first().and_then(Value::as_str).unwrap_or("nobody");
        Ok(Value::from(format!("hello {who}")))
    });
    b.set_global("greeter", Value::Func(b.func("greet")));

    let results = Rc::new(RefCell::new(None));
    let out = results.clone();
    a.spawn(None, move |cx| async move {
        let greeter = cx.proxy(b_id, "greeter");
        *out.borrow_mut() = Some(greeter.call(vec![Value::from("weft")]).await?);
        Ok(vec![])
    });

    router.run_until_settled(40, 1);
    assert_eq!(*results.borrow(), Some(Value::from("hello weft")));
}

#[test]
fn third_instance_operands_materialize_through_their_owner() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let c = router.add_instance();
    let (b_id, c_id) = (b.id(), c.id());
    b.set_global("x", Value::Int(30));
    c.set_global("y", Value::Int(12));

    let results = Rc::new(RefCell::new(None));
    let out = results.clone();
    a.spawn(None, move |cx| async move {
        let x = cx.proxy(b_id, "x");
        let y_handle = Value::Handle(proxy(c_id, "y"));
        *out.borrow_mut() = Some(x.add(y_handle).await?);
        Ok(vec![])
    });

    router.run_until_settled(60, 1);
    assert_eq!(*results.borrow(), Some(Value::Int(42)));
}

#[test]
fn owner_side_type_errors_come_back_as_remote_faults() {
    let router = harness();
    let a = router.add_instance();
    let b = router.add_instance();
    let b_id = b.id();
    b.set_global("name", Value::from("weft"));

    let caught = Rc::new(RefCell::new(None));
    let out = caught.clone();
    a.spawn(None, move |cx| async move {
        let name = cx.proxy(b_id, "name");
        match name.set("field", Value::Int(1)).await {
            Err(Error::Remote(value)) => *out.borrow_mut() = Some(value.to_string()),
            other => *out.borrow_mut() = Some(format!("unexpected: {other:?}")),
        }
        Ok(vec![])
    });

    router.run_until_settled(40, 1);
    let message = caught.borrow().clone().expect("caller never resumed");
    assert!(message.contains("set"), "got: {message}");
}

#[test]
fn operations_at_home_never_touch_the_host() {
    let router = harness();
    let a = router.add_instance();
    let a_id = a.id();
    a.set_global("local", Value::Int(10));

    let results = Rc::new(RefCell::new(None));
    let out = results.clone();
    a.spawn(None, move |cx| async move {
        let local = cx.proxy(a_id, "local");
        *out.borrow_mut() = Some(local.add(Value::Int(1)).await?);
        Ok(vec![])
    });

    // The operation completed during the spawn, without suspending.
    assert_eq!(*results.borrow(), Some(Value::Int(11)));
    assert_eq!(router.calls(), 0);
}
