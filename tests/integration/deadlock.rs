//! Deadlock detection and deep dependency chains

use super::test_utils::{engine, lookup};
use frameval::scheduler::report::render;
use frameval::{Attribute, Definition, ErrorKind, EvalError, SourceRef, Value};

#[test]
fn test_cycle_is_reported_while_unrelated_work_finishes() {
    let (scheduler, sink) = engine();
    let frame = scheduler.create_frame(SourceRef::native("root"), None, true);
    frame
        .define("a", Attribute::Lazy(Definition::lookup(&["b"])))
        .unwrap();
    frame
        .define("b", Attribute::Lazy(Definition::lookup(&["a"])))
        .unwrap();
    frame
        .define("c", Attribute::Lazy(Definition::constant(Value::Int(3))))
        .unwrap();
    frame.close();

    let a = lookup(&scheduler, frame.context(), "a");
    let c = lookup(&scheduler, frame.context(), "c");
    let drain = scheduler.run_to_completion();

    assert!(drain.deadlock);
    assert!(scheduler.deadlocked());
    assert!(a.is_pending());
    assert_eq!(c.value(), Some(Value::Int(3)));
    assert_eq!(frame.get("c"), Some(Value::Int(3)));
    assert_eq!(sink.kinds(), vec![ErrorKind::Deadlock]);

    match &sink.errors()[0] {
        EvalError::Deadlock { blocked, omitted } => {
            assert_eq!(*omitted, 0);
            assert!(blocked.len() >= 2);
            let waited: Vec<_> = blocked
                .iter()
                .filter_map(|lookup| lookup.attribute.clone())
                .collect();
            assert!(waited.contains(&"a".to_string()));
            assert!(waited.contains(&"b".to_string()));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(render(&sink.errors()[0]).starts_with("Circular evaluation detected"));
}

#[test]
fn test_self_reference_deadlocks() {
    let (scheduler, sink) = engine();
    let frame = scheduler.create_frame(SourceRef::native("root"), None, true);
    frame
        .define("me", Attribute::Lazy(Definition::lookup(&["me"])))
        .unwrap();
    frame.close();

    let drain = scheduler.run_to_completion();
    assert!(drain.deadlock);
    assert_eq!(sink.kinds(), vec![ErrorKind::Deadlock]);
}

#[test]
fn test_waiting_on_a_failure_is_not_a_deadlock() {
    let (scheduler, sink) = engine();
    let frame = scheduler.create_frame(SourceRef::native("root"), None, true);
    frame
        .define("broken", Attribute::Lazy(Definition::failure("No value here.")))
        .unwrap();
    frame
        .define("alias", Attribute::Lazy(Definition::lookup(&["broken"])))
        .unwrap();
    frame.close();

    let alias = lookup(&scheduler, frame.context(), "alias");
    let drain = scheduler.run_to_completion();

    assert!(!drain.deadlock);
    assert!(alias.is_pending());
    assert_eq!(sink.kinds(), vec![ErrorKind::Evaluation]);
}

#[test]
fn test_long_alias_chain_does_not_overflow() {
    const LENGTH: usize = 10_000;
    let (scheduler, sink) = engine();
    let frame = scheduler.create_frame(SourceRef::native("chain"), None, true);
    for i in 0..LENGTH {
        let name = format!("a{}", i);
        let next = format!("a{}", i + 1);
        frame
            .define(&name, Attribute::Lazy(Definition::lookup(&[next.as_str()])))
            .unwrap();
    }
    frame
        .define(
            &format!("a{}", LENGTH),
            Attribute::Lazy(Definition::constant(Value::str("end"))),
        )
        .unwrap();
    frame.close();

    let head = lookup(&scheduler, frame.context(), "a0");
    let drain = scheduler.run_to_completion();

    assert!(!drain.deadlock);
    assert_eq!(head.value(), Some(Value::str("end")));
    assert!(sink.is_empty());
    assert_eq!(scheduler.in_flight_count(), 0);
}
