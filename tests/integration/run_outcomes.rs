//! End-to-end runs and their outcomes

use frameval::config::EngineConfig;
use frameval::run::{Evaluation, Outcome};
use frameval::scheduler::report::CollectingSink;
use frameval::{Attribute, Definition, ErrorKind, Future, SourceRef, Value};
use std::sync::Arc;

fn evaluation(config: EngineConfig) -> (Evaluation, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::default());
    (Evaluation::new(config, sink.clone()).unwrap(), sink)
}

/// Entry unit whose root frame is filled by `build`.
fn entry<F>(evaluation: &Evaluation, build: F) -> Future
where
    F: Fn(&frameval::Frame) + Send + 'static,
{
    let scheduler = evaluation.scheduler().clone();
    Future::new(evaluation.scheduler(), move |this: &Future| {
        let root = scheduler.create_frame(SourceRef::native("root"), None, true);
        build(root.as_ref());
        root.close();
        this.complete(Value::Frame(root.id()));
    })
}

#[test]
fn test_nested_result_path() {
    let mut config = EngineConfig::default();
    config.scheduler.result_path = "output.text".to_string();
    let (evaluation, sink) = evaluation(config);
    let scheduler = evaluation.scheduler().clone();
    let unit = entry(&evaluation, move |root| {
        let output = scheduler.create_frame(SourceRef::native("output"), Some(root.context()), true);
        output
            .define("text", Attribute::Lazy(Definition::lookup(&["greeting"])))
            .unwrap();
        root.define("greeting", Attribute::Value(Value::str("hello")))
            .unwrap();
        root.define("output", Attribute::Value(Value::Frame(output.id())))
            .unwrap();
    });

    let outcome = evaluation.run(unit);
    assert_eq!(outcome.render().as_deref(), Some("hello"));
    assert_eq!(
        outcome.to_json(),
        serde_json::json!({ "result": "hello" })
    );
    assert!(sink.is_empty());
}

#[test]
fn test_missing_result_attribute() {
    let (evaluation, sink) = evaluation(EngineConfig::default());
    let unit = entry(&evaluation, |root| {
        root.define("other", Attribute::Value(Value::Int(1))).unwrap();
    });

    let outcome = evaluation.run(unit);
    assert_eq!(
        outcome.to_json(),
        serde_json::json!({ "errors": 1, "deadlock": false })
    );
    assert_eq!(sink.kinds(), vec![ErrorKind::NameNotFound]);
}

#[test]
fn test_entry_that_is_not_a_frame() {
    let (evaluation, sink) = evaluation(EngineConfig::default());
    let unit = Future::ready(evaluation.scheduler(), Value::Int(5));
    let outcome = evaluation.run(unit);
    assert!(!outcome.is_success());
    assert_eq!(sink.kinds(), vec![ErrorKind::Evaluation]);
}

#[test]
fn test_failure_elsewhere_fails_the_run() {
    let (evaluation, sink) = evaluation(EngineConfig::default());
    let unit = entry(&evaluation, |root| {
        root.define("value", Attribute::Value(Value::Int(1))).unwrap();
        root.define("unused", Attribute::Lazy(Definition::failure("Broken on purpose.")))
            .unwrap();
    });

    let outcome = evaluation.run(unit);
    assert_eq!(
        outcome,
        Outcome::Failed {
            errors: 1,
            deadlock: false
        }
    );
    assert_eq!(sink.kinds(), vec![ErrorKind::Evaluation]);
}

#[test]
fn test_deadlock_report_limit_is_honoured() {
    let mut config = EngineConfig::default();
    config.scheduler.deadlock_report_limit = 1;
    let (evaluation, sink) = evaluation(config);
    let unit = entry(&evaluation, |root| {
        root.define("value", Attribute::Lazy(Definition::lookup(&["a"])))
            .unwrap();
        root.define("a", Attribute::Lazy(Definition::lookup(&["b"])))
            .unwrap();
        root.define("b", Attribute::Lazy(Definition::lookup(&["a"])))
            .unwrap();
    });

    match evaluation.run(unit) {
        Outcome::Failed { deadlock, errors } => {
            assert!(deadlock);
            assert_eq!(errors, 1);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    match &sink.errors()[..] {
        [frameval::EvalError::Deadlock { blocked, omitted }] => {
            assert_eq!(blocked.len(), 1);
            assert!(*omitted >= 2);
        }
        other => panic!("unexpected errors: {:?}", other),
    }
}
