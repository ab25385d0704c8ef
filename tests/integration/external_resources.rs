//! External resources resolved during a full evaluation run

use frameval::config::EngineConfig;
use frameval::run::{Evaluation, Outcome};
use frameval::scheduler::external::LibraryResolver;
use frameval::scheduler::report::CollectingSink;
use frameval::{Attribute, Definition, ErrorKind, Future, SourceRef, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// An entry unit whose root frame has `value` bound to `definition`.
fn entry(evaluation: &Evaluation, definition: Definition) -> Future {
    let scheduler = evaluation.scheduler().clone();
    Future::new(evaluation.scheduler(), move |this: &Future| {
        let root = scheduler.create_frame(SourceRef::native("root"), None, true);
        if root
            .define("value", Attribute::Lazy(definition.clone()))
            .is_ok()
        {
            root.close();
            this.complete(Value::Frame(root.id()));
        }
    })
}

fn external(uri: &'static str) -> Definition {
    Definition::new(move |scheduler, _scope| scheduler.resolve_external(uri))
}

fn file_config(root: &TempDir, threaded: bool) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.resolvers.files = true;
    config.resolvers.file_root = Some(root.path().to_path_buf());
    config.resolvers.file_threads = threaded;
    config
}

#[test]
fn test_file_read_on_worker_thread() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("motto.txt"), "lazy by default").unwrap();
    let sink = Arc::new(CollectingSink::default());
    let evaluation = Evaluation::new(file_config(&dir, true), sink.clone()).unwrap();

    let unit = entry(&evaluation, external("file:motto.txt"));
    let outcome = evaluation.run(unit);

    assert_eq!(outcome, Outcome::Value(Value::str("lazy by default")));
    assert!(sink.is_empty());
}

#[test]
fn test_file_read_inline() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested").join("n.txt"), "12").unwrap();
    let sink = Arc::new(CollectingSink::default());
    let evaluation = Evaluation::new(file_config(&dir, false), sink).unwrap();

    let unit = entry(&evaluation, external("file:nested/n.txt"));
    assert_eq!(evaluation.run(unit), Outcome::Value(Value::str("12")));
}

#[test]
fn test_missing_file_fails_the_run_once() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(CollectingSink::default());
    let evaluation = Evaluation::new(file_config(&dir, true), sink.clone()).unwrap();

    let unit = entry(&evaluation, external("file:absent.txt"));
    let outcome = evaluation.run(unit);

    assert_eq!(
        outcome,
        Outcome::Failed {
            errors: 1,
            deadlock: false
        }
    );
    assert_eq!(sink.kinds(), vec![ErrorKind::ExternalResource]);
    assert_eq!(
        sink.errors()[0].to_string(),
        "The URI “file:absent.txt” could not be found."
    );
}

#[test]
fn test_files_disabled_leaves_name_unclaimed() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("motto.txt"), "unused").unwrap();
    let sink = Arc::new(CollectingSink::default());
    let evaluation = Evaluation::new(EngineConfig::default(), sink.clone()).unwrap();

    let unit = entry(&evaluation, external("file:motto.txt"));
    assert!(!evaluation.run(unit).is_success());
    assert_eq!(sink.kinds(), vec![ErrorKind::ExternalResource]);
}

#[test]
fn test_library_resource_built_per_run() {
    let sink = Arc::new(CollectingSink::default());
    let evaluation = Evaluation::new(EngineConfig::default(), sink.clone()).unwrap();
    let library = Arc::new(LibraryResolver::new());
    library.register("config/answer", |scheduler| {
        let frame = scheduler.create_frame(SourceRef::native("answer library"), None, true);
        frame
            .define("answer", Attribute::Lazy(Definition::constant(Value::Int(42))))
            .ok();
        frame.close();
        Future::ready(scheduler, Value::Frame(frame.id()))
    });
    evaluation.scheduler().add_resolver(library);

    let scheduler = evaluation.scheduler().clone();
    let unit = Future::new(evaluation.scheduler(), move |this: &Future| {
        let root = scheduler.create_frame(SourceRef::native("root"), None, true);
        let defined = root
            .define("lib", Attribute::Lazy(external("lib:config/answer")))
            .and_then(|_| root.define("value", Attribute::Lazy(Definition::lookup(&["lib", "answer"]))));
        if defined.is_ok() {
            root.close();
            this.complete(Value::Frame(root.id()));
        }
    });

    assert_eq!(evaluation.run(unit), Outcome::Value(Value::Int(42)));
    assert!(sink.is_empty());
}
