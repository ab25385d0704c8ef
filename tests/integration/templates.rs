//! Template instantiation: overrides, site scope and template scope

use super::test_utils::{engine, lookup};
use frameval::frame::template::{Instantiation, Override};
use frameval::{Attribute, Definition, ErrorKind, Frame, Scheduler, SourceRef, Value};
use std::sync::Arc;

/// Library frame `lib` holding template `make`, nested in a site frame.
fn library_site(scheduler: &Scheduler) -> (Arc<Frame>, Arc<Frame>) {
    let library = scheduler.create_frame(SourceRef::native("library"), None, true);
    library
        .define("libraryOnly", Attribute::Value(Value::Int(5)))
        .unwrap();
    let template = library
        .template(
            SourceRef::native("make"),
            vec![
                ("fromTemplate", Definition::constant(Value::Int(7))),
                ("fromOverride", Definition::constant(Value::Int(1))),
                ("total", Definition::lookup(&["fromSite"])),
                ("shared", Definition::lookup(&["libraryOnly"])),
            ],
        )
        .unwrap();
    library
        .define("make", Attribute::Value(Value::Template(template)))
        .unwrap();

    let site = scheduler.create_frame(SourceRef::native("site"), None, true);
    site.define("fromSite", Attribute::Value(Value::Int(3)))
        .unwrap();
    site.define("lib", Attribute::Value(Value::Frame(library.id())))
        .unwrap();
    site.close();
    (library, site)
}

fn instantiate(scheduler: &Scheduler, instantiation: Instantiation) -> Arc<Frame> {
    let unit = instantiation.into_future(scheduler);
    unit.activate();
    scheduler.run_to_completion();
    let id = unit
        .value()
        .and_then(|value| value.as_frame())
        .expect("instantiation produced a frame");
    scheduler.frame(id).unwrap()
}

#[test]
fn test_instantiation_sees_site_template_and_override() {
    let (scheduler, sink) = engine();
    let (_library, site) = library_site(&scheduler);

    let instance = instantiate(
        &scheduler,
        Instantiation::new(
            SourceRef::native("instantiate make"),
            site.context().clone(),
            &["lib", "make"],
        )
        .with_override(
            "fromOverride",
            Override::Replace(Definition::constant(Value::Int(9))),
        ),
    );

    let results: Vec<_> = ["fromTemplate", "fromOverride", "total", "shared", "libraryOnly"]
        .iter()
        .map(|name| lookup(&scheduler, instance.context(), name))
        .collect();
    scheduler.run_to_completion();

    let values: Vec<_> = results.iter().map(|unit| unit.value()).collect();
    assert_eq!(
        values,
        vec![
            Some(Value::Int(7)),
            Some(Value::Int(9)),
            Some(Value::Int(3)),
            Some(Value::Int(5)),
            Some(Value::Int(5)),
        ]
    );
    assert!(sink.is_empty(), "unexpected errors: {:?}", sink.errors());
}

#[test]
fn test_each_instantiation_is_a_fresh_frame() {
    let (scheduler, _) = engine();
    let (_library, site) = library_site(&scheduler);
    let first = instantiate(
        &scheduler,
        Instantiation::new(SourceRef::native("first"), site.context().clone(), &["lib", "make"]),
    );
    let second = instantiate(
        &scheduler,
        Instantiation::new(SourceRef::native("second"), site.context().clone(), &["lib", "make"]),
    );
    assert_ne!(first.id(), second.id());
    assert_eq!(first.names(), second.names());
    assert_eq!(first.container(), site.id());
}

#[test]
fn test_instantiating_a_non_template_is_a_type_mismatch() {
    let (scheduler, sink) = engine();
    let (_library, site) = library_site(&scheduler);
    let unit = Instantiation::new(SourceRef::native("bad"), site.context().clone(), &["fromSite"])
        .into_future(&scheduler);
    unit.activate();
    scheduler.run_to_completion();

    assert!(unit.is_failed());
    assert_eq!(sink.kinds(), vec![ErrorKind::TypeMismatch]);
}

#[test]
fn test_wrapping_a_missing_attribute_is_reported() {
    let (scheduler, sink) = engine();
    let (_library, site) = library_site(&scheduler);
    let instance = instantiate(
        &scheduler,
        Instantiation::new(SourceRef::native("wrap"), site.context().clone(), &["lib", "make"])
            .with_override(
                "nonexistent",
                Override::wrap(SourceRef::native("wrapper"), |_, _, original| original),
            ),
    );

    assert!(instance.has("nonexistent"));
    assert!(instance.get("nonexistent").is_none());
    assert_eq!(sink.kinds(), vec![ErrorKind::Evaluation]);
    assert_eq!(sink.errors()[0].to_string(), "Override of non-existent attribute.");
}

#[test]
fn test_misspelled_template_is_not_a_deadlock() {
    let (scheduler, sink) = engine();
    let frame = scheduler.create_frame(SourceRef::native("root"), None, true);
    let instance = Definition::new(|scheduler, scope| {
        Instantiation::new(scope.source.clone(), scope.context.clone(), &["noSuchTemplate"])
            .into_future(scheduler)
    });
    frame.define("inst", Attribute::Lazy(instance)).unwrap();
    frame.close();

    let field = lookup(&scheduler, frame.context(), "inst.x");
    let drain = scheduler.run_to_completion();

    assert!(field.is_pending());
    assert!(!drain.deadlock);
    assert_eq!(sink.kinds(), vec![ErrorKind::NameNotFound]);
}
