use class_scene::callgraph::{CallGraph, InvokeKind};
use class_scene::classpath::{Classpath, MODULE_PATH_PLACEHOLDER};
use class_scene::config::SceneOptions;
use class_scene::error::SceneError;
use class_scene::locator::{ClassFileReader, ClassLocator, LocatorProvider};
use class_scene::model::{ClassDescriptor, MethodDescriptor, Modifiers, Partition, ResolutionLevel};
use class_scene::numberer::{ArrayNumberer, Numberer};
use class_scene::scene::Scene;
use class_scene::source::{ClassDefinition, MemoryProvider, MethodDefinition};
use std::path::PathBuf;
use std::sync::Arc;

fn jdk_provider() -> MemoryProvider {
    MemoryProvider::new()
        .with_class(ClassDefinition::new("java.lang.Object"))
        .with_class(ClassDefinition::new("java.lang.String").extends("java.lang.Object"))
        .with_class(
            ClassDefinition::new("java.lang.Runnable").with_modifiers(Modifiers::PUBLIC | Modifiers::INTERFACE),
        )
        .with_class(
            ClassDefinition::new("java.lang.Thread")
                .extends("java.lang.Object")
                .implements("java.lang.Runnable"),
        )
}

fn scene_over(provider: MemoryProvider) -> Scene {
    Scene::new(
        SceneOptions {
            allow_phantom_refs: true,
            ..SceneOptions::default()
        },
        Arc::new(provider),
    )
}

#[test]
fn added_classes_are_found_and_duplicates_rejected() -> anyhow::Result<()> {
    let scene = scene_over(MemoryProvider::new());
    for name in ["a.A", "a.b.B", "Top", "a.'class'.C"] {
        scene.add_class(Arc::new(ClassDescriptor::new(name)))?;
        let found = scene.get_class(name).expect("class was just added");
        assert_eq!(found.name(), name);
        assert!(found.is_in_scene());

        let again = scene.add_class(Arc::new(ClassDescriptor::new(name)));
        assert!(matches!(again, Err(SceneError::DuplicateClass(ref n)) if n == name));
    }
    Ok(())
}

#[test]
fn partitions_cover_every_class_exactly_once() -> anyhow::Result<()> {
    let scene = scene_over(jdk_provider());
    assert!(scene.registry().partitions_consistent());

    let thread = scene.resolve_class("java.lang.Thread", ResolutionLevel::Signatures)?;
    assert!(scene.registry().partitions_consistent());
    scene.get_class_or_phantom("org.missing.Gone")?;
    assert!(scene.registry().partitions_consistent());
    scene.registry().reclassify(&thread, Partition::Application)?;
    assert!(scene.registry().partitions_consistent());

    let total = scene.registry().application_classes().len()
        + scene.registry().library_classes().len()
        + scene.registry().phantom_classes().len();
    assert_eq!(total, scene.registry().len());
    Ok(())
}

#[test]
fn resolving_lower_never_downgrades() -> anyhow::Result<()> {
    let scene = scene_over(jdk_provider());
    scene.resolve_class("java.lang.Thread", ResolutionLevel::Bodies)?;
    for level in [ResolutionLevel::Signatures, ResolutionLevel::Hierarchy, ResolutionLevel::Dangling] {
        let thread = scene.resolve_class("java.lang.Thread", level)?;
        assert_eq!(thread.level(), ResolutionLevel::Bodies);
    }
    Ok(())
}

#[test]
fn modular_runtime_placeholder_serves_object() -> anyhow::Result<()> {
    let classpath = Classpath::new(vec![PathBuf::from(MODULE_PATH_PLACEHOLDER)]);
    let provider = LocatorProvider::new(ClassLocator::new(classpath), ClassFileReader);
    let scene = Scene::new(SceneOptions::default(), Arc::new(provider));

    let object = scene.resolve_class("java.lang.Object", ResolutionLevel::Hierarchy)?;
    assert!(object.level() >= ResolutionLevel::Hierarchy);
    assert!(object.is_library_class());
    assert_eq!(scene.registry().partition_of("java.lang.Object"), Some(Partition::Library));
    Ok(())
}

#[test]
fn missing_runtime_classes_are_not_invented() -> anyhow::Result<()> {
    let runtime_scene = |allow_phantom_refs| {
        let classpath = Classpath::new(vec![PathBuf::from(MODULE_PATH_PLACEHOLDER)]);
        let provider = LocatorProvider::new(ClassLocator::new(classpath), ClassFileReader);
        Scene::new(
            SceneOptions {
                allow_phantom_refs,
                ..SceneOptions::default()
            },
            Arc::new(provider),
        )
    };

    let strict = runtime_scene(false);
    let err = strict.resolve_class("java.lang.NoSuchClassAnywhere", ResolutionLevel::Hierarchy);
    assert!(matches!(err, Err(SceneError::ClassNotFound(ref n)) if n == "java.lang.NoSuchClassAnywhere"));
    let runnable = strict.resolve_class("java.lang.Runnable", ResolutionLevel::Hierarchy)?;
    assert!(runnable.modifiers().is_interface());

    let lenient = runtime_scene(true);
    let missing = lenient.resolve_class("java.lang.NoSuchClassAnywhere", ResolutionLevel::Hierarchy)?;
    assert!(missing.is_phantom());
    assert_eq!(
        lenient.registry().partition_of("java.lang.NoSuchClassAnywhere"),
        Some(Partition::Phantom)
    );
    Ok(())
}

#[test]
fn bulk_load_without_basic_classes_fails() {
    let scene = scene_over(jdk_provider());
    scene.clear_basic_classes();
    assert!(matches!(scene.load_necessary_classes(), Err(SceneError::NoBasicClassesLoaded)));
}

#[test]
fn numbering_is_stable() -> anyhow::Result<()> {
    let mut numberer: ArrayNumberer<String> = ArrayNumberer::new();
    let id = numberer.add("void run()".to_string());
    assert_eq!(numberer.index_of(&"void run()".to_string()), Some(id));
    assert_eq!(numberer.add("void run()".to_string()), id);
    assert_eq!(numberer.len(), 1);

    let scene = scene_over(jdk_provider());
    let object = scene.resolve_class("java.lang.Object", ResolutionLevel::Hierarchy)?;
    let mut classes = scene.numberers().classes();
    let first = classes.index_of(&object).expect("registered classes are numbered");
    assert_eq!(classes.add(object.clone()), first);
    Ok(())
}

#[test]
fn re_added_class_does_not_inherit_the_old_number() -> anyhow::Result<()> {
    let scene = scene_over(MemoryProvider::new());
    let old = Arc::new(ClassDescriptor::new("a.A"));
    let old_id = scene.add_class(old.clone())?;
    scene.remove_class(&old)?;
    assert!(!old.is_in_scene());

    let replacement = Arc::new(ClassDescriptor::new("a.A"));
    let new_id = scene.add_class(replacement.clone())?;
    assert_ne!(old_id, new_id);

    let classes = scene.numberers().classes();
    assert!(classes.get(old_id).is_none());
    assert!(classes.get(new_id).is_some_and(|c| Arc::ptr_eq(&c, &replacement)));
    Ok(())
}

#[test]
fn reachable_methods_are_idempotent() -> anyhow::Result<()> {
    let scene = scene_over(jdk_provider());
    let method = |class: &str, name: &str| Arc::new(MethodDescriptor::new(class, &MethodDefinition::new(name, &[], "void")));
    let (run, start, helper) = (
        method("java.lang.Thread", "run"),
        method("java.lang.Thread", "start"),
        method("java.lang.Thread", "helper"),
    );
    let graph = Arc::new(CallGraph::new());
    graph.add_edge(start.clone(), run.clone(), InvokeKind::Thread);
    graph.add_edge(run.clone(), helper, InvokeKind::Virtual);
    scene.cache().set_call_graph(graph);
    scene.set_entry_points(vec![start]);

    let first = scene.reachable_methods()?;
    let second = scene.reachable_methods()?;
    assert_eq!(first.len(), 3);
    assert_eq!(first.len(), second.len());
    Ok(())
}

#[test]
fn concurrent_resolution_registers_each_class_once() -> anyhow::Result<()> {
    let scene = Arc::new(scene_over(jdk_provider()));
    let names = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    scene
                        .resolve_class("java.lang.Thread", ResolutionLevel::Signatures)
                        .map(|c| c.name().to_string())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("resolver thread panicked"))
            .collect::<Result<Vec<_>, _>>()
    })?;

    assert!(names.iter().all(|n| n == "java.lang.Thread"));
    assert_eq!(scene.registry().len(), 3);
    assert!(scene.registry().partitions_consistent());
    assert_eq!(scene.numberers().classes().len(), 3);
    Ok(())
}
