//! The scene: one analysis session's classes, class path and cached results.
//!
//! A [`Scene`] is an explicit context object. It wires the [`ClassRegistry`], the
//! [`Resolver`] and the [`AnalysisCache`] together and drives bulk loading.
//! Everything is reachable through `&Scene`, so sharing it across threads is an
//! `Arc<Scene>` away. Only the binary installs a process-wide instance, via
//! [`Scene::install_global`].

use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::cache::AnalysisCache;
use crate::callgraph::ReachableMethods;
use crate::classpath::ClasspathManager;
use crate::config::{SceneOptions, SourcePrecedence};
use crate::entry_points::{DefaultEntryPoints, EntryPointProvider, MAIN_SUBSIGNATURE};
use crate::error::{Result, SceneError};
use crate::locator::{ClassFileReader, ClassLocator, LocatorProvider};
use crate::model::{ClassDescriptor, MethodDescriptor, Partition, ResolutionLevel};
use crate::names::signature_to_class;
use crate::numberer::{NumberId, NumbererService};
use crate::registry::ClassRegistry;
use crate::resolver::Resolver;
use crate::source::ClassProvider;

static GLOBAL: OnceLock<Arc<Scene>> = OnceLock::new();

const HIERARCHY_BASIC_CLASSES: [&str; 35] = [
    "java.lang.Object",
    "java.lang.String",
    "java.lang.Error",
    "java.lang.ExceptionInInitializerError",
    "java.lang.RuntimeException",
    "java.lang.ClassNotFoundException",
    "java.lang.ArithmeticException",
    "java.lang.ArrayStoreException",
    "java.lang.ClassCastException",
    "java.lang.IllegalMonitorStateException",
    "java.lang.IndexOutOfBoundsException",
    "java.lang.ArrayIndexOutOfBoundsException",
    "java.lang.NegativeArraySizeException",
    "java.lang.InstantiationError",
    "java.lang.InternalError",
    "java.lang.OutOfMemoryError",
    "java.lang.StackOverflowError",
    "java.lang.UnknownError",
    "java.lang.ThreadDeath",
    "java.lang.ClassCircularityError",
    "java.lang.ClassFormatError",
    "java.lang.IllegalAccessError",
    "java.lang.IncompatibleClassChangeError",
    "java.lang.LinkageError",
    "java.lang.VerifyError",
    "java.lang.NoSuchFieldError",
    "java.lang.AbstractMethodError",
    "java.lang.NoSuchMethodError",
    "java.lang.UnsatisfiedLinkError",
    "java.lang.Thread",
    "java.lang.Runnable",
    "java.lang.Cloneable",
    "java.io.Serializable",
    "java.lang.ref.Finalizer",
    "java.lang.invoke.LambdaMetafactory",
];

const SIGNATURE_BASIC_CLASSES: [&str; 18] = [
    "java.lang.Class",
    "java.lang.Void",
    "java.lang.Boolean",
    "java.lang.Byte",
    "java.lang.Character",
    "java.lang.Short",
    "java.lang.Integer",
    "java.lang.Long",
    "java.lang.Float",
    "java.lang.Double",
    "java.lang.StringBuffer",
    "java.lang.Enum",
    "java.lang.AssertionError",
    "java.lang.Throwable",
    "java.lang.Exception",
    "java.lang.NoClassDefFoundError",
    "java.lang.ReflectiveOperationException",
    "java.lang.NullPointerException",
];

pub const DEFAULT_EXCLUDED_PACKAGES: [&str; 9] = [
    "java.*",
    "sun.*",
    "javax.*",
    "com.sun.*",
    "com.ibm.*",
    "org.xml.*",
    "org.w3c.*",
    "apple.awt.*",
    "com.apple.*",
];

/// `name` equals `pattern`, or `pattern` ends in `.*` / `$*` and `name` starts with
/// what precedes the `*`.
fn matches_package(pattern: &str, name: &str) -> bool {
    if name == pattern {
        return true;
    }
    (pattern.ends_with(".*") || pattern.ends_with("$*")) && name.starts_with(&pattern[..pattern.len() - 1])
}

/// Classes named by one line of a reflection trace, `kind;target;source;...`.
fn reflection_trace_classes(line: &str) -> Result<Vec<String>> {
    let mut parts = line.split(';');
    let (Some(kind), Some(target), Some(source)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(SceneError::Configuration(format!("malformed reflection trace line: {line}")));
    };

    let source_class = source.rsplit_once('.').map_or(source, |(class, _)| class);
    let target_class = match kind {
        "Class.forName" | "Class.newInstance" => target.to_string(),
        "Method.invoke" | "Constructor.newInstance" => signature_to_class(target)?,
        _ if kind.starts_with("Field.set") || kind.starts_with("Field.get") => signature_to_class(target)?,
        _ => {
            return Err(SceneError::Configuration(format!(
                "unknown reflection trace entry kind: {kind}"
            )));
        }
    };
    Ok(vec![source_class.to_string(), target_class])
}

pub struct Scene {
    options: SceneOptions,
    numberers: Arc<NumbererService>,
    registry: Arc<ClassRegistry>,
    resolver: Resolver,
    classpath: ClasspathManager,
    cache: AnalysisCache,
    basic_classes: Mutex<IndexMap<String, ResolutionLevel>>,
    excluded_packages: Vec<String>,
    dynamic_classes: RwLock<Vec<Arc<ClassDescriptor>>>,
    main_class: RwLock<Option<Arc<ClassDescriptor>>>,
    entry_point_provider: RwLock<Arc<dyn EntryPointProvider>>,
    incremental_build: AtomicBool,
}

impl Scene {
    /// A scene whose classes come from `provider`.
    pub fn new(options: SceneOptions, provider: Arc<dyn ClassProvider>) -> Self {
        let numberers = Arc::new(NumbererService::new(options.weak_map_structures));
        let registry = Arc::new(ClassRegistry::new(numberers.clone(), options.allow_phantom_refs));
        let resolver = Resolver::new(registry.clone(), provider, options.verbose);

        let mut excluded_packages = Vec::new();
        if !options.include_all && options.source_precedence != SourcePrecedence::Apk {
            excluded_packages.extend(DEFAULT_EXCLUDED_PACKAGES.iter().map(|p| p.to_string()));
        }
        excluded_packages.extend(options.exclude.iter().cloned());

        let mut basic_classes = IndexMap::new();
        for name in HIERARCHY_BASIC_CLASSES {
            basic_classes.insert(name.to_string(), ResolutionLevel::Hierarchy);
        }
        for name in SIGNATURE_BASIC_CLASSES {
            basic_classes.insert(name.to_string(), ResolutionLevel::Signatures);
        }

        Self {
            classpath: ClasspathManager::new(options.clone()),
            cache: AnalysisCache::new(registry.clone()),
            options,
            numberers,
            registry,
            resolver,
            basic_classes: Mutex::new(basic_classes),
            excluded_packages,
            dynamic_classes: RwLock::new(Vec::new()),
            main_class: RwLock::new(None),
            entry_point_provider: RwLock::new(Arc::new(DefaultEntryPoints)),
            incremental_build: AtomicBool::new(false),
        }
    }

    /// A scene reading class files from the effective class path of `options`.
    pub fn from_classpath(options: SceneOptions) -> Result<Self> {
        let manager = ClasspathManager::new(options.clone());
        let classpath = manager.effective_classpath()?;
        let locator = ClassLocator::new(classpath).with_java_home(options.java_home.clone());
        let provider = LocatorProvider::new(locator, ClassFileReader);
        let mut scene = Self::new(options, Arc::new(provider));
        scene.classpath = manager;
        Ok(scene)
    }

    /// Makes `scene` the process-wide scene. Fails if one is installed already.
    pub fn install_global(scene: Arc<Scene>) -> Result<()> {
        GLOBAL
            .set(scene)
            .map_err(|_| SceneError::Configuration("a global scene is already installed".to_string()))
    }

    pub fn global() -> Option<Arc<Scene>> {
        GLOBAL.get().cloned()
    }

    pub fn options(&self) -> &SceneOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn numberers(&self) -> &Arc<NumbererService> {
        &self.numberers
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn classpath(&self) -> &ClasspathManager {
        &self.classpath
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn add_class(&self, class: Arc<ClassDescriptor>) -> Result<NumberId> {
        self.registry.add_class(class)
    }

    /// Unregisters `class`. Stored entry points are dropped, and so is the main class
    /// if it is the one removed.
    pub fn remove_class(&self, class: &Arc<ClassDescriptor>) -> Result<()> {
        self.registry.remove_class(class)?;
        {
            let mut main = self.main_class.write();
            if main.as_ref().is_some_and(|m| Arc::ptr_eq(m, class)) {
                *main = None;
            }
        }
        self.cache.release_entry_points();
        Ok(())
    }

    pub fn get_class(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.registry.get_class(name)
    }

    /// The registered class; a new phantom when it is unknown and phantom references
    /// are allowed.
    pub fn get_class_or_phantom(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
        self.registry.get_or_create_phantom(name)
    }

    pub fn resolve_class(&self, name: &str, level: ResolutionLevel) -> Result<Arc<ClassDescriptor>> {
        self.resolver.resolve_class(name, level)
    }

    pub fn force_resolve(&self, name: &str, level: ResolutionLevel) -> Result<Arc<ClassDescriptor>> {
        self.resolver.force_resolve(name, level)
    }

    pub fn load_class_and_support(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
        self.resolver.load_class_and_support(name)
    }

    pub fn set_done_resolving(&self) {
        self.resolver.set_done_resolving();
    }

    pub fn done_resolving(&self) -> bool {
        self.resolver.done_resolving()
    }

    /// Registers `name` to be loaded at `level` by [`load_basic_classes`](Self::load_basic_classes).
    /// A class already registered keeps the higher of the two levels.
    pub fn add_basic_class(&self, name: &str, level: ResolutionLevel) {
        let mut basic = self.basic_classes.lock();
        let entry = basic.entry(name.to_string()).or_insert(level);
        *entry = (*entry).max(level);
    }

    pub fn basic_classes(&self) -> Vec<(String, ResolutionLevel)> {
        self.basic_classes
            .lock()
            .iter()
            .map(|(name, level)| (name.clone(), *level))
            .collect()
    }

    pub fn clear_basic_classes(&self) {
        self.basic_classes.lock().clear();
    }

    fn add_reflection_trace_classes(&self) -> Result<()> {
        let Some(log) = self.options.reflection_log.as_ref() else {
            return Ok(());
        };
        let content = std::fs::read_to_string(log)?;
        let mut classes = IndexSet::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            classes.extend(reflection_trace_classes(line)?);
        }
        debug!("Reflection trace {} names {} classes", log.display(), classes.len());
        for class in classes {
            self.add_basic_class(&class, ResolutionLevel::Bodies);
        }
        Ok(())
    }

    /// Loads every basic class, highest level first. Fails when none of them has a
    /// source.
    pub fn load_basic_classes(&self) -> Result<usize> {
        self.add_reflection_trace_classes()?;
        for name in self.classpath.runtime_basic_classes() {
            self.add_basic_class(&name, ResolutionLevel::Hierarchy);
        }

        let basic = self.basic_classes();
        let mut loaded = 0;
        for level in [
            ResolutionLevel::Bodies,
            ResolutionLevel::Signatures,
            ResolutionLevel::Hierarchy,
        ] {
            for (name, _) in basic.iter().filter(|(_, l)| *l == level) {
                if let Some(class) = self.resolver.try_load_class(name, level)?
                    && !class.is_phantom()
                {
                    loaded += 1;
                }
            }
        }

        if loaded == 0 {
            return Err(SceneError::NoBasicClassesLoaded);
        }
        info!("Loaded {} basic classes", loaded);
        Ok(loaded)
    }

    /// Loads basic, named, dynamic and process-directory classes, assigns
    /// application/library partitions and closes resolution.
    pub fn load_necessary_classes(&self) -> Result<()> {
        self.load_basic_classes()?;

        for name in &self.options.classes {
            let class = self.resolver.load_class_and_support(name)?;
            if class.is_phantom() {
                warn!("Class {} has no source and stays phantom", name);
            } else {
                self.registry.reclassify(&class, Partition::Application)?;
            }
        }

        self.load_dynamic_classes()?;

        let provider = self.resolver.provider().clone();
        for dir in &self.options.process_dirs {
            for name in provider.classes_under(dir)? {
                let class = self.resolver.load_class_and_support(&name)?;
                if !class.is_phantom() {
                    self.registry.reclassify(&class, Partition::Application)?;
                }
            }
        }

        self.prepare_classes()?;
        self.resolver.set_done_resolving();
        self.set_main_class_from_options()?;
        info!(
            "Scene holds {} classes ({} application, {} library, {} phantom)",
            self.registry.len(),
            self.registry.application_classes().len(),
            self.registry.library_classes().len(),
            self.registry.phantom_classes().len()
        );
        Ok(())
    }

    /// Loads the configured dynamic classes; abstract classes and interfaces are dropped.
    pub fn load_dynamic_classes(&self) -> Result<()> {
        let provider = self.resolver.provider().clone();
        let mut names: IndexSet<String> = self.options.dynamic_classes.iter().cloned().collect();
        for dir in &self.options.dynamic_dirs {
            names.extend(provider.classes_under(dir)?);
        }
        for package in &self.options.dynamic_packages {
            names.extend(provider.classes_in_package(package)?);
        }

        let mut dynamic = Vec::new();
        for name in names {
            let class = self.resolver.load_class_and_support(&name)?;
            if class.is_concrete() {
                dynamic.push(class);
            } else if self.options.verbose {
                warn!("Dynamic class {} is abstract or an interface and is not considered", name);
            }
        }
        *self.dynamic_classes.write() = dynamic;
        Ok(())
    }

    pub fn dynamic_classes(&self) -> Vec<Arc<ClassDescriptor>> {
        self.dynamic_classes.read().clone()
    }

    /// Applies `app`, the named classes and the include/exclude lists until no new
    /// classes show up.
    fn prepare_classes(&self) -> Result<()> {
        let mut processed: HashSet<String> = HashSet::new();
        loop {
            let pending: Vec<Arc<ClassDescriptor>> = self
                .registry
                .classes()
                .into_iter()
                .filter(|c| !processed.contains(c.name()))
                .collect();
            if pending.is_empty() {
                return Ok(());
            }

            for class in pending {
                processed.insert(class.name().to_string());
                if class.is_phantom() {
                    continue;
                }
                if self.options.app {
                    self.registry.reclassify(&class, Partition::Application)?;
                }
                if self.options.classes.iter().any(|c| c == class.name()) {
                    self.registry.reclassify(&class, Partition::Application)?;
                    continue;
                }
                if class.is_application_class() && self.is_excluded(class.name()) {
                    self.registry.reclassify(&class, Partition::Library)?;
                }
                if self.is_included(class.name()) {
                    self.registry.reclassify(&class, Partition::Application)?;
                }
                if class.is_application_class() {
                    self.resolver.load_class_and_support(class.name())?;
                }
            }
        }
    }

    pub fn excluded_packages(&self) -> &[String] {
        &self.excluded_packages
    }

    /// Matches an excluded package pattern and no included one.
    pub fn is_excluded(&self, class_name: &str) -> bool {
        self.excluded_packages
            .iter()
            .any(|pattern| matches_package(pattern, class_name))
            && !self.is_included(class_name)
    }

    pub fn is_included(&self, class_name: &str) -> bool {
        self.options
            .include
            .iter()
            .any(|pattern| matches_package(pattern, class_name))
    }

    pub fn has_main_class(&self) -> bool {
        self.main_class.read().is_some()
    }

    pub fn main_class(&self) -> Result<Arc<ClassDescriptor>> {
        self.main_class
            .read()
            .clone()
            .ok_or_else(|| SceneError::NoMainClass("no main class has been set or inferred".to_string()))
    }

    pub fn set_main_class(&self, class: Arc<ClassDescriptor>) -> Result<()> {
        if !class.declares_method(MAIN_SUBSIGNATURE) {
            return Err(SceneError::NoMainClass(format!(
                "{} does not declare {}",
                class.name(),
                MAIN_SUBSIGNATURE
            )));
        }
        *self.main_class.write() = Some(class);
        self.cache.release_entry_points();
        Ok(())
    }

    /// Uses the configured main class, else the first named or application class
    /// declaring `main`. Leaves the main class unset when none qualifies.
    pub fn set_main_class_from_options(&self) -> Result<()> {
        if self.has_main_class() {
            return Ok(());
        }
        if let Some(name) = self.options.main_class.as_deref().filter(|n| !n.is_empty()) {
            return self.set_main_class(self.registry.class(name)?);
        }

        let named = self
            .options
            .classes
            .iter()
            .map(|name| self.registry.class(name))
            .collect::<Result<Vec<_>>>()?;
        let inferred = named
            .into_iter()
            .chain(self.registry.application_classes())
            .find(|class| class.declares_method(MAIN_SUBSIGNATURE));
        if let Some(class) = inferred {
            debug!("No main class given; inferred {}", class.name());
            self.set_main_class(class)?;
        }
        Ok(())
    }

    pub fn set_entry_point_provider(&self, provider: Arc<dyn EntryPointProvider>) {
        *self.entry_point_provider.write() = provider;
        self.cache.release_entry_points();
    }

    /// Stored entry points, computed by the entry point provider on first use.
    pub fn entry_points(&self) -> Vec<Arc<MethodDescriptor>> {
        self.cache.entry_points_or_else(|| {
            let main = self.main_class.read().clone();
            self.entry_point_provider
                .read()
                .entry_points(&self.registry, main.as_ref())
        })
    }

    pub fn set_entry_points(&self, entry_points: Vec<Arc<MethodDescriptor>>) {
        self.cache.set_entry_points(entry_points);
    }

    pub fn reachable_methods(&self) -> Result<ReachableMethods> {
        self.cache.reachable_methods(&self.entry_points())
    }

    pub fn initiate_incremental_build(&self) {
        self.incremental_build.store(true, Ordering::Release);
    }

    pub fn incremental_build_finished(&self) {
        self.incremental_build.store(false, Ordering::Release);
    }

    pub fn is_incremental_build(&self) -> bool {
        self.incremental_build.load(Ordering::Acquire)
    }
}
