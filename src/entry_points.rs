use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::{ClassDescriptor, MethodDescriptor};
use crate::registry::ClassRegistry;

pub const MAIN_SUBSIGNATURE: &str = "void main(java.lang.String[])";
pub const CLINIT_SUBSIGNATURE: &str = "void <clinit>()";

/// Methods the JVM may call without a visible call site.
pub const IMPLICIT_ENTRY_POINTS: [&str; 13] = [
    "<java.lang.System: void initializeSystemClass()>",
    "<java.lang.ThreadGroup: void <init>()>",
    "<java.lang.Thread: void exit()>",
    "<java.lang.ThreadGroup: void uncaughtException(java.lang.Thread,java.lang.Throwable)>",
    "<java.lang.ClassLoader: void <init>()>",
    "<java.lang.ClassLoader: java.lang.Class loadClassInternal(java.lang.String)>",
    "<java.lang.ClassLoader: void checkPackageAccess(java.lang.Class,java.security.ProtectionDomain)>",
    "<java.lang.ClassLoader: void addClass(java.lang.Class)>",
    "<java.lang.ClassLoader: long findNative(java.lang.ClassLoader,java.lang.String)>",
    "<java.security.PrivilegedActionException: void <init>(java.lang.Exception)>",
    "<java.lang.ref.Finalizer: void runFinalizer()>",
    "<java.lang.Thread: void <init>(java.lang.ThreadGroup,java.lang.Runnable)>",
    "<java.lang.Thread: void <init>(java.lang.ThreadGroup,java.lang.String)>",
];

pub trait EntryPointProvider: Send + Sync {
    fn entry_points(
        &self,
        registry: &ClassRegistry,
        main_class: Option<&Arc<ClassDescriptor>>,
    ) -> Vec<Arc<MethodDescriptor>>;
}

/// `main` of the main class plus the static initializers of it and its superclasses.
pub fn application_entry_points(main_class: &Arc<ClassDescriptor>) -> Vec<Arc<MethodDescriptor>> {
    let mut methods: Vec<Arc<MethodDescriptor>> =
        main_class.method_by_subsignature(MAIN_SUBSIGNATURE).into_iter().collect();

    let mut current = Some(main_class.clone());
    while let Some(class) = current {
        if let Some(clinit) = class.method_by_subsignature(CLINIT_SUBSIGNATURE) {
            methods.push(clinit);
        }
        current = class.superclass();
    }
    methods
}

/// The implicit entry points present in `registry`.
pub fn implicit_entry_points(registry: &ClassRegistry) -> Vec<Arc<MethodDescriptor>> {
    IMPLICIT_ENTRY_POINTS
        .iter()
        .filter_map(|signature| registry.grab_method(signature).ok().flatten())
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEntryPoints;

impl EntryPointProvider for DefaultEntryPoints {
    fn entry_points(
        &self,
        registry: &ClassRegistry,
        main_class: Option<&Arc<ClassDescriptor>>,
    ) -> Vec<Arc<MethodDescriptor>> {
        let mut methods = match main_class {
            Some(main) => application_entry_points(main),
            None => {
                debug!("No main class; only implicit entry points are used");
                Vec::new()
            }
        };
        methods.extend(implicit_entry_points(registry));
        methods
    }
}

/// A fixed list of method signatures.
#[derive(Debug, Clone, Default)]
pub struct CustomEntryPoints {
    signatures: Vec<String>,
}

impl CustomEntryPoints {
    pub fn new(signatures: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            signatures: signatures.into_iter().map(Into::into).collect(),
        }
    }
}

impl EntryPointProvider for CustomEntryPoints {
    fn entry_points(
        &self,
        registry: &ClassRegistry,
        _main_class: Option<&Arc<ClassDescriptor>>,
    ) -> Vec<Arc<MethodDescriptor>> {
        self.signatures
            .iter()
            .filter_map(|signature| match registry.grab_method(signature) {
                Ok(Some(method)) => Some(method),
                Ok(None) => {
                    warn!("Entry point {} is not in the scene", signature);
                    None
                }
                Err(err) => {
                    warn!("Ignoring entry point {}: {}", signature, err);
                    None
                }
            })
            .collect()
    }
}
