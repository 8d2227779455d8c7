//! Core runtime classes known by structure alone.
//!
//! Used for the runtime image when no `jmods/` directory is available to read class
//! files from. Every superclass and interface named here is itself in the table, so
//! the hierarchy of any listed class resolves without a runtime on disk.

use crate::model::Modifiers;
use crate::source::ClassDefinition;

const OBJECT: &str = "java.lang.Object";

#[derive(Clone, Copy)]
enum Kind {
    Class,
    Abstract,
    Final,
    Interface,
}

use Kind::*;

const SERIALIZABLE: &str = "java.io.Serializable";
const COMPARABLE: &str = "java.lang.Comparable";
const CHAR_SEQUENCE: &str = "java.lang.CharSequence";

/// name, kind, superclass, interfaces
const CLASSES: &[(&str, Kind, Option<&str>, &[&str])] = &[
    (OBJECT, Class, None, &[]),
    (SERIALIZABLE, Interface, Some(OBJECT), &[]),
    ("java.lang.Cloneable", Interface, Some(OBJECT), &[]),
    (COMPARABLE, Interface, Some(OBJECT), &[]),
    (CHAR_SEQUENCE, Interface, Some(OBJECT), &[]),
    ("java.lang.Appendable", Interface, Some(OBJECT), &[]),
    ("java.lang.Runnable", Interface, Some(OBJECT), &[]),
    ("java.lang.AutoCloseable", Interface, Some(OBJECT), &[]),
    ("java.lang.Iterable", Interface, Some(OBJECT), &[]),
    ("java.lang.Thread$UncaughtExceptionHandler", Interface, Some(OBJECT), &[]),
    ("java.lang.reflect.Type", Interface, Some(OBJECT), &[]),
    ("java.lang.reflect.AnnotatedElement", Interface, Some(OBJECT), &[]),
    (
        "java.lang.reflect.GenericDeclaration",
        Interface,
        Some(OBJECT),
        &["java.lang.reflect.AnnotatedElement"],
    ),
    ("java.lang.String", Final, Some(OBJECT), &[SERIALIZABLE, COMPARABLE, CHAR_SEQUENCE]),
    (
        "java.lang.Class",
        Final,
        Some(OBJECT),
        &[
            SERIALIZABLE,
            "java.lang.reflect.GenericDeclaration",
            "java.lang.reflect.Type",
            "java.lang.reflect.AnnotatedElement",
        ],
    ),
    ("java.lang.ClassLoader", Abstract, Some(OBJECT), &[]),
    ("java.lang.System", Final, Some(OBJECT), &[]),
    ("java.lang.Runtime", Class, Some(OBJECT), &[]),
    ("java.lang.Math", Final, Some(OBJECT), &[]),
    ("java.lang.Thread", Class, Some(OBJECT), &["java.lang.Runnable"]),
    (
        "java.lang.ThreadGroup",
        Class,
        Some(OBJECT),
        &["java.lang.Thread$UncaughtExceptionHandler"],
    ),
    ("java.lang.Void", Final, Some(OBJECT), &[]),
    ("java.lang.Number", Abstract, Some(OBJECT), &[SERIALIZABLE]),
    ("java.lang.Boolean", Final, Some(OBJECT), &[SERIALIZABLE, COMPARABLE]),
    ("java.lang.Character", Final, Some(OBJECT), &[SERIALIZABLE, COMPARABLE]),
    ("java.lang.Byte", Final, Some("java.lang.Number"), &[COMPARABLE]),
    ("java.lang.Short", Final, Some("java.lang.Number"), &[COMPARABLE]),
    ("java.lang.Integer", Final, Some("java.lang.Number"), &[COMPARABLE]),
    ("java.lang.Long", Final, Some("java.lang.Number"), &[COMPARABLE]),
    ("java.lang.Float", Final, Some("java.lang.Number"), &[COMPARABLE]),
    ("java.lang.Double", Final, Some("java.lang.Number"), &[COMPARABLE]),
    (
        "java.lang.AbstractStringBuilder",
        Abstract,
        Some(OBJECT),
        &["java.lang.Appendable", CHAR_SEQUENCE],
    ),
    (
        "java.lang.StringBuffer",
        Final,
        Some("java.lang.AbstractStringBuilder"),
        &[SERIALIZABLE, CHAR_SEQUENCE],
    ),
    (
        "java.lang.StringBuilder",
        Final,
        Some("java.lang.AbstractStringBuilder"),
        &[SERIALIZABLE, CHAR_SEQUENCE],
    ),
    ("java.lang.Enum", Abstract, Some(OBJECT), &[COMPARABLE, SERIALIZABLE]),
    ("java.lang.Throwable", Class, Some(OBJECT), &[SERIALIZABLE]),
    ("java.lang.Exception", Class, Some("java.lang.Throwable"), &[]),
    ("java.lang.Error", Class, Some("java.lang.Throwable"), &[]),
    ("java.lang.RuntimeException", Class, Some("java.lang.Exception"), &[]),
    ("java.lang.ReflectiveOperationException", Class, Some("java.lang.Exception"), &[]),
    (
        "java.lang.ClassNotFoundException",
        Class,
        Some("java.lang.ReflectiveOperationException"),
        &[],
    ),
    ("java.lang.InterruptedException", Class, Some("java.lang.Exception"), &[]),
    ("java.lang.CloneNotSupportedException", Class, Some("java.lang.Exception"), &[]),
    ("java.security.PrivilegedActionException", Class, Some("java.lang.Exception"), &[]),
    ("java.lang.ArithmeticException", Class, Some("java.lang.RuntimeException"), &[]),
    ("java.lang.ArrayStoreException", Class, Some("java.lang.RuntimeException"), &[]),
    ("java.lang.ClassCastException", Class, Some("java.lang.RuntimeException"), &[]),
    ("java.lang.IllegalArgumentException", Class, Some("java.lang.RuntimeException"), &[]),
    ("java.lang.IllegalMonitorStateException", Class, Some("java.lang.RuntimeException"), &[]),
    ("java.lang.IllegalStateException", Class, Some("java.lang.RuntimeException"), &[]),
    ("java.lang.IndexOutOfBoundsException", Class, Some("java.lang.RuntimeException"), &[]),
    ("java.lang.NegativeArraySizeException", Class, Some("java.lang.RuntimeException"), &[]),
    ("java.lang.NullPointerException", Class, Some("java.lang.RuntimeException"), &[]),
    ("java.lang.UnsupportedOperationException", Class, Some("java.lang.RuntimeException"), &[]),
    (
        "java.lang.ArrayIndexOutOfBoundsException",
        Class,
        Some("java.lang.IndexOutOfBoundsException"),
        &[],
    ),
    (
        "java.lang.StringIndexOutOfBoundsException",
        Class,
        Some("java.lang.IndexOutOfBoundsException"),
        &[],
    ),
    ("java.lang.LinkageError", Class, Some("java.lang.Error"), &[]),
    ("java.lang.ClassCircularityError", Class, Some("java.lang.LinkageError"), &[]),
    ("java.lang.ClassFormatError", Class, Some("java.lang.LinkageError"), &[]),
    ("java.lang.ExceptionInInitializerError", Class, Some("java.lang.LinkageError"), &[]),
    ("java.lang.IncompatibleClassChangeError", Class, Some("java.lang.LinkageError"), &[]),
    ("java.lang.NoClassDefFoundError", Class, Some("java.lang.LinkageError"), &[]),
    ("java.lang.UnsatisfiedLinkError", Class, Some("java.lang.LinkageError"), &[]),
    ("java.lang.VerifyError", Class, Some("java.lang.LinkageError"), &[]),
    ("java.lang.AbstractMethodError", Class, Some("java.lang.IncompatibleClassChangeError"), &[]),
    ("java.lang.IllegalAccessError", Class, Some("java.lang.IncompatibleClassChangeError"), &[]),
    ("java.lang.InstantiationError", Class, Some("java.lang.IncompatibleClassChangeError"), &[]),
    ("java.lang.NoSuchFieldError", Class, Some("java.lang.IncompatibleClassChangeError"), &[]),
    ("java.lang.NoSuchMethodError", Class, Some("java.lang.IncompatibleClassChangeError"), &[]),
    ("java.lang.VirtualMachineError", Abstract, Some("java.lang.Error"), &[]),
    ("java.lang.InternalError", Class, Some("java.lang.VirtualMachineError"), &[]),
    ("java.lang.OutOfMemoryError", Class, Some("java.lang.VirtualMachineError"), &[]),
    ("java.lang.StackOverflowError", Class, Some("java.lang.VirtualMachineError"), &[]),
    ("java.lang.UnknownError", Class, Some("java.lang.VirtualMachineError"), &[]),
    ("java.lang.ThreadDeath", Class, Some("java.lang.Error"), &[]),
    ("java.lang.AssertionError", Class, Some("java.lang.Error"), &[]),
    ("java.lang.ref.Reference", Abstract, Some(OBJECT), &[]),
    ("java.lang.ref.FinalReference", Class, Some("java.lang.ref.Reference"), &[]),
    ("java.lang.ref.Finalizer", Final, Some("java.lang.ref.FinalReference"), &[]),
    ("java.lang.invoke.LambdaMetafactory", Final, Some(OBJECT), &[]),
    ("java.lang.invoke.StringConcatFactory", Final, Some(OBJECT), &[]),
];

pub fn names() -> impl Iterator<Item = &'static str> {
    CLASSES.iter().map(|(name, ..)| *name)
}

/// Name-and-hierarchy definition of a listed class; no members.
pub fn definition(name: &str) -> Option<ClassDefinition> {
    let (_, kind, superclass, interfaces) = CLASSES.iter().find(|(listed, ..)| *listed == name)?;
    let modifiers = match kind {
        Class => Modifiers::PUBLIC,
        Abstract => Modifiers::PUBLIC | Modifiers::ABSTRACT,
        Final => Modifiers::PUBLIC | Modifiers::FINAL,
        Interface => Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::ABSTRACT,
    };
    let mut definition = ClassDefinition::new(name).with_modifiers(modifiers);
    definition.superclass = superclass.map(str::to_string);
    definition.interfaces = interfaces.iter().map(|i| i.to_string()).collect();
    Some(definition)
}
