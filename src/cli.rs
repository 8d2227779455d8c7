use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-scene")]
#[command(about = "Compute the class path of a JVM or Android program and inspect its classes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Explicit class path, entries separated by the platform path separator
    #[arg(long = "cp", value_name = "PATH")]
    pub classpath: Option<String>,

    /// Append the platform default class path to --cp
    #[arg(long)]
    pub prepend_classpath: bool,

    #[arg(long = "process-dir", value_name = "DIR")]
    pub process_dirs: Vec<PathBuf>,

    #[arg(long = "src-prec", value_enum, default_value_t = SourcePrecedence::Java)]
    pub source_precedence: SourcePrecedence,

    #[arg(long, value_name = "DIR")]
    pub java_home: Option<PathBuf>,

    /// Runtime version string, e.g. "1.8" or "17"
    #[arg(long, value_name = "VER")]
    pub java_version: Option<String>,

    /// Android SDK platforms directory
    #[arg(long, value_name = "DIR")]
    pub android_jars: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub force_android_jar: Option<PathBuf>,

    #[arg(long, value_name = "N")]
    pub android_api_version: Option<u32>,

    #[arg(short = 'w', long)]
    pub whole_program: bool,

    #[arg(long)]
    pub allow_phantom_refs: bool,

    /// Class to load as an application class (repeatable)
    #[arg(long = "class", value_name = "NAME")]
    pub classes: Vec<String>,

    #[arg(long, value_name = "NAME")]
    pub main_class: Option<String>,

    /// Treat every loaded, non-excluded class as an application class
    #[arg(long)]
    pub app: bool,

    /// Package pattern to keep as application code, e.g. "java.util.*"
    #[arg(short = 'i', long, value_name = "PATTERN")]
    pub include: Vec<String>,

    #[arg(short = 'x', long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Drop the default excluded runtime packages
    #[arg(long)]
    pub include_all: bool,

    /// Class loaded with bodies but never an entry point (repeatable)
    #[arg(long = "dynamic-class", value_name = "NAME")]
    pub dynamic_classes: Vec<String>,

    /// Directory or archive whose classes are all dynamic classes
    #[arg(long = "dynamic-dir", value_name = "DIR")]
    pub dynamic_dirs: Vec<PathBuf>,

    /// Package whose classes are all dynamic classes
    #[arg(long = "dynamic-package", value_name = "PACKAGE")]
    pub dynamic_packages: Vec<String>,

    /// Reflection trace whose classes are loaded with bodies
    #[arg(long, value_name = "FILE")]
    pub reflection_log: Option<PathBuf>,

    /// Number classes and members through weak references
    #[arg(long)]
    pub weak_map_structures: bool,

    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Print the effective class path
    Classpath,
    /// Print the Android platform jar and API level
    ApiLevel,
    /// List the classes visible on the effective class path
    Index {
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },
    /// Load the necessary classes and summarize the scene
    Load,
    Quote {
        name: String,
    },
    Unquote {
        name: String,
    },
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, ValueEnum, Serialize)]
pub enum SourcePrecedence {
    #[default]
    Java,
    Apk,
}
