use std::env;
use std::path::{Path, PathBuf};

pub use crate::cli::SourcePrecedence;

use crate::cli::Cli;

/// Every knob the scene reads. Fields not set from the command line keep their
/// `Default` values and can be filled in by embedders.
#[derive(Debug, Clone, Default)]
pub struct SceneOptions {
    pub classpath: Vec<PathBuf>,
    pub prepend_classpath: bool,
    pub process_dirs: Vec<PathBuf>,
    pub allow_phantom_refs: bool,
    pub whole_program: bool,
    pub source_precedence: SourcePrecedence,
    pub java_home: Option<PathBuf>,
    pub java_version: Option<String>,
    pub android_jars: Option<PathBuf>,
    pub force_android_jar: Option<PathBuf>,
    pub android_api_version: Option<u32>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub include_all: bool,
    /// Treat every loaded, non-excluded class as an application class.
    pub app: bool,
    /// Classes named for analysis; always application classes.
    pub classes: Vec<String>,
    pub dynamic_classes: Vec<String>,
    pub dynamic_dirs: Vec<PathBuf>,
    pub dynamic_packages: Vec<String>,
    pub main_class: Option<String>,
    pub reflection_log: Option<PathBuf>,
    pub weak_map_structures: bool,
    pub verbose: bool,
}

pub fn options_from_cli(cli: &Cli) -> SceneOptions {
    SceneOptions {
        classpath: cli
            .classpath
            .as_deref()
            .map(split_classpath)
            .unwrap_or_default(),
        prepend_classpath: cli.prepend_classpath,
        process_dirs: cli.process_dirs.clone(),
        allow_phantom_refs: cli.allow_phantom_refs,
        whole_program: cli.whole_program,
        source_precedence: cli.source_precedence,
        java_home: resolve_java_home(cli),
        java_version: cli.java_version.clone(),
        android_jars: resolve_android_jars(cli),
        force_android_jar: cli.force_android_jar.clone(),
        android_api_version: cli.android_api_version,
        include: cli.include.clone(),
        exclude: cli.exclude.clone(),
        include_all: cli.include_all,
        app: cli.app,
        classes: cli.classes.clone(),
        dynamic_classes: cli.dynamic_classes.clone(),
        dynamic_dirs: cli.dynamic_dirs.clone(),
        dynamic_packages: cli.dynamic_packages.clone(),
        main_class: cli.main_class.clone(),
        reflection_log: cli.reflection_log.clone(),
        weak_map_structures: cli.weak_map_structures,
        verbose: cli.verbose,
    }
}

pub fn split_classpath(raw: &str) -> Vec<PathBuf> {
    env::split_paths(raw)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

fn resolve_java_home(cli: &Cli) -> Option<PathBuf> {
    if let Some(p) = cli.java_home.clone() {
        return Some(p);
    }
    env::var_os("JAVA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// `--android-jars`, else `$ANDROID_HOME/platforms`, else the SDK manager's default
/// location. Only consulted for APK input without a forced platform jar.
fn resolve_android_jars(cli: &Cli) -> Option<PathBuf> {
    if let Some(p) = cli.android_jars.clone() {
        return Some(p);
    }
    if cli.source_precedence != SourcePrecedence::Apk || cli.force_android_jar.is_some() {
        return None;
    }

    if let Some(sdk) = env::var_os("ANDROID_HOME").filter(|v| !v.is_empty()) {
        let platforms = Path::new(&sdk).join("platforms");
        if platforms.is_dir() {
            return Some(platforms);
        }
    }
    dirs::home_dir()
        .map(|home| default_sdk_platforms(&home))
        .filter(|p| p.is_dir())
}

fn default_sdk_platforms(home: &Path) -> PathBuf {
    if cfg!(target_os = "macos") {
        home.join("Library").join("Android").join("sdk").join("platforms")
    } else {
        home.join("Android").join("Sdk").join("platforms")
    }
}
