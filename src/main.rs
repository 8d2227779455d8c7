use anyhow::{Context, Result};
use clap::Parser;
use class_scene::classpath::ClasspathManager;
use class_scene::cli::{Cli, Commands};
use class_scene::config::{SceneOptions, options_from_cli};
use class_scene::locator::ClassLocator;
use class_scene::names::{quote_name, unquote_name};
use class_scene::scene::Scene;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let options = options_from_cli(&cli);

    match cli.command.clone() {
        Commands::Classpath => {
            let manager = ClasspathManager::new(options);
            let classpath = manager
                .effective_classpath()
                .context("failed to compute the class path")?;
            print_json(&ClasspathOutput {
                classpath: classpath.to_string(),
                entries: classpath
                    .entries()
                    .iter()
                    .map(|e| e.to_string_lossy().to_string())
                    .collect(),
                runtime_image: classpath.has_runtime_image(),
            })?;
        }
        Commands::ApiLevel => {
            let manager = ClasspathManager::new(options);
            let platform = manager
                .android_platform()
                .context("failed to select the Android platform jar")?;
            print_json(&platform)?;
        }
        Commands::Index { limit } => {
            print_json(&index_classes(options, limit)?)?;
        }
        Commands::Load => {
            print_json(&load_scene(options)?)?;
        }
        Commands::Quote { name } => println!("{}", quote_name(&name)),
        Commands::Unquote { name } => println!("{}", unquote_name(&name)),
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "class_scene=debug" } else { "class_scene=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ClasspathOutput {
    classpath: String,
    entries: Vec<String>,
    runtime_image: bool,
}

#[derive(Debug, Serialize)]
struct IndexOutput {
    classpath: String,
    total: usize,
    duration_ms: u64,
    classes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct LoadOutput {
    classes: usize,
    application: usize,
    library: usize,
    phantom: usize,
    main_class: Option<String>,
    duration_ms: u64,
}

fn index_classes(options: SceneOptions, limit: Option<usize>) -> Result<IndexOutput> {
    let start = Instant::now();
    let java_home = options.java_home.clone();
    let classpath = ClasspathManager::new(options)
        .effective_classpath()
        .context("failed to compute the class path")?;
    let locator = ClassLocator::new(classpath).with_java_home(java_home);
    let mut classes = locator.class_names();
    let total = classes.len();
    if let Some(limit) = limit {
        classes.truncate(limit);
    }

    Ok(IndexOutput {
        classpath: locator.classpath().to_string(),
        total,
        duration_ms: start.elapsed().as_millis() as u64,
        classes,
    })
}

fn load_scene(options: SceneOptions) -> Result<LoadOutput> {
    let start = Instant::now();
    let scene = Scene::from_classpath(options).context("failed to set up the scene")?;
    Scene::install_global(Arc::new(scene))?;
    let scene = Scene::global().context("global scene is not installed")?;
    scene
        .load_necessary_classes()
        .context("failed to load the necessary classes")?;

    let registry = scene.registry();
    Ok(LoadOutput {
        classes: registry.len(),
        application: registry.application_classes().len(),
        library: registry.library_classes().len(),
        phantom: registry.phantom_classes().len(),
        main_class: scene.main_class().ok().map(|c| c.name().to_string()),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}
