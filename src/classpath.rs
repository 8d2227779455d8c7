//! Effective class path computation.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::android::{AndroidPlatform, AndroidPlatformResolver};
use crate::config::{SceneOptions, SourcePrecedence};
use crate::error::{Result, SceneError};

/// Stands in for the runtime's module image on Java 9 and later.
pub const MODULE_PATH_PLACEHOLDER: &str = "VIRTUAL_FS_FOR_JDK";

const STRING_CONCAT_FACTORY: &str = "java.lang.invoke.StringConcatFactory";

#[cfg(windows)]
const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_SEPARATOR: char = ':';

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classpath {
    entries: Vec<PathBuf>,
}

impl Classpath {
    pub fn new(entries: Vec<PathBuf>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn contains(&self, entry: &Path) -> bool {
        self.entries.iter().any(|e| e == entry)
    }

    pub fn has_runtime_image(&self) -> bool {
        self.contains(Path::new(MODULE_PATH_PLACEHOLDER))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Classpath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "{PATH_SEPARATOR}")?;
            }
            write!(f, "{}", entry.display())?;
        }
        Ok(())
    }
}

fn java_command(java_home: Option<&Path>, args: &[&str]) -> Result<std::process::Output> {
    let java_bin = std::env::var("CLASS_SCENE_JAVA")
        .map(PathBuf::from)
        .ok()
        .or_else(|| {
            java_home
                .map(|home| home.join("bin").join("java"))
                .filter(|bin| bin.is_file())
        })
        .unwrap_or_else(|| PathBuf::from("java"));
    let failed = |err: std::io::Error| {
        SceneError::PlatformNotFound(format!(
            "failed to execute {} (ensure a JRE/JDK is installed): {err}",
            java_bin.display()
        ))
    };

    #[cfg(windows)]
    {
        let lower = java_bin.to_string_lossy().to_ascii_lowercase();
        if lower.ends_with(".cmd") || lower.ends_with(".bat") {
            return Command::new("cmd")
                .arg("/C")
                .arg(&java_bin)
                .args(args)
                .output()
                .map_err(failed);
        }
    }

    Command::new(&java_bin).args(args).output().map_err(failed)
}

/// The quoted version in `java -version` output or a `release` file line.
fn quoted_version(text: &str, marker: &str) -> Option<String> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Whether `version` names a Java 9 or later runtime. Accepts "17", "11.0.2",
/// "14-ea" and the legacy "1.8.0_292" form.
pub fn is_java_geq_9(version: &str) -> Result<bool> {
    let invalid = || SceneError::InvalidRuntimeVersion(version.to_string());
    let trimmed = version.trim();
    let base = match trimmed.find('-') {
        Some(at) if at > 0 => &trimmed[..at],
        _ => trimmed,
    };
    let mut parts = base.split('.');
    let major: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    if major >= 9 {
        return Ok(true);
    }
    if major == 1
        && let Some(minor) = parts.next()
    {
        let minor: u32 = minor.parse().map_err(|_| invalid())?;
        return Ok(minor >= 9);
    }
    Err(invalid())
}

pub struct ClasspathManager {
    options: SceneOptions,
    explicit: RwLock<Vec<PathBuf>>,
    effective: RwLock<Option<Classpath>>,
    android: AndroidPlatformResolver,
    runtime_version: Mutex<Option<String>>,
    runtime_classes: Mutex<Vec<String>>,
}

impl ClasspathManager {
    pub fn new(options: SceneOptions) -> Self {
        Self {
            explicit: RwLock::new(options.classpath.clone()),
            options,
            effective: RwLock::new(None),
            android: AndroidPlatformResolver::new(),
            runtime_version: Mutex::new(None),
            runtime_classes: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &SceneOptions {
        &self.options
    }

    /// Explicit entries, then process directories not already listed, then the
    /// platform default when nothing was given explicitly or prepending is requested.
    pub fn effective_classpath(&self) -> Result<Classpath> {
        if let Some(cached) = self.effective.read().as_ref() {
            return Ok(cached.clone());
        }

        let explicit = self.explicit.read().clone();
        let mut entries = explicit.clone();
        for dir in &self.options.process_dirs {
            if !entries.contains(dir) {
                entries.push(dir.clone());
            }
        }
        if explicit.is_empty() || self.options.prepend_classpath {
            entries.extend(self.default_classpath(&explicit)?);
        }

        let classpath = Classpath::new(entries);
        info!("Effective class path: {}", classpath);
        *self.effective.write() = Some(classpath.clone());
        Ok(classpath)
    }

    pub fn set_classpath(&self, entries: Vec<PathBuf>) {
        *self.explicit.write() = entries;
        self.effective.write().take();
    }

    pub fn extend_classpath(&self, entry: PathBuf) {
        self.explicit.write().push(entry);
        self.effective.write().take();
    }

    /// Basic classes the chosen runtime needs on top of the usual set.
    pub fn runtime_basic_classes(&self) -> Vec<String> {
        self.runtime_classes.lock().clone()
    }

    fn default_classpath(&self, explicit: &[PathBuf]) -> Result<Vec<PathBuf>> {
        match self.options.source_precedence {
            SourcePrecedence::Apk => Ok(vec![self.android.default_platform(&self.options, explicit)?.jar]),
            SourcePrecedence::Java => self.java_default(),
        }
    }

    pub fn android_platform(&self) -> Result<AndroidPlatform> {
        let explicit = self.explicit.read().clone();
        self.android.default_platform(&self.options, &explicit)
    }

    /// The resolved Android level, else the configured one, else the default.
    pub fn android_api_level(&self) -> u32 {
        self.android.api_level(self.options.android_api_version)
    }

    pub fn android(&self) -> &AndroidPlatformResolver {
        &self.android
    }

    fn java_home(&self) -> Result<&Path> {
        self.options.java_home.as_deref().ok_or_else(|| {
            SceneError::PlatformNotFound("java home is not set; pass --java-home or set JAVA_HOME".to_string())
        })
    }

    fn java_default(&self) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();

        if cfg!(target_os = "macos")
            && let Some(java_home) = self.options.java_home.as_deref()
        {
            let classes = java_home.join("..").join("Classes");
            for jar in ["classes.jar", "ui.jar"] {
                let path = classes.join(jar);
                if path.is_file() {
                    entries.push(path);
                }
            }
        }

        if is_java_geq_9(&self.runtime_version()?)? {
            entries.push(PathBuf::from(MODULE_PATH_PLACEHOLDER));
            let mut extra = self.runtime_classes.lock();
            if !extra.iter().any(|c| c == STRING_CONCAT_FACTORY) {
                extra.push(STRING_CONCAT_FACTORY.to_string());
            }
        } else {
            let java_home = self.java_home()?;
            let rt = [
                java_home.join("lib").join("rt.jar"),
                java_home.join("jre").join("lib").join("rt.jar"),
            ]
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| {
                SceneError::PlatformNotFound(format!(
                    "no rt.jar under {} (tried lib/ and jre/lib/)",
                    java_home.display()
                ))
            })?;
            entries.push(rt);
            if self.options.whole_program {
                entries.push(java_home.join("lib").join("jce.jar"));
            }
        }

        if self
            .options
            .process_dirs
            .iter()
            .any(|d| d.to_string_lossy().to_lowercase().ends_with(".apk"))
        {
            warn!("Process directory contains an APK but source precedence is Java; the Java runtime class path is used");
        }
        Ok(entries)
    }

    /// Explicit option, then `<java_home>/release`, then `java -version`.
    pub fn runtime_version(&self) -> Result<String> {
        let mut cached = self.runtime_version.lock();
        if let Some(version) = cached.as_ref() {
            return Ok(version.clone());
        }

        let version = match self.options.java_version.clone() {
            Some(version) => version,
            None => self.detect_runtime_version()?,
        };
        debug!("Java runtime version {}", version);
        *cached = Some(version.clone());
        Ok(version)
    }

    fn detect_runtime_version(&self) -> Result<String> {
        let java_home = self.options.java_home.as_deref();
        if let Some(home) = java_home
            && let Ok(release) = std::fs::read_to_string(home.join("release"))
            && let Some(version) = quoted_version(&release, "JAVA_VERSION=\"")
        {
            return Ok(version);
        }

        let output = java_command(java_home, &["-version"])?;
        let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stdout));
        quoted_version(&text, "version \"")
            .ok_or_else(|| SceneError::InvalidRuntimeVersion(text.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_scene_classpath_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_jar(path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path)?);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("java/lang/Object.class", options)?;
        zip.write_all(b"\xCA\xFE\xBA\xBE")?;
        zip.finish()?;
        Ok(())
    }

    fn legacy_home(name: &str) -> anyhow::Result<PathBuf> {
        let home = temp_path(name);
        write_jar(&home.join("jre").join("lib").join("rt.jar"))?;
        Ok(home)
    }

    #[test]
    fn version_schemas() -> Result<()> {
        assert!(is_java_geq_9("17")?);
        assert!(is_java_geq_9("11.0.2")?);
        assert!(is_java_geq_9("14-ea")?);
        assert!(!is_java_geq_9("1.8.0_292")?);
        assert!(is_java_geq_9("1.9")?);
        assert!(matches!(is_java_geq_9("abc"), Err(SceneError::InvalidRuntimeVersion(_))));
        assert!(matches!(is_java_geq_9("8"), Err(SceneError::InvalidRuntimeVersion(_))));
        Ok(())
    }

    #[test]
    fn explicit_then_process_dirs_then_default() -> anyhow::Result<()> {
        let home = legacy_home("order")?;
        let options = SceneOptions {
            classpath: vec![PathBuf::from("/libs/a.jar"), PathBuf::from("/app/classes")],
            prepend_classpath: true,
            process_dirs: vec![PathBuf::from("/app/classes"), PathBuf::from("/app/more")],
            java_home: Some(home.clone()),
            java_version: Some("1.8.0_292".to_string()),
            whole_program: true,
            ..SceneOptions::default()
        };
        let manager = ClasspathManager::new(options);
        let classpath = manager.effective_classpath()?;
        let tail = classpath.entries().len() - 2;
        assert_eq!(
            &classpath.entries()[..tail],
            &[
                PathBuf::from("/libs/a.jar"),
                PathBuf::from("/app/classes"),
                PathBuf::from("/app/more"),
            ]
        );
        assert_eq!(classpath.entries()[tail], home.join("jre").join("lib").join("rt.jar"));
        assert_eq!(classpath.entries()[tail + 1], home.join("lib").join("jce.jar"));
        assert!(manager.runtime_basic_classes().is_empty());

        std::fs::remove_dir_all(home)?;
        Ok(())
    }

    #[test]
    fn explicit_classpath_without_prepend_skips_default() -> Result<()> {
        let manager = ClasspathManager::new(SceneOptions {
            classpath: vec![PathBuf::from("/libs/a.jar")],
            ..SceneOptions::default()
        });
        assert_eq!(manager.effective_classpath()?.entries(), &[PathBuf::from("/libs/a.jar")]);

        manager.extend_classpath(PathBuf::from("/libs/b.jar"));
        assert_eq!(manager.effective_classpath()?.len(), 2);

        manager.set_classpath(vec![PathBuf::from("/other.jar")]);
        let classpath = manager.effective_classpath()?;
        assert_eq!(classpath.entries(), &[PathBuf::from("/other.jar")]);
        assert_eq!(classpath.to_string(), "/other.jar");
        Ok(())
    }

    #[test]
    fn modular_runtime_uses_placeholder() -> Result<()> {
        let manager = ClasspathManager::new(SceneOptions {
            java_home: Some(temp_path("jdk17")),
            java_version: Some("17".to_string()),
            whole_program: true,
            ..SceneOptions::default()
        });
        let classpath = manager.effective_classpath()?;
        assert!(classpath.has_runtime_image());
        assert_eq!(classpath.len(), 1);
        assert_eq!(manager.runtime_basic_classes(), vec![STRING_CONCAT_FACTORY.to_string()]);
        Ok(())
    }

    #[test]
    fn missing_rt_jar_is_platform_not_found() {
        let manager = ClasspathManager::new(SceneOptions {
            java_home: Some(temp_path("empty-home")),
            java_version: Some("1.7".to_string()),
            ..SceneOptions::default()
        });
        assert!(matches!(manager.effective_classpath(), Err(SceneError::PlatformNotFound(_))));

        let no_home = ClasspathManager::new(SceneOptions {
            java_version: Some("1.8.0_292".to_string()),
            ..SceneOptions::default()
        });
        assert!(matches!(no_home.effective_classpath(), Err(SceneError::PlatformNotFound(_))));
    }

    #[test]
    fn modular_runtime_needs_no_java_home() -> Result<()> {
        let manager = ClasspathManager::new(SceneOptions {
            java_home: None,
            java_version: Some("17".to_string()),
            ..SceneOptions::default()
        });
        let classpath = manager.effective_classpath()?;
        assert_eq!(classpath.entries(), &[PathBuf::from(MODULE_PATH_PLACEHOLDER)]);
        assert_eq!(manager.runtime_basic_classes(), vec![STRING_CONCAT_FACTORY.to_string()]);
        Ok(())
    }

    #[test]
    fn version_comes_from_release_file() -> anyhow::Result<()> {
        let home = temp_path("release");
        std::fs::create_dir_all(&home)?;
        std::fs::write(home.join("release"), "IMPLEMENTOR=\"Test\"\nJAVA_VERSION=\"11.0.2\"\n")?;
        let manager = ClasspathManager::new(SceneOptions {
            java_home: Some(home.clone()),
            ..SceneOptions::default()
        });
        assert_eq!(manager.runtime_version()?, "11.0.2");
        assert!(manager.effective_classpath()?.has_runtime_image());
        std::fs::remove_dir_all(home)?;
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn version_comes_from_java_binary() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let home = legacy_home("java-bin")?;
        let bin = home.join("bin");
        std::fs::create_dir_all(&bin)?;
        let java = bin.join("java");
        std::fs::write(
            &java,
            "#!/bin/sh\necho 'java version \"1.8.0_292\"' 1>&2\necho 'Java(TM) SE Runtime Environment' 1>&2\n",
        )?;
        std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755))?;

        let manager = ClasspathManager::new(SceneOptions {
            java_home: Some(home.clone()),
            ..SceneOptions::default()
        });
        assert_eq!(manager.runtime_version()?, "1.8.0_292");
        assert!(!manager.effective_classpath()?.has_runtime_image());
        std::fs::remove_dir_all(home)?;
        Ok(())
    }
}
