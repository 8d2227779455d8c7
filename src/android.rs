//! Android platform jar selection.
//!
//! The platform jar lives at `<platforms>/android-<N>/android.jar`. `N` comes from an
//! explicit option, the target APK's manifest, or [`DEFAULT_SDK_VERSION`], and is then
//! adjusted to what is installed.

use memmap2::Mmap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::config::SceneOptions;
use crate::error::{Result, SceneError};

pub const DEFAULT_SDK_VERSION: u32 = 15;

const MANIFEST_ENTRY: &str = "AndroidManifest.xml";
const APK_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AndroidPlatform {
    pub jar: PathBuf,
    pub api_level: u32,
}

/// SDK levels declared by an APK manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManifestVersionInfo {
    pub target_sdk: Option<u32>,
    pub min_sdk: Option<u32>,
    pub platform_build: Option<u32>,
}

impl ManifestVersionInfo {
    /// Reads either the binary XML form found inside APKs or a plain-text manifest.
    pub fn parse(bytes: &[u8]) -> Self {
        if axml::is_binary(bytes) {
            return axml::version_info(bytes).unwrap_or_default();
        }
        let text = String::from_utf8_lossy(bytes);
        Self {
            target_sdk: number_after(&text, &["targetSdkVersion", "target-version"]),
            min_sdk: number_after(&text, &["minSdkVersion", "min-version"]),
            platform_build: number_after(&text, &["platformBuildVersionCode"]),
        }
    }

    /// Level the manifest asks for, given the highest installed level.
    ///
    /// The target level wins unless it is not installed while the minimum level is;
    /// the platform build code is treated the same way.
    pub fn preferred_level(&self, max_installed: Option<u32>) -> Option<u32> {
        let usable_min = self
            .min_sdk
            .filter(|min| max_installed.is_some_and(|max| *min <= max));
        let pick = |wanted: u32| match (max_installed, usable_min) {
            (Some(max), Some(min)) if wanted > max => {
                warn!("Android API version {} not available, using minSdkVersion {} instead", wanted, min);
                min
            }
            _ => wanted,
        };

        self.target_sdk
            .map(pick)
            .or_else(|| self.platform_build.map(pick))
            .or(self.min_sdk)
    }
}

fn number_after(text: &str, keys: &[&str]) -> Option<u32> {
    for key in keys {
        for (at, _) in text.match_indices(key) {
            let rest = text[at + key.len()..]
                .trim_start_matches(|c: char| c == '"' || c == '\'' || c == '=' || c == ':' || c.is_whitespace());
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            if let Ok(value) = digits.parse() {
                return Some(value);
            }
        }
    }
    None
}

/// Zip magic followed by a `classes.dex` entry.
pub fn is_apk(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    let starts_like_zip = File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .is_ok_and(|_| magic == APK_MAGIC);
    if !starts_like_zip {
        return false;
    }
    match open_archive(path) {
        Ok(bytes) => ZipArchive::new(Cursor::new(&bytes[..]))
            .is_ok_and(|mut archive| archive.by_name("classes.dex").is_ok()),
        Err(err) => {
            debug!("Could not read {}: {}", path.display(), err);
            false
        }
    }
}

fn open_archive(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: the file is opened read-only and the map is dropped before the handle.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

fn read_manifest(apk: &Path) -> Result<Option<Vec<u8>>> {
    let mmap = open_archive(apk)?;
    let mut archive =
        ZipArchive::new(Cursor::new(&mmap[..])).map_err(|source| SceneError::Archive {
            path: apk.to_path_buf(),
            source,
        })?;
    let Ok(mut entry) = archive.by_name(MANIFEST_ENTRY) else {
        return Ok(None);
    };
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

/// `android-<N>` directory segment of a forced platform jar path.
fn level_from_jar_path(jar: &Path) -> Option<u32> {
    let mut components: Vec<Component<'_>> = jar.components().collect();
    // the jar file name itself never counts
    components.pop();
    components.iter().rev().find_map(|c| {
        c.as_os_str()
            .to_str()?
            .strip_prefix("android-")?
            .parse()
            .ok()
    })
}

fn platform_jar(platforms: &Path, level: u32) -> PathBuf {
    platforms.join(format!("android-{level}")).join("android.jar")
}

/// Picks and remembers the platform jar. Highest installed levels are cached per
/// platforms directory and the chosen level is kept once resolved.
#[derive(Debug, Default)]
pub struct AndroidPlatformResolver {
    max_levels: Mutex<HashMap<PathBuf, Option<u32>>>,
    resolved_level: Mutex<Option<u32>>,
    manifest: Mutex<Option<ManifestVersionInfo>>,
}

impl AndroidPlatformResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest `N` with an `android-<N>` directory under `platforms`.
    pub fn max_level_available(&self, platforms: &Path) -> Result<Option<u32>> {
        if let Some(max) = self.max_levels.lock().get(platforms) {
            return Ok(*max);
        }
        if !platforms.is_dir() {
            return Err(SceneError::PlatformNotFound(format!(
                "android platform directory {} does not exist",
                platforms.display()
            )));
        }

        let mut max = None;
        for entry in std::fs::read_dir(platforms)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let level = name
                .to_str()
                .and_then(|n| n.strip_prefix("android-"))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(level) = level {
                max = max.max(Some(level));
            }
        }
        self.max_levels.lock().insert(platforms.to_path_buf(), max);
        Ok(max)
    }

    /// Manifest levels of the last APK inspected.
    pub fn manifest_info(&self) -> Option<ManifestVersionInfo> {
        *self.manifest.lock()
    }

    /// The resolved level, else the explicit one, else the default.
    pub fn api_level(&self, explicit: Option<u32>) -> u32 {
        self.resolved_level
            .lock()
            .or(explicit)
            .unwrap_or(DEFAULT_SDK_VERSION)
    }

    fn manifest_level(&self, apk: &Path, max_installed: Option<u32>) -> Result<u32> {
        let Some(bytes) = read_manifest(apk)? else {
            debug!("No manifest in {}, using API level {}", apk.display(), DEFAULT_SDK_VERSION);
            return Ok(DEFAULT_SDK_VERSION);
        };
        let info = ManifestVersionInfo::parse(&bytes);
        *self.manifest.lock() = Some(info);
        let level = info.preferred_level(max_installed).unwrap_or_else(|| {
            debug!("Manifest of {} names no SDK version, using {}", apk.display(), DEFAULT_SDK_VERSION);
            DEFAULT_SDK_VERSION
        });
        Ok(level.max(3))
    }

    /// Resolves the API level for `platforms`, consulting `apk`'s manifest when no
    /// explicit level is given.
    pub fn resolve_level(&self, platforms: &Path, apk: Option<&Path>, explicit: Option<u32>) -> Result<u32> {
        if let Some(level) = *self.resolved_level.lock() {
            return Ok(level);
        }
        let max_installed = self.max_level_available(platforms)?;
        if let Some(apk) = apk
            && !apk.exists()
        {
            return Err(SceneError::Configuration(format!("file {} does not exist", apk.display())));
        }

        let mut level = match (explicit, apk) {
            (Some(level), _) => level,
            (None, Some(apk)) if apk.to_string_lossy().to_lowercase().ends_with(".apk") => {
                self.manifest_level(apk, max_installed)?
            }
            _ => DEFAULT_SDK_VERSION,
        };

        if let Some(max) = max_installed {
            level = level.min(max);
            while level < max && !platform_jar(platforms, level).exists() {
                level += 1;
            }
        }
        *self.resolved_level.lock() = Some(level);
        Ok(level)
    }

    pub fn platform_jar(&self, platforms: &Path, apk: Option<&Path>, explicit: Option<u32>) -> Result<AndroidPlatform> {
        let api_level = self.resolve_level(platforms, apk, explicit)?;
        let jar = platform_jar(platforms, api_level);
        if !jar.is_file() {
            return Err(SceneError::PlatformNotFound(format!(
                "target android.jar {} does not exist",
                jar.display()
            )));
        }
        Ok(AndroidPlatform { jar, api_level })
    }

    /// The platform jar for the configured input: a forced jar, or the one matching
    /// the single APK (or dex files) among the class path and process directories.
    pub fn default_platform(&self, options: &SceneOptions, classpath: &[PathBuf]) -> Result<AndroidPlatform> {
        if let Some(forced) = options.force_android_jar.as_ref() {
            let api_level = options
                .android_api_version
                .or_else(|| level_from_jar_path(forced))
                .unwrap_or(DEFAULT_SDK_VERSION);
            *self.resolved_level.lock() = Some(api_level);
            if !forced.exists() {
                return Err(SceneError::PlatformNotFound(format!(
                    "forced android.jar {} does not exist",
                    forced.display()
                )));
            }
            return Ok(AndroidPlatform {
                jar: forced.clone(),
                api_level,
            });
        }

        let Some(platforms) = options.android_jars.as_ref() else {
            return Err(SceneError::PlatformNotFound(
                "analyzing an Android application requires android_jars or force_android_jar".to_string(),
            ));
        };

        let mut apk: Option<&PathBuf> = None;
        let mut has_dex = false;
        for entry in classpath.iter().chain(options.process_dirs.iter()) {
            if is_apk(entry) {
                if apk.is_some() {
                    return Err(SceneError::Configuration(
                        "only one Android application can be analyzed when using android_jars".to_string(),
                    ));
                }
                apk = Some(entry);
            }
            if entry.to_string_lossy().to_lowercase().ends_with(".dex") {
                has_dex = true;
            }
        }
        if apk.is_none() && !has_dex {
            return Err(SceneError::Configuration("no apk file given".to_string()));
        }

        let platform = self.platform_jar(platforms, apk.map(PathBuf::as_path), options.android_api_version)?;
        debug!("Using {} as android.jar", platform.jar.display());
        Ok(platform)
    }
}

/// Minimal reader for Android's binary XML, enough to pull SDK attributes.
mod axml {
    use super::ManifestVersionInfo;

    const RES_STRING_POOL_TYPE: u16 = 0x0001;
    const RES_XML_TYPE: u16 = 0x0003;
    const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
    const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;
    const UTF8_FLAG: u32 = 1 << 8;

    const TYPE_STRING: u8 = 0x03;
    const TYPE_INT_DEC: u8 = 0x10;
    const TYPE_INT_HEX: u8 = 0x11;

    // android.R.attr ids, used when attribute names are stripped
    const TARGET_SDK_RESOURCE_ID: u32 = 0x0101_0270;
    const MIN_SDK_RESOURCE_ID: u32 = 0x0101_020c;

    fn u16_at(bytes: &[u8], at: usize) -> Option<u16> {
        Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
    }

    fn u32_at(bytes: &[u8], at: usize) -> Option<u32> {
        Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
    }

    pub fn is_binary(bytes: &[u8]) -> bool {
        u16_at(bytes, 0) == Some(RES_XML_TYPE)
    }

    pub fn version_info(bytes: &[u8]) -> Option<ManifestVersionInfo> {
        let mut info = ManifestVersionInfo::default();
        let mut strings: Vec<String> = Vec::new();
        let mut resource_ids: Vec<u32> = Vec::new();

        let mut offset = u16_at(bytes, 2)? as usize;
        while offset + 8 <= bytes.len() {
            let kind = u16_at(bytes, offset)?;
            let header = u16_at(bytes, offset + 2)? as usize;
            let size = u32_at(bytes, offset + 4)? as usize;
            if size < 8 || offset + size > bytes.len() {
                break;
            }
            let chunk = &bytes[offset..offset + size];
            match kind {
                RES_STRING_POOL_TYPE => strings = string_pool(chunk)?,
                RES_XML_RESOURCE_MAP_TYPE => {
                    resource_ids = chunk
                        .get(header..)?
                        .chunks_exact(4)
                        .filter_map(|id| id.try_into().ok().map(u32::from_le_bytes))
                        .collect();
                }
                RES_XML_START_ELEMENT_TYPE => {
                    start_element(chunk, header, &strings, &resource_ids, &mut info);
                }
                _ => {}
            }
            offset += size;
        }
        Some(info)
    }

    fn string_pool(chunk: &[u8]) -> Option<Vec<String>> {
        let header = u16_at(chunk, 2)? as usize;
        let count = u32_at(chunk, 8)? as usize;
        let utf8 = u32_at(chunk, 16)? & UTF8_FLAG != 0;
        let strings_start = u32_at(chunk, 20)? as usize;
        (0..count)
            .map(|i| {
                let at = strings_start + u32_at(chunk, header + i * 4)? as usize;
                if utf8 { utf8_string(chunk, at) } else { utf16_string(chunk, at) }
            })
            .collect()
    }

    fn utf16_string(chunk: &[u8], at: usize) -> Option<String> {
        let mut len = u16_at(chunk, at)? as usize;
        let mut pos = at + 2;
        if len & 0x8000 != 0 {
            len = ((len & 0x7fff) << 16) | u16_at(chunk, pos)? as usize;
            pos += 2;
        }
        let units = (0..len)
            .map(|i| u16_at(chunk, pos + i * 2))
            .collect::<Option<Vec<u16>>>()?;
        Some(String::from_utf16_lossy(&units))
    }

    fn utf8_len(chunk: &[u8], at: usize) -> Option<(usize, usize)> {
        let first = *chunk.get(at)? as usize;
        if first & 0x80 != 0 {
            let second = *chunk.get(at + 1)? as usize;
            Some((((first & 0x7f) << 8) | second, at + 2))
        } else {
            Some((first, at + 1))
        }
    }

    fn utf8_string(chunk: &[u8], at: usize) -> Option<String> {
        let (_, pos) = utf8_len(chunk, at)?;
        let (len, pos) = utf8_len(chunk, pos)?;
        Some(String::from_utf8_lossy(chunk.get(pos..pos + len)?).into_owned())
    }

    fn start_element(
        chunk: &[u8],
        header: usize,
        strings: &[String],
        resource_ids: &[u32],
        info: &mut ManifestVersionInfo,
    ) -> Option<()> {
        let element = strings.get(u32_at(chunk, header + 4)? as usize)?.as_str();
        let attr_start = u16_at(chunk, header + 8)? as usize;
        let attr_size = u16_at(chunk, header + 10)? as usize;
        let attr_count = u16_at(chunk, header + 12)? as usize;

        for i in 0..attr_count {
            let at = header + attr_start + i * attr_size;
            let name_index = u32_at(chunk, at + 4)? as usize;
            let raw = u32_at(chunk, at + 8)?;
            let data_type = *chunk.get(at + 15)?;
            let data = u32_at(chunk, at + 16)?;

            let name = strings.get(name_index).map(String::as_str).unwrap_or("");
            let resource = resource_ids.get(name_index).copied();
            let value = match data_type {
                TYPE_INT_DEC | TYPE_INT_HEX => Some(data),
                TYPE_STRING => strings
                    .get(raw as usize)
                    .and_then(|s| s.trim().parse().ok()),
                _ => None,
            };

            match element {
                "manifest" if name == "platformBuildVersionCode" => info.platform_build = value,
                "uses-sdk" if name == "targetSdkVersion" || resource == Some(TARGET_SDK_RESOURCE_ID) => {
                    info.target_sdk = value
                }
                "uses-sdk" if name == "minSdkVersion" || resource == Some(MIN_SDK_RESOURCE_ID) => {
                    info.min_sdk = value
                }
                _ => {}
            }
        }
        Some(())
    }
}
