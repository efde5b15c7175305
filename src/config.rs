//! Configuration for jarcat.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (JARCAT_REFERENCE, JARCAT_DECODER, JARCAT_RENDERER,
//!    JARCAT_NORMALIZER, JARCAT_DETECTOR)
//! 2. Config file (.jarcat/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .jarcat/config.yaml
//! - Falls back to ~/.jarcat/config.yaml
//! - Paths in the config file are relative to the project root (the
//!   directory holding .jarcat/)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::{AssetCodec, CommandCodec, CommandRenderer, PassthroughCodec};
use crate::core::{Denylist, PreviewOptions, ScanOptions, DEFAULT_MAX_IMAGE_PIXELS};
use crate::domain::{ContentHash, PREVIEW_GENERATOR_VERSION};

const CONFIG_DIR: &str = ".jarcat";
const CONFIG_FILE: &str = "config.yaml";

/// Reference store location relative to the project root
pub const DEFAULT_REFERENCE_PATH: &str = "analysis/games.sql";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Reference SQL file (relative to project root)
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanConfig {
    pub uncategorized_title: Option<String>,
    pub max_image_pixels: Option<u64>,
    /// Added to the built-in denylist
    #[serde(default)]
    pub denylist: Vec<DenylistEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DenylistEntry {
    pub sha1: ContentHash,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderConfig {
    /// Model decoder command and leading arguments
    #[serde(default)]
    pub decoder: Vec<String>,
    /// Mesh renderer command and leading arguments
    #[serde(default)]
    pub renderer: Vec<String>,
    #[serde(default)]
    pub codec: CodecConfig,
}

/// Tools that undo producer obfuscation of BMP and MBAC assets
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodecConfig {
    #[serde(default)]
    pub normalizer: Vec<String>,
    #[serde(default)]
    pub detector: Vec<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub reference: PathBuf,
    pub uncategorized_title: String,
    pub max_image_pixels: u64,
    pub extra_denylist: Vec<DenylistEntry>,
    pub decoder: Vec<String>,
    pub renderer: Vec<String>,
    pub normalizer: Vec<String>,
    pub detector: Vec<String>,
}

impl ResolvedConfig {
    /// Built-in denylist plus configured entries
    pub fn denylist(&self) -> Denylist {
        let mut denylist = Denylist::builtin();
        for entry in &self.extra_denylist {
            denylist.insert(entry.sha1.clone(), entry.reason.clone());
        }
        denylist
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            uncategorized_title: self.uncategorized_title.clone(),
            max_image_pixels: self.max_image_pixels,
        }
    }

    pub fn preview_options(&self) -> PreviewOptions {
        PreviewOptions {
            generator_version: PREVIEW_GENERATOR_VERSION,
            max_image_pixels: self.max_image_pixels,
        }
    }

    pub fn command_renderer(&self) -> CommandRenderer {
        CommandRenderer::new(self.decoder.clone(), self.renderer.clone())
    }

    /// Command codec when any codec tool is configured, identity otherwise
    pub fn codec(&self) -> Box<dyn AssetCodec> {
        if self.normalizer.is_empty() && self.detector.is_empty() {
            Box::new(PassthroughCodec)
        } else {
            Box::new(CommandCodec::new(self.normalizer.clone(), self.detector.clone()))
        }
    }
}

/// Find config file by searching `start` and its parents, then the home directory
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
        .filter(|path| path.exists())
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Split a command line from an environment variable on whitespace
fn split_command(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Merge file settings, environment and defaults
fn resolve(
    config_file: Option<PathBuf>,
    config: ConfigFile,
    cwd: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    // Base directory is the parent of .jarcat/ (i.e., grandparent of config.yaml)
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or(cwd);

    let reference = if let Some(env_ref) = env("JARCAT_REFERENCE") {
        PathBuf::from(env_ref)
    } else {
        resolve_path(
            base_dir,
            config.paths.reference.as_deref().unwrap_or(DEFAULT_REFERENCE_PATH),
        )
    };

    let decoder = env("JARCAT_DECODER")
        .map(|v| split_command(&v))
        .unwrap_or(config.render.decoder);
    let renderer = env("JARCAT_RENDERER")
        .map(|v| split_command(&v))
        .unwrap_or(config.render.renderer);
    let normalizer = env("JARCAT_NORMALIZER")
        .map(|v| split_command(&v))
        .unwrap_or(config.render.codec.normalizer);
    let detector = env("JARCAT_DETECTOR")
        .map(|v| split_command(&v))
        .unwrap_or(config.render.codec.detector);

    ResolvedConfig {
        config_file,
        reference,
        uncategorized_title: config
            .scan
            .uncategorized_title
            .unwrap_or_else(|| "Other".to_string()),
        max_image_pixels: config
            .scan
            .max_image_pixels
            .unwrap_or(DEFAULT_MAX_IMAGE_PIXELS),
        extra_denylist: config.scan.denylist,
        decoder,
        renderer,
        normalizer,
        detector,
    }
}

/// Load configuration for a working directory
pub fn load_config_from(cwd: &Path) -> Result<ResolvedConfig> {
    let config_file = find_config_file(cwd);
    let config = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    Ok(resolve(config_file, config, cwd, |key| std::env::var(key).ok()))
}

/// Load configuration for the current directory
pub fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let cwd = PathBuf::from("/work");
        let config = resolve(None, ConfigFile::default(), &cwd, no_env);

        assert_eq!(config.reference, PathBuf::from("/work/analysis/games.sql"));
        assert_eq!(config.uncategorized_title, "Other");
        assert_eq!(config.max_image_pixels, DEFAULT_MAX_IMAGE_PIXELS);
        assert!(config.decoder.is_empty());
        assert_eq!(config.denylist().len(), 1);
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let jarcat_dir = temp.path().join(".jarcat");
        std::fs::create_dir_all(&jarcat_dir).unwrap();

        let config_path = jarcat_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  reference: data/games.sql
scan:
  uncategorized_title: Misc
  max_image_pixels: 1000000
  denylist:
    - sha1: a9993e364706816aba3e25717850c26c9cd0d89d
      reason: test entry
render:
  decoder: [python3, tools/mbac2obj.py]
  renderer: [blender-render]
  codec:
    normalizer: [fishlabs-codec, normalize]
    detector: [fishlabs-codec, detect]
"#
        )
        .unwrap();

        let nested = temp.path().join("jars").join("Some Title");
        std::fs::create_dir_all(&nested).unwrap();

        let config = load_config_file(&config_path).unwrap();
        let resolved = resolve(find_config_file(&nested), config, &nested, no_env);

        assert_eq!(resolved.config_file, Some(config_path));
        assert_eq!(resolved.reference, temp.path().join("data/games.sql"));
        assert_eq!(resolved.uncategorized_title, "Misc");
        assert_eq!(resolved.max_image_pixels, 1_000_000);
        assert_eq!(resolved.decoder, vec!["python3", "tools/mbac2obj.py"]);
        assert_eq!(resolved.renderer, vec!["blender-render"]);
        assert_eq!(resolved.normalizer, vec!["fishlabs-codec", "normalize"]);
        assert_eq!(resolved.detector, vec!["fishlabs-codec", "detect"]);

        let denylist = resolved.denylist();
        assert_eq!(denylist.len(), 2);
        assert_eq!(
            denylist.reason(&ContentHash::of_bytes(b"abc")),
            Some("test entry")
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let config = ConfigFile {
            render: RenderConfig {
                decoder: vec!["from-file".to_string()],
                renderer: vec!["from-file".to_string()],
                codec: CodecConfig::default(),
            },
            ..Default::default()
        };

        let resolved = resolve(None, config, Path::new("/work"), |key| match key {
            "JARCAT_REFERENCE" => Some("/elsewhere/games.sql".to_string()),
            "JARCAT_DECODER" => Some("mbac2obj --quiet".to_string()),
            "JARCAT_DETECTOR" => Some("fishlabs-codec detect".to_string()),
            _ => None,
        });

        assert_eq!(resolved.reference, PathBuf::from("/elsewhere/games.sql"));
        assert_eq!(resolved.decoder, vec!["mbac2obj", "--quiet"]);
        assert_eq!(resolved.renderer, vec!["from-file"]);
        assert_eq!(resolved.detector, vec!["fishlabs-codec", "detect"]);
        assert!(resolved.normalizer.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_configured_codec_is_selected() {
        use crate::domain::ResourceKind;

        let plain = resolve(None, ConfigFile::default(), Path::new("/work"), no_env);
        assert_eq!(plain.codec().is_obfuscated(&ResourceKind::Bmp, b"BM"), None);

        // `true` always exits 0, so every BMP reads as obfuscated
        let config = ConfigFile {
            render: RenderConfig {
                codec: CodecConfig {
                    normalizer: Vec::new(),
                    detector: vec!["true".to_string()],
                },
                ..Default::default()
            },
            ..Default::default()
        };
        let resolved = resolve(None, config, Path::new("/work"), no_env);
        assert_eq!(resolved.codec().is_obfuscated(&ResourceKind::Bmp, b"BM"), Some(true));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
