use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

fn default_true() -> bool {
    true
}

fn default_system_header() -> String {
    "firmware/config/config.system.h".into()
}

fn default_user_header() -> String {
    "firmware/config/config.h".into()
}

fn default_mcu() -> String {
    "esp32".into()
}

fn default_build_dir() -> String {
    "build".into()
}

fn default_fs_dir() -> String {
    "littlefs".into()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BuildDefinition {
    /// Project root the asset directories and headers are relative to.
    /// Defaults to the directory containing the build definition file.
    pub root: Option<String>,
    pub headers: HeadersConfig,
    pub build: BuildSection,
    pub filesystem: FilesystemSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeadersConfig {
    #[serde(default = "default_system_header")]
    pub system: String,
    /// Optional user overrides; absence is not an error.
    #[serde(default = "default_user_header")]
    pub user: String,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            system: default_system_header(),
            user: default_user_header(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Build-flag tokens as the enclosing build tool passes them;
    /// only `-DNAME[=VALUE]` tokens feed the macro store.
    pub flags: Vec<String>,
    #[serde(default = "default_mcu")]
    pub mcu: String,
    #[serde(default = "default_build_dir")]
    pub dir: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            flags: Vec::new(),
            mcu: default_mcu(),
            dir: default_build_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesystemSection {
    /// Staging directory for the filesystem image, under the build dir.
    #[serde(default = "default_fs_dir")]
    pub dir: String,
    /// Clear the staging directory before copying.
    #[serde(default = "default_true")]
    pub clear: bool,
}

impl Default for FilesystemSection {
    fn default() -> Self {
        Self {
            dir: default_fs_dir(),
            clear: true,
        }
    }
}

/// The fully-resolved build environment the engine runs against. Everything
/// the staging run needs is in here; nothing is read from ambient process
/// state after this point.
#[derive(Debug, Clone)]
pub struct BuildEnv {
    pub root: PathBuf,
    pub system_header: PathBuf,
    pub user_header: PathBuf,
    pub flags: Vec<String>,
    pub mcu: String,
    pub build_dir: PathBuf,
    pub fs_out_dir: PathBuf,
    pub clear_fs_dir: bool,
}

pub fn load(path: &Path) -> Result<BuildEnv> {
    let data = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read build definition {}: {e}", path.display())))?;
    let def: BuildDefinition = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;
    resolve(path, def)
}

pub fn resolve(path: &Path, def: BuildDefinition) -> Result<BuildEnv> {
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let root = match def.root.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => resolve_path(base, r),
        _ => base.to_path_buf(),
    };

    let build_dir = resolve_path(&root, def.build.dir.trim());
    let fs_dir = def.filesystem.dir.trim();
    if fs_dir.is_empty() {
        return Err(Error::msg("filesystem.dir is empty"));
    }

    Ok(BuildEnv {
        system_header: resolve_path(&root, def.headers.system.trim()),
        user_header: resolve_path(&root, def.headers.user.trim()),
        flags: def.build.flags,
        mcu: def.build.mcu.trim().to_string(),
        fs_out_dir: build_dir.join(fs_dir),
        clear_fs_dir: def.filesystem.clear,
        build_dir,
        root,
    })
}

fn resolve_path(base: &Path, raw: &str) -> PathBuf {
    let pb = PathBuf::from(raw);
    if pb.is_absolute() { pb } else { base.join(pb) }
}
