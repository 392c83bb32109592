//! Persisted config artifact (`app/etc/config.php`).
//!
//! The artifact is read and rewritten in the format it was found in, chosen
//! by extension: PHP array literal for `.php`, JSON for everything else.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DeployError, Result};
use crate::php;
use crate::tree::ConfigTree;

/// On-disk serialization of a config tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Php,
    Json,
}

impl ConfigFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("php") => ConfigFormat::Php,
            _ => ConfigFormat::Json,
        }
    }

    pub fn decode(self, src: &str, path: &Path) -> Result<ConfigTree> {
        match self {
            ConfigFormat::Php => php::parse(src).map_err(|e| DeployError::ConfigParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            ConfigFormat::Json => {
                serde_json::from_str(src).map_err(|e| DeployError::ConfigParse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        }
    }

    pub fn encode(self, tree: &ConfigTree) -> Result<String> {
        match self {
            ConfigFormat::Php => Ok(php::render(tree)),
            ConfigFormat::Json => {
                let mut out = serde_json::to_string_pretty(tree)?;
                out.push('\n');
                Ok(out)
            }
        }
    }
}

/// Config file handed from the snapshot step to the deploy planner
#[derive(Debug, Clone)]
pub struct ConfigArtifact {
    path: PathBuf,
    format: ConfigFormat,
}

impl ConfigArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = ConfigFormat::for_path(&path);
        Self { path, format }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<ConfigTree> {
        let src = fs::read_to_string(&self.path).map_err(|source| DeployError::ConfigRead {
            path: self.path.clone(),
            source,
        })?;
        self.format.decode(&src, &self.path)
    }

    /// Replace the artifact's whole content with `tree`
    pub fn save(&self, tree: &ConfigTree) -> Result<()> {
        let encoded = self.format.encode(tree)?;
        fs::write(&self.path, encoded).map_err(|source| DeployError::ConfigWrite {
            path: self.path.clone(),
            source,
        })
    }
}
