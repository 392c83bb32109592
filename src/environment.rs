//! Magento Cloud environment: platform variables and build-state flags.
//!
//! The platform passes `MAGENTO_CLOUD_VARIABLES` and
//! `MAGENTO_CLOUD_RELATIONSHIPS` as base64-encoded JSON documents.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::error::{DeployError, Result};
use crate::locale::{LocaleCode, DEFAULT_LOCALE};

pub const VARIABLES_ENV: &str = "MAGENTO_CLOUD_VARIABLES";
pub const RELATIONSHIPS_ENV: &str = "MAGENTO_CLOUD_RELATIONSHIPS";

/// Key inside `MAGENTO_CLOUD_VARIABLES` naming the admin-session locale
pub const ADMIN_LOCALE_VARIABLE: &str = "ADMIN_LOCALE";

/// Marker file signalling static content was generated during build
pub const STATIC_DEPLOY_FLAG: &str = ".static_content_deploy";

/// Decode a base64-encoded JSON platform variable
pub fn decode_platform_json(name: &str, raw: &str) -> Result<serde_json::Value> {
    let invalid = |message: String| DeployError::InvalidPlatformVariable {
        name: name.to_string(),
        message,
    };
    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|e| invalid(format!("not base64: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| invalid(format!("not JSON: {}", e)))
}

/// One entry of the `database` relationship
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseRelationship {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name
    pub path: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Runtime environment of a build. Variables are decoded on use, so a
/// malformed one only affects the step that reads it.
pub struct Environment {
    variables: Option<String>,
    relationships: Option<String>,
}

impl Environment {
    /// Read platform variables from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read platform variables through `lookup` (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            variables: lookup(VARIABLES_ENV),
            relationships: lookup(RELATIONSHIPS_ENV),
        }
    }

    /// Decoded `MAGENTO_CLOUD_VARIABLES`; unset or blank is `null`
    pub fn variables(&self) -> Result<serde_json::Value> {
        match self.variables.as_deref() {
            Some(raw) if !raw.trim().is_empty() => decode_platform_json(VARIABLES_ENV, raw),
            _ => Ok(serde_json::Value::Null),
        }
    }

    /// A string entry of `MAGENTO_CLOUD_VARIABLES`
    pub fn variable(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .variables()?
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    /// Locale of the admin session, `en_US` when unset or unreadable
    pub fn admin_locale(&self) -> LocaleCode {
        match self.variable(ADMIN_LOCALE_VARIABLE) {
            Ok(Some(locale)) if !locale.trim().is_empty() => LocaleCode::new(locale.trim()),
            Ok(_) => LocaleCode::default_locale(),
            Err(e) => {
                error!("{}; using {}", e, DEFAULT_LOCALE);
                LocaleCode::default_locale()
            }
        }
    }

    /// First `database` relationship. Only the snapshot step needs it, so a
    /// missing or malformed variable is reported lazily.
    pub fn database(&self) -> Result<DatabaseRelationship> {
        let raw = self
            .relationships
            .as_deref()
            .ok_or_else(|| DeployError::InvalidPlatformVariable {
                name: RELATIONSHIPS_ENV.to_string(),
                message: "not set".to_string(),
            })?;
        let mut relationships = decode_platform_json(RELATIONSHIPS_ENV, raw)?;
        let first = relationships
            .get_mut("database")
            .and_then(|db| db.get_mut(0))
            .map(serde_json::Value::take)
            .ok_or_else(|| DeployError::InvalidPlatformVariable {
                name: RELATIONSHIPS_ENV.to_string(),
                message: "no database relationship".to_string(),
            })?;
        serde_json::from_value(first).map_err(|e| DeployError::InvalidPlatformVariable {
            name: RELATIONSHIPS_ENV.to_string(),
            message: e.to_string(),
        })
    }
}

/// Build-state markers consumed by later deploy stages. Both transitions are idempotent.
pub trait BuildFlags {
    fn set_static_deploy_done(&self) -> Result<()>;
    fn clear_static_deploy_pending(&self) -> Result<()>;
}

/// [`BuildFlags`] stored as a marker file in the Magento root
#[derive(Debug, Clone)]
pub struct FileFlags {
    path: PathBuf,
}

impl FileFlags {
    pub fn new(magento_root: &Path) -> Self {
        Self {
            path: magento_root.join(STATIC_DEPLOY_FLAG),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_set(&self) -> bool {
        self.path.exists()
    }
}

impl BuildFlags for FileFlags {
    fn set_static_deploy_done(&self) -> Result<()> {
        debug!(flag = %self.path.display(), "setting static deploy flag");
        fs::write(&self.path, "")?;
        Ok(())
    }

    fn clear_static_deploy_pending(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(flag = %self.path.display(), "removed static deploy flag");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
