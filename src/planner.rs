//! Static content deploy planning.
//!
//! Reads the reduced config artifact, decides whether static content is
//! needed and for which locales, and hands one `setup:static-content:deploy`
//! command per locale to a [`Dispatcher`].

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::BuildConfig;
use crate::dispatcher::{CommandBatch, DispatchReport, Dispatcher};
use crate::environment::BuildFlags;
use crate::error::{DeployError, Result};
use crate::locale::{LocaleCode, LocaleSet};
use crate::shell::CommandSpec;
use crate::snapshot::{ADMIN_USER_LOCALES_PATH, STORE_LOCALE_PATH};
use crate::stage::DeployStage;
use crate::store::ConfigArtifact;
use crate::tree::{flatten, FlattenedConfig, KeyMatch};

pub const WEBSITES_SCOPE: &str = "scopes/websites";
pub const STORES_SCOPE: &str = "scopes/stores";

/// Why static content deploy did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The reduced config artifact does not exist
    NoConfig,
    /// `skip_scd` build option is set
    SkipFlag,
    /// No websites or stores in the config
    NoScopesConfigured,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NoConfig => "config file not found",
            SkipReason::SkipFlag => "skip_scd is set",
            SkipReason::NoScopesConfigured => "no stores/website/locales found in config",
        };
        f.write_str(text)
    }
}

/// Options shared by every per-locale command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Parallel commands (0 = dispatcher default)
    pub threads: usize,
    pub exclude_themes: Vec<String>,
    pub verbosity: Option<String>,
}

impl BuildOptions {
    pub fn from_build_config(build: &BuildConfig) -> Self {
        Self {
            threads: build.scd_threads(),
            exclude_themes: build.exclude_themes(),
            verbosity: build.verbosity_flag(),
        }
    }

    /// One `--exclude-theme=<name>` per excluded theme
    pub fn exclude_theme_flags(&self) -> Vec<String> {
        exclude_theme_flags(&self.exclude_themes)
    }
}

fn exclude_theme_flags(themes: &[String]) -> Vec<String> {
    themes
        .iter()
        .map(|t| format!("--exclude-theme={}", t))
        .collect()
}

/// `--exclude-theme` flags joined by single spaces; empty for no themes
pub fn render_exclude_theme_flags(themes: &[String]) -> String {
    exclude_theme_flags(themes).join(" ")
}

/// Whether any website or store scope is configured
pub fn has_scopes(flat: &FlattenedConfig) -> bool {
    [WEBSITES_SCOPE, STORES_SCOPE].iter().any(|scope| {
        !flat.filter(scope, KeyMatch::Prefix).is_empty()
            || !flat.filter(scope, KeyMatch::Suffix).is_empty()
    })
}

/// Admin-session locale, every store locale, every admin user locale and `en_US`
pub fn discover_locales(flat: &FlattenedConfig, admin_locale: &LocaleCode) -> LocaleSet {
    let mut locales = LocaleSet::new();
    locales.insert(admin_locale.clone());
    locales.extend(
        flat.filter(STORE_LOCALE_PATH, KeyMatch::Suffix)
            .into_iter()
            .filter_map(|v| v.as_str()),
    );
    locales.extend(
        flat.filter(ADMIN_USER_LOCALES_PATH, KeyMatch::Prefix)
            .into_iter()
            .filter_map(|v| v.as_str()),
    );
    locales.insert(LocaleCode::default_locale());
    locales
}

/// `php bin/magento setup:static-content:deploy -f [--exclude-theme=..] <locale> [-v..]`
pub fn locale_command(
    magento_root: &std::path::Path,
    locale: &LocaleCode,
    options: &BuildOptions,
) -> CommandSpec {
    let mut args = vec!["setup:static-content:deploy".to_string(), "-f".to_string()];
    args.extend(options.exclude_theme_flags());
    args.push(locale.as_str().to_string());
    if let Some(verbosity) = &options.verbosity {
        args.push(verbosity.clone());
    }
    CommandSpec::magento(magento_root, args)
}

/// Everything needed to run static content deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPlan {
    pub locales: LocaleSet,
    pub options: BuildOptions,
    pub batch: CommandBatch,
}

impl DeployPlan {
    /// Log line announcing the batch
    pub fn summary(&self) -> String {
        let mut message = format!(
            "Generating static content for locales: {}",
            self.locales.joined()
        );
        let excludes = render_exclude_theme_flags(&self.options.exclude_themes);
        if !excludes.is_empty() {
            message.push_str(&format!("\nExcluding Themes: {}", excludes));
        }
        if self.options.threads > 0 {
            message.push_str(&format!("\nUsing {} Threads", self.options.threads));
        }
        message
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Skip(SkipReason),
    Invoke(DeployPlan),
}

#[derive(Debug)]
pub enum DeployOutcome {
    Deployed(DispatchReport),
    Skipped(SkipReason),
}

impl DeployOutcome {
    pub fn stage(&self) -> DeployStage {
        match self {
            DeployOutcome::Deployed(_) => DeployStage::Deployed,
            DeployOutcome::Skipped(_) => DeployStage::Skipped,
        }
    }
}

/// Stage a finished deploy leaves the run in
pub fn final_stage(result: &Result<DeployOutcome>) -> DeployStage {
    match result {
        Ok(outcome) => outcome.stage(),
        Err(_) => DeployStage::Failed,
    }
}

/// Plans and runs static content deploy from the reduced config
pub struct StaticDeployPlanner<D, F> {
    dispatcher: D,
    flags: F,
    artifact: ConfigArtifact,
    build: BuildConfig,
    admin_locale: LocaleCode,
    magento_root: PathBuf,
}

impl<D: Dispatcher, F: BuildFlags> StaticDeployPlanner<D, F> {
    pub fn new(
        dispatcher: D,
        flags: F,
        artifact: ConfigArtifact,
        build: BuildConfig,
        admin_locale: LocaleCode,
        magento_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dispatcher,
            flags,
            artifact,
            build,
            admin_locale,
            magento_root: magento_root.into(),
        }
    }

    /// Decide whether to deploy and build the command batch. No side effects.
    pub fn plan(&self) -> Result<Plan> {
        if !self.artifact.exists() {
            return Ok(Plan::Skip(SkipReason::NoConfig));
        }
        if self.build.skip_scd() {
            return Ok(Plan::Skip(SkipReason::SkipFlag));
        }

        let tree = self.artifact.load()?;
        let flat = flatten(&tree);
        if !has_scopes(&flat) {
            return Ok(Plan::Skip(SkipReason::NoScopesConfigured));
        }

        let locales = discover_locales(&flat, &self.admin_locale);
        for locale in &locales {
            if !locale.is_valid_format() {
                warn!(locale = %locale, "unusual locale code");
            }
        }

        let options = BuildOptions::from_build_config(&self.build);
        let commands = locales
            .iter()
            .map(|locale| locale_command(&self.magento_root, locale, &options))
            .collect();
        let batch = CommandBatch {
            commands,
            concurrency: options.threads,
        };

        debug!(stage = %DeployStage::Planned, locales = %locales.joined());
        Ok(Plan::Invoke(DeployPlan {
            locales,
            options,
            batch,
        }))
    }

    /// Plan, then dispatch. A failed batch is returned tagged with the
    /// static deploy exit code.
    pub fn deploy(&self) -> Result<DeployOutcome> {
        let plan = match self.plan()? {
            Plan::Skip(reason) => {
                match reason {
                    SkipReason::NoScopesConfigured => info!(
                        "Skipping static content deploy. No stores/website/locales found in {}",
                        self.artifact.path().display()
                    ),
                    _ => info!(reason = %reason, "Skipping static content deploy"),
                }
                self.flags.clear_static_deploy_pending()?;
                return Ok(DeployOutcome::Skipped(reason));
            }
            Plan::Invoke(plan) => plan,
        };

        info!("{}", plan.summary());
        debug!(stage = %DeployStage::Dispatched, commands = plan.batch.commands.len());
        let report = self.dispatcher.dispatch(&plan.batch).map_err(|e| match e {
            DeployError::Cancelled => e,
            other => DeployError::static_deploy(other),
        })?;
        self.flags
            .set_static_deploy_done()
            .map_err(DeployError::static_deploy)?;

        Ok(DeployOutcome::Deployed(report))
    }
}
