//! Config snapshot: dump the full config, keep only what static content
//! deploy needs, add the admin users' locales and re-import the result.
//!
//! The snapshot is a best-effort preparatory step. Failures are logged with
//! their full cause chain and reported as [`SnapshotOutcome::Failed`]; they
//! never abort the surrounding build.

use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::database::{QueryRunner, ADMIN_LOCALE_QUERY};
use crate::error::{DeployError, Result};
use crate::shell::{CommandSpec, Shell};
use crate::stage::DeployStage;
use crate::store::ConfigArtifact;
use crate::tree::{merge_at_path, remove_at_path, resolve_path, ConfigTree, ConfigValue, PathSpec};

/// Branches of the full config that survive reduction, in copy order
pub const ACCEPTED_PATHS: &[&str] = &[
    "modules",
    "scopes",
    "system/default/general/locale/code",
    "system/default/dev/static/sign",
    "system/default/dev/front_end_development_workflow",
    "system/default/dev/template",
    "system/default/dev/js",
    "system/default/dev/css",
    "system/default/advanced/modules_disable_output",
    "system/stores",
    "system/websites",
];

/// Environment-specific values stripped from the artifact
pub const TRANSIENT_PATHS: &[&str] = &[
    "system/stores/admin/web/secure/base_url",
    "system/stores/admin/web/unsecure/base_url",
];

pub const STORES_PATH: &str = "system/stores";
pub const STORE_LOCALE_PATH: &str = "general/locale/code";
pub const ADMIN_USER_LOCALES_PATH: &str = "admin_user/locale/code";

/// What a successful reduction did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReport {
    pub path: PathBuf,
    /// Accepted paths found in the dump
    pub copied_paths: Vec<String>,
    /// Stores reduced to their locale code
    pub collapsed_stores: Vec<String>,
    /// Transient paths that were present and removed
    pub scrubbed_paths: Vec<String>,
    pub admin_locales: Vec<String>,
}

/// Result of [`SnapshotBuilder::build_snapshot`]
#[derive(Debug)]
pub enum SnapshotOutcome {
    /// Reduced config written and re-imported
    Persisted(SnapshotReport),
    /// The dump produced no config file; nothing to do
    Skipped,
    /// Something failed; already logged and swallowed
    Failed(DeployError),
}

impl SnapshotOutcome {
    /// Stage of the deployment run this outcome leaves us in
    pub fn stage(&self) -> DeployStage {
        match self {
            SnapshotOutcome::Persisted(_) => DeployStage::ReducedPersisted,
            SnapshotOutcome::Skipped => DeployStage::NotStarted,
            SnapshotOutcome::Failed(_) => DeployStage::Failed,
        }
    }
}

/// Parsed [`ACCEPTED_PATHS`]
pub fn accepted_paths() -> Result<Vec<PathSpec>> {
    ACCEPTED_PATHS.iter().map(|p| PathSpec::parse(p)).collect()
}

/// Copy every accepted path that fully resolves in `full` into a new tree.
/// Partially present paths are not copied.
pub fn extract_accepted(full: &ConfigTree, paths: &[PathSpec]) -> (ConfigTree, Vec<String>) {
    let mut copied = Vec::new();
    let tree = paths.iter().fold(ConfigTree::new(), |tree, path| {
        match resolve_path(full, path) {
            Some(value) => {
                copied.push(path.to_string());
                merge_at_path(tree, path, value.clone())
            }
            None => {
                debug!(path = %path, "not present in dump");
                tree
            }
        }
    });
    (tree, copied)
}

/// Reduce every store that has a locale code to just that code.
/// Stores without one are kept as they are. Idempotent.
pub fn collapse_store_locales(tree: ConfigTree) -> Result<(ConfigTree, Vec<String>)> {
    let stores_path = PathSpec::parse(STORES_PATH)?;
    let locale_path = PathSpec::parse(STORE_LOCALE_PATH)?;

    let Some(stores) = resolve_path(&tree, &stores_path).and_then(ConfigValue::as_tree) else {
        return Ok((tree, Vec::new()));
    };

    let mut collapsed = Vec::new();
    let mut reduced = ConfigTree::new();
    for (code, store) in stores.iter() {
        let locale = store
            .as_tree()
            .and_then(|s| resolve_path(s, &locale_path))
            .cloned();
        match locale {
            Some(locale) => {
                collapsed.push(code.clone());
                let entry = merge_at_path(ConfigTree::new(), &locale_path, locale);
                reduced.insert(code.clone(), entry);
            }
            None => reduced.insert(code.clone(), store.clone()),
        }
    }

    Ok((
        merge_at_path(tree, &stores_path, ConfigValue::Node(reduced)),
        collapsed,
    ))
}

/// Remove [`TRANSIENT_PATHS`] that are present
pub fn scrub_transient(tree: ConfigTree) -> Result<(ConfigTree, Vec<String>)> {
    let mut scrubbed = Vec::new();
    let mut tree = tree;
    for raw in TRANSIENT_PATHS {
        let path = PathSpec::parse(raw)?;
        let (next, removed) = remove_at_path(tree, &path);
        if removed.is_some() {
            scrubbed.push(path.to_string());
        }
        tree = next;
    }
    Ok((tree, scrubbed))
}

/// Column 0 of each row; rows without it and blank values are dropped
pub fn admin_locales_from_rows(rows: Vec<Vec<String>>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| row.into_iter().next())
        .filter(|code| !code.trim().is_empty())
        .collect()
}

/// Reduce a full dump to the redeployable subset, with `admin_locales` written
/// to `admin_user/locale/code`
pub fn reduce(full: &ConfigTree, admin_locales: &[String]) -> Result<(ConfigTree, SnapshotReport)> {
    let (tree, copied_paths) = extract_accepted(full, &accepted_paths()?);
    let (tree, collapsed_stores) = collapse_store_locales(tree)?;
    let (tree, scrubbed_paths) = scrub_transient(tree)?;
    let tree = merge_at_path(
        tree,
        &PathSpec::parse(ADMIN_USER_LOCALES_PATH)?,
        ConfigValue::string_list(admin_locales.iter().cloned()),
    );

    Ok((
        tree,
        SnapshotReport {
            path: PathBuf::new(),
            copied_paths,
            collapsed_stores,
            scrubbed_paths,
            admin_locales: admin_locales.to_vec(),
        },
    ))
}

/// Dump → reduce → persist → re-import
pub struct SnapshotBuilder<S, Q> {
    shell: S,
    database: Q,
    artifact: ConfigArtifact,
    dump_command: CommandSpec,
    import_command: CommandSpec,
}

impl<S: Shell, Q: QueryRunner> SnapshotBuilder<S, Q> {
    pub fn new(
        shell: S,
        database: Q,
        artifact: ConfigArtifact,
        dump_command: CommandSpec,
        import_command: CommandSpec,
    ) -> Self {
        Self {
            shell,
            database,
            artifact,
            dump_command,
            import_command,
        }
    }

    /// Builder using `bin/magento app:config:dump` / `app:config:import -n`
    pub fn for_magento(shell: S, database: Q, artifact: ConfigArtifact, magento_root: &std::path::Path) -> Self {
        Self::new(
            shell,
            database,
            artifact,
            CommandSpec::magento(magento_root, ["app:config:dump"]),
            CommandSpec::magento(magento_root, ["app:config:import", "-n"]),
        )
    }

    /// Run the snapshot. Never returns an error: failures are logged and
    /// reported as [`SnapshotOutcome::Failed`].
    pub fn build_snapshot(&self) -> SnapshotOutcome {
        match self.try_build() {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Something went wrong in running app:config:dump");
                error!("{}", error_chain(&e));
                SnapshotOutcome::Failed(e)
            }
        }
    }

    fn try_build(&self) -> Result<SnapshotOutcome> {
        self.shell.execute(&self.dump_command)?;
        debug!(stage = %DeployStage::Dumped, command = %self.dump_command);

        if !self.artifact.exists() {
            info!(path = %self.artifact.path().display(), "No config file");
            return Ok(SnapshotOutcome::Skipped);
        }

        let full = self.artifact.load()?;
        let rows = self.database.query(ADMIN_LOCALE_QUERY)?;
        let admin_locales = admin_locales_from_rows(rows);

        let (reduced, mut report) = reduce(&full, &admin_locales)?;
        report.path = self.artifact.path().to_path_buf();
        info!(
            copied = report.copied_paths.len(),
            stores = report.collapsed_stores.len(),
            admin_locales = %admin_locales.join(" "),
            "Reduced config for static content deploy"
        );

        self.artifact.save(&reduced)?;
        self.shell.execute(&self.import_command)?;

        Ok(SnapshotOutcome::Persisted(report))
    }
}

/// "error: cause: cause" rendering of an error and its sources
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    anyhow::Chain::new(err)
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
