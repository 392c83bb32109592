//! CLI configuration, build options and runtime settings.

use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DeployError, Result};
use crate::locale::LocaleCode;

/// Build options file in the Magento root
pub const BUILD_OPTIONS_FILE: &str = "build_options.ini";

/// Config artifact relative to the Magento root
pub const CONFIG_FILE: &str = "app/etc/config.php";

pub const BUILD_OPT_SKIP_SCD: &str = "skip_scd";
pub const BUILD_OPT_SCD_THREADS: &str = "scd_threads";
pub const BUILD_OPT_SCD_EXCLUDE_THEMES: &str = "exclude_themes";
pub const BUILD_OPT_VERBOSE_COMMANDS: &str = "VERBOSE_COMMANDS";

/// Config snapshot and static content deploy for Magento Cloud builds
#[derive(Parser, Debug)]
#[command(name = "magento-cloud-scd")]
#[command(version)]
#[command(about = "Config snapshot and static content deploy for Magento Cloud builds")]
pub struct Cli {
    /// Magento root directory
    #[arg(short = 'r', long, env = "MAGENTO_ROOT", default_value = ".", global = true)]
    pub magento_root: PathBuf,

    /// Config artifact (default: app/etc/config.php under the Magento root)
    #[arg(long, global = true)]
    pub config_file: Option<PathBuf>,

    /// Admin-session locale (default: ADMIN_LOCALE platform variable, then en_US)
    #[arg(long, global = true)]
    pub admin_locale: Option<String>,

    /// Kill any external command still running after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub command_timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dump config, reduce it to the static-deploy subset and re-import it
    Dump,
    /// Generate static content for every configured locale
    Deploy(DeployArgs),
    /// Dump, then deploy
    Run(DeployArgs),
}

/// Overrides for build_options.ini
#[derive(Args, Debug, Clone, Default)]
pub struct DeployArgs {
    /// Skip static content deploy
    #[arg(long)]
    pub skip_scd: bool,

    /// Parallel static content commands (0 = number of CPUs)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Themes to exclude (comma-separated)
    #[arg(long, value_name = "THEMES")]
    pub exclude_themes: Option<String>,

    /// Verbosity passed to setup:static-content:deploy ("enabled" or e.g. "-vvv")
    #[arg(long)]
    pub verbose_commands: Option<String>,

    /// Print the commands instead of running them
    #[arg(long)]
    pub dry_run: bool,
}

/// What the invocation should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Dump,
    Deploy,
    Run,
}

/// Build options from build_options.ini with CLI overrides applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfig {
    values: IndexMap<String, String>,
}

impl BuildConfig {
    /// Parse `key = value` lines; `;`/`#` comments and `[section]` headers are ignored
    pub fn from_ini(src: &str) -> Self {
        let mut values = IndexMap::new();
        for line in src.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_string(), unquote(value.trim()).to_string());
            }
        }
        Self { values }
    }

    /// Load `<root>/build_options.ini`; a missing file means no options
    pub fn load(magento_root: &Path) -> Result<Self> {
        let path = magento_root.join(BUILD_OPTIONS_FILE);
        match fs::read_to_string(&path) {
            Ok(src) => Ok(Self::from_ini(&src)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(DeployError::ConfigRead { path, source }),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Layer CLI flags over file values
    pub fn apply(&mut self, args: &DeployArgs) {
        if args.skip_scd {
            self.set(BUILD_OPT_SKIP_SCD, "1");
        }
        if let Some(threads) = args.threads {
            self.set(BUILD_OPT_SCD_THREADS, threads.to_string());
        }
        if let Some(themes) = &args.exclude_themes {
            self.set(BUILD_OPT_SCD_EXCLUDE_THEMES, themes.clone());
        }
        if let Some(verbosity) = &args.verbose_commands {
            self.set(BUILD_OPT_VERBOSE_COMMANDS, verbosity.clone());
        }
    }

    pub fn skip_scd(&self) -> bool {
        self.get(BUILD_OPT_SKIP_SCD).is_some_and(is_truthy)
    }

    /// Parallel command count; unset, negative or non-numeric means 0
    pub fn scd_threads(&self) -> usize {
        self.get(BUILD_OPT_SCD_THREADS)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0)
    }

    pub fn exclude_themes(&self) -> Vec<String> {
        self.get(BUILD_OPT_SCD_EXCLUDE_THEMES)
            .map(parse_theme_list)
            .unwrap_or_default()
    }

    /// Flag appended to each static content command, if any
    pub fn verbosity_flag(&self) -> Option<String> {
        let value = self.get(BUILD_OPT_VERBOSE_COMMANDS)?.trim();
        if value.eq_ignore_ascii_case("enabled") {
            Some("-vv".to_string())
        } else if value.starts_with("-v") && value[1..].bytes().all(|b| b == b'v') {
            Some(value.to_string())
        } else {
            None
        }
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner;
        }
    }
    value
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Split a comma-separated theme list; repeated commas and blanks are dropped
pub fn parse_theme_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Runtime configuration parsed from CLI
#[derive(Debug, Clone)]
pub struct Config {
    pub action: Action,
    /// Magento root directory
    pub magento_root: PathBuf,
    /// Config artifact path
    pub config_file: PathBuf,
    /// Admin locale override (type-safe)
    pub admin_locale: Option<LocaleCode>,
    /// Build options after CLI overrides
    pub build: BuildConfig,
    pub command_timeout: Option<Duration>,
    pub verbose: bool,
    pub dry_run: bool,
}

impl Config {
    /// Create Config from CLI arguments
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let magento_root = cli.magento_root.canonicalize().unwrap_or(cli.magento_root);

        let admin_locale = match cli.admin_locale {
            Some(locale_str) => match LocaleCode::validated(&locale_str) {
                Ok(locale) => Some(locale),
                Err(msg) => anyhow::bail!(msg),
            },
            None => None,
        };

        let config_file = cli
            .config_file
            .unwrap_or_else(|| magento_root.join(CONFIG_FILE));

        let mut build = BuildConfig::load(&magento_root)?;
        let (action, dry_run) = match &cli.command {
            Commands::Dump => (Action::Dump, false),
            Commands::Deploy(args) => {
                build.apply(args);
                (Action::Deploy, args.dry_run)
            }
            Commands::Run(args) => {
                build.apply(args);
                (Action::Run, args.dry_run)
            }
        };

        Ok(Config {
            action,
            magento_root,
            config_file,
            admin_locale,
            build,
            command_timeout: cli.command_timeout.filter(|s| *s > 0).map(Duration::from_secs),
            verbose: cli.verbose,
            dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["magento-cloud-scd"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    // ==================== BuildConfig tests ====================

    #[test]
    fn test_build_config_from_ini() {
        let config = BuildConfig::from_ini(
            "; build options\n[build]\nskip_scd = 0\nscd_threads = 4\nexclude_themes = \"Magento/luma, Magento/blank\"\nVERBOSE_COMMANDS=enabled\n",
        );

        assert!(!config.skip_scd());
        assert_eq!(config.scd_threads(), 4);
        assert_eq!(config.exclude_themes(), vec!["Magento/luma", "Magento/blank"]);
        assert_eq!(config.verbosity_flag(), Some("-vv".to_string()));
    }

    #[test]
    fn test_build_config_defaults() {
        let config = BuildConfig::default();
        assert!(!config.skip_scd());
        assert_eq!(config.scd_threads(), 0);
        assert!(config.exclude_themes().is_empty());
        assert_eq!(config.verbosity_flag(), None);
    }

    #[test]
    fn test_build_config_skip_scd_truthy_values() {
        for value in ["1", "true", "On", "yes"] {
            let config = BuildConfig::from_ini(&format!("skip_scd={}", value));
            assert!(config.skip_scd(), "{} should be truthy", value);
        }
        for value in ["0", "", "off", "no"] {
            let config = BuildConfig::from_ini(&format!("skip_scd={}", value));
            assert!(!config.skip_scd(), "{} should be falsy", value);
        }
    }

    #[test]
    fn test_build_config_threads_non_numeric_is_zero() {
        assert_eq!(BuildConfig::from_ini("scd_threads=abc").scd_threads(), 0);
        assert_eq!(BuildConfig::from_ini("scd_threads=-2").scd_threads(), 0);
        assert_eq!(BuildConfig::from_ini("scd_threads= 8 ").scd_threads(), 8);
    }

    #[test]
    fn test_build_config_verbosity_passthrough() {
        assert_eq!(
            BuildConfig::from_ini("VERBOSE_COMMANDS=-vvv").verbosity_flag(),
            Some("-vvv".to_string())
        );
        assert_eq!(BuildConfig::from_ini("VERBOSE_COMMANDS=disabled").verbosity_flag(), None);
        assert_eq!(BuildConfig::from_ini("VERBOSE_COMMANDS=-vx").verbosity_flag(), None);
    }

    #[test]
    fn test_build_config_load_missing_file() {
        let temp = TempDir::new().unwrap();
        assert_eq!(BuildConfig::load(temp.path()).unwrap(), BuildConfig::default());
    }

    #[test]
    fn test_build_config_load_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(BUILD_OPTIONS_FILE), "scd_threads=3\n").unwrap();
        assert_eq!(BuildConfig::load(temp.path()).unwrap().scd_threads(), 3);
    }

    #[test]
    fn test_build_config_apply_overrides() {
        let mut config = BuildConfig::from_ini("scd_threads=2\nexclude_themes=Magento/luma");
        config.apply(&DeployArgs {
            skip_scd: true,
            threads: Some(6),
            exclude_themes: None,
            verbose_commands: Some("-v".to_string()),
            dry_run: false,
        });

        assert!(config.skip_scd());
        assert_eq!(config.scd_threads(), 6);
        assert_eq!(config.exclude_themes(), vec!["Magento/luma"]);
        assert_eq!(config.verbosity_flag(), Some("-v".to_string()));
    }

    // ==================== parse_theme_list tests ====================

    #[test]
    fn test_parse_theme_list() {
        assert!(parse_theme_list("").is_empty());
        assert_eq!(parse_theme_list("foo"), vec!["foo"]);
        assert_eq!(parse_theme_list("foo,,bar,"), vec!["foo", "bar"]);
        assert_eq!(parse_theme_list(" foo , bar "), vec!["foo", "bar"]);
    }

    // ==================== Config::from_cli tests ====================

    #[test]
    fn test_config_from_cli_deploy() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_str().unwrap();
        let cli = parse(&["deploy", "-r", root, "-j", "4", "--exclude-themes", "Magento/luma"]);

        let config = Config::from_cli(cli).unwrap();

        assert_eq!(config.action, Action::Deploy);
        assert_eq!(config.build.scd_threads(), 4);
        assert_eq!(config.build.exclude_themes(), vec!["Magento/luma"]);
        assert!(config.config_file.ends_with("app/etc/config.php"));
        assert!(config.command_timeout.is_none());
        assert!(!config.dry_run);
    }

    #[test]
    fn test_config_from_cli_dump() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_str().unwrap();
        let cli = parse(&["-r", root, "--command-timeout", "30", "dump"]);

        let config = Config::from_cli(cli).unwrap();

        assert_eq!(config.action, Action::Dump);
        assert_eq!(config.command_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_config_from_cli_run_dry_run_with_config_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_str().unwrap();
        let cli = parse(&["run", "-r", root, "--dry-run", "--config-file", "/tmp/config.json"]);

        let config = Config::from_cli(cli).unwrap();

        assert_eq!(config.action, Action::Run);
        assert!(config.dry_run);
        assert_eq!(config.config_file, PathBuf::from("/tmp/config.json"));
    }

    #[test]
    fn test_config_from_cli_admin_locale() {
        let config = Config::from_cli(parse(&["dump", "--admin-locale", "nl_NL"])).unwrap();
        assert_eq!(config.admin_locale.map(|l| l.to_string()), Some("nl_NL".to_string()));
    }

    #[test]
    fn test_config_from_cli_invalid_admin_locale() {
        let result = Config::from_cli(parse(&["dump", "--admin-locale", "english"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_zero_timeout_disabled() {
        let config = Config::from_cli(parse(&["--command-timeout", "0", "dump"])).unwrap();
        assert!(config.command_timeout.is_none());
    }
}
