//! # Magento Cloud Static Content Deploy
//!
//! Build-phase tooling for Magento 2 on Magento Cloud: snapshot the live
//! configuration into a reduced `app/etc/config.php`, then generate static
//! content for exactly the locales that config needs.
//!
//! ## Features
//!
//! - Config tree with path-based merge, removal, flattening and filtering
//! - Data-only PHP array literal reader and writer for `config.php`
//! - Admin-user locale discovery through the `mysql` CLI
//! - Per-locale `setup:static-content:deploy` commands run on a Rayon pool
//! - Build options from `build_options.ini` with CLI overrides
//!
//! ## Usage
//!
//! ```ignore
//! use magento_cloud_scd::tree::{flatten, KeyMatch};
//! use magento_cloud_scd::store::ConfigArtifact;
//!
//! let tree = ConfigArtifact::new("app/etc/config.php").load()?;
//! let locales = flatten(&tree).filter("general/locale/code", KeyMatch::Suffix);
//! ```

/// CLI configuration, build options and argument parsing
pub mod config;

/// Admin user locale queries
pub mod database;

/// Bounded-parallel command dispatch
pub mod dispatcher;

/// Platform variables, relationships and build flags
pub mod environment;

/// Error types for build operations
pub mod error;

/// Locale codes and ordered locale sets
pub mod locale;

/// Tracing subscriber setup
pub mod logging;

/// PHP array literal reader and writer
pub mod php;

/// Static content deploy planning
pub mod planner;

/// External command execution
pub mod shell;

/// Config dump reduction and re-import
pub mod snapshot;

/// Deployment run stages
pub mod stage;

/// Config artifact persistence
pub mod store;

/// Typed config tree and path operations
pub mod tree;
