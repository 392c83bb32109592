//! Database access for the snapshot step.
//!
//! Only a "run query, get rows" capability is needed. [`MysqlCli`] provides it
//! by running the `mysql` client in batch mode through a [`Shell`].

use crate::environment::DatabaseRelationship;
use crate::error::{DeployError, Result};
use crate::shell::{CommandSpec, Shell};

/// Admin interface locales currently in use
pub const ADMIN_LOCALE_QUERY: &str = "SELECT DISTINCT interface_locale FROM admin_user";

/// Executes a query and returns its rows as column values
pub trait QueryRunner {
    fn query(&self, sql: &str) -> Result<Vec<Vec<String>>>;
}

/// [`QueryRunner`] over the `mysql` command line client.
/// SQL NULL comes back as an empty string.
pub struct MysqlCli<S> {
    shell: S,
    database: DatabaseRelationship,
    program: String,
}

impl<S: Shell> MysqlCli<S> {
    pub fn new(shell: S, database: DatabaseRelationship) -> Self {
        Self {
            shell,
            database,
            program: "mysql".to_string(),
        }
    }

    /// Use a different client binary (e.g. `mariadb`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, sql: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program)
            .args(["--batch", "--skip-column-names", "--raw"])
            .arg(format!("--host={}", self.database.host))
            .arg(format!("--user={}", self.database.username));
        if let Some(port) = self.database.port {
            spec = spec.arg(format!("--port={}", port));
        }
        spec = spec.arg(format!("--database={}", self.database.path));
        if !self.database.password.is_empty() {
            spec = spec.env("MYSQL_PWD", self.database.password.clone());
        }
        spec.arg("--execute").arg(sql)
    }
}

impl<S: Shell> QueryRunner for MysqlCli<S> {
    fn query(&self, sql: &str) -> Result<Vec<Vec<String>>> {
        let output = self
            .shell
            .execute(&self.command(sql))
            .map_err(|e| DeployError::Query {
                message: e.to_string(),
            })?;
        Ok(parse_batch_output(&output))
    }
}

/// Split `--batch --raw` output into rows of tab-separated columns
pub fn parse_batch_output(output: &str) -> Vec<Vec<String>> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split('\t')
                .map(|col| if col == "NULL" { String::new() } else { col.to_string() })
                .collect()
        })
        .collect()
}
