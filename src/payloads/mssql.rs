//! Microsoft SQL Server dialect.

use super::Dialect;

pub struct MsSqlDialect;

impl Dialect for MsSqlDialect {
    fn version_queries(&self) -> &'static [&'static str] {
        &[
            "SELECT @@version",
            "SELECT SERVERPROPERTY('ProductVersion')",
            "SELECT SERVERPROPERTY('Edition')",
        ]
    }

    fn length_probe(&self, query: &str, n: i64) -> String {
        format!("LEN(({query}))>{n}")
    }

    fn comparison_probe(&self, query: &str, n: i64) -> String {
        format!("({query})>{n}")
    }

    // CONVERT(VARCHAR(8000),x) is mandatory: SUBSTRING over non-textual
    // result types (ints, SERVERPROPERTY sql_variant) fails otherwise.
    fn char_probe(&self, query: &str, pos: usize, n: u8) -> String {
        format!("ASCII(SUBSTRING(CONVERT(VARCHAR(8000),({query})),{pos},1))>{n}")
    }

    fn equality_probe(&self, query: &str, pos: usize, code: u8) -> String {
        format!("ASCII(SUBSTRING(CONVERT(VARCHAR(8000),({query})),{pos},1))={code}")
    }

    fn current_database_query(&self) -> &'static str {
        "SELECT DB_NAME()"
    }

    fn current_user_query(&self) -> &'static str {
        "SELECT SYSTEM_USER"
    }
}
