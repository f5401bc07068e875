//! PostgreSQL dialect.

use super::Dialect;

pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn version_queries(&self) -> &'static [&'static str] {
        &[
            "SELECT version()",
            "SELECT current_setting('server_version')",
        ]
    }

    fn length_probe(&self, query: &str, n: i64) -> String {
        format!("LENGTH(({query}))>{n}")
    }

    fn comparison_probe(&self, query: &str, n: i64) -> String {
        format!("({query})>{n}")
    }

    fn char_probe(&self, query: &str, pos: usize, n: u8) -> String {
        format!("ASCII(SUBSTRING(({query}),{pos},1))>{n}")
    }

    fn equality_probe(&self, query: &str, pos: usize, code: u8) -> String {
        format!("ASCII(SUBSTRING(({query}),{pos},1))={code}")
    }

    fn current_database_query(&self) -> &'static str {
        "SELECT current_database()"
    }

    fn current_user_query(&self) -> &'static str {
        "SELECT current_user"
    }
}
