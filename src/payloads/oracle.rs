//! Oracle Database dialect.

use super::Dialect;

pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn version_queries(&self) -> &'static [&'static str] {
        &[
            "SELECT banner FROM v$version WHERE ROWNUM=1",
            "SELECT version FROM v$instance",
            "SELECT * FROM v$version WHERE ROWNUM=1",
        ]
    }

    fn length_probe(&self, query: &str, n: i64) -> String {
        format!("LENGTH(({query}))>{n}")
    }

    fn comparison_probe(&self, query: &str, n: i64) -> String {
        format!("({query})>{n}")
    }

    // Oracle spells it SUBSTR, not SUBSTRING.
    fn char_probe(&self, query: &str, pos: usize, n: u8) -> String {
        format!("ASCII(SUBSTR(({query}),{pos},1))>{n}")
    }

    fn equality_probe(&self, query: &str, pos: usize, code: u8) -> String {
        format!("ASCII(SUBSTR(({query}),{pos},1))={code}")
    }

    fn current_database_query(&self) -> &'static str {
        "SELECT ora_database_name FROM dual"
    }

    fn current_user_query(&self) -> &'static str {
        "SELECT user FROM dual"
    }
}
