//! Known version string prefixes.
//!
//! Version extraction tries equality probes against these before falling
//! back to binary search, cutting the per-character probe count from ~7 to
//! 1 when a prefix hits.

use super::DatabaseKind;

pub fn version_prefixes(kind: DatabaseKind) -> &'static [&'static str] {
    match kind {
        DatabaseKind::MySQL => &[
            "5.5.", "5.6.", "5.7.", "8.0.", "8.1.", "8.2.", "8.3.", "8.4.",
            // MariaDB
            "10.", "11.",
        ],
        DatabaseKind::MSSQL => &[
            "Microsoft SQL Server 2022",
            "Microsoft SQL Server 2019",
            "Microsoft SQL Server 2017",
            "Microsoft SQL Server 2016",
            "Microsoft SQL Server 2014",
            "Microsoft SQL Server 2012",
            "Microsoft SQL Server 2008",
        ],
        DatabaseKind::PostgreSQL => &[
            "PostgreSQL 17",
            "PostgreSQL 16",
            "PostgreSQL 15",
            "PostgreSQL 14",
            "PostgreSQL 13",
            "PostgreSQL 12",
            "PostgreSQL 11",
            "PostgreSQL 10",
            "PostgreSQL 9.",
        ],
        DatabaseKind::Oracle => &[
            "Oracle Database 23c",
            "Oracle Database 21c",
            "Oracle Database 19c",
            "Oracle Database 18c",
            "Oracle Database 12c",
            "Oracle Database 11g",
            // v$instance reports a bare version number
            "23.", "21.", "19.", "18.", "12.", "11.",
        ],
        DatabaseKind::Unknown => &[],
    }
}
