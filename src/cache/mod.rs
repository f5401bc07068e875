//! Per-host persistent cache.
//!
//! A single JSON file holds everything learned about each host: detected
//! engine and version, discovered tables with columns and rows, and the set
//! of previously extracted strings used for prefix prediction. Every
//! mutation re-reads, modifies, and rewrites the whole file; the tool is
//! strictly sequential, and across concurrent runs last-writer-wins is
//! accepted. The cache is a hint, never truth.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const CACHE_FILE_NAME: &str = ".blindsight.json";

/// Columns and rows cached for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCache {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<BTreeMap<String, String>>,
}

/// Everything cached for one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tables: BTreeMap<String, TableCache>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_strings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFile {
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

// Earlier versions nested finder results under per-pattern objects whose
// table values were either a bare column array or a {columns, rows} object.
// Read-side migration flattens them into the tables map.
#[derive(Debug, Deserialize)]
struct RawCacheFile {
    #[serde(default)]
    hosts: Vec<RawHostEntry>,
}

#[derive(Debug, Deserialize)]
struct RawHostEntry {
    host: String,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    tables: BTreeMap<String, TableCache>,
    #[serde(default)]
    known_strings: Vec<String>,
    #[serde(default)]
    finder: BTreeMap<String, LegacyFinderEntry>,
}

#[derive(Debug, Deserialize)]
struct LegacyFinderEntry {
    #[serde(default)]
    tables: BTreeMap<String, serde_json::Value>,
}

/// Strip the port (unless inside IPv6 brackets) and lowercase.
pub fn normalize_host(host: &str) -> String {
    let mut host = host;
    if let Some(idx) = host.rfind(':') {
        if !host[idx..].contains(']') {
            host = &host[..idx];
        }
    }
    host.to_lowercase()
}

/// Handle on the cache file. All reads tolerate a missing or corrupt file;
/// all writes rewrite the file in full.
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// `$HOME/.blindsight.json`, falling back to the working directory.
    pub fn open_default() -> Self {
        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CACHE_FILE_NAME);
        Self { path }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn load(&self) -> CacheFile {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(_) => return CacheFile::default(),
        };

        let raw: RawCacheFile = match serde_json::from_str(&data) {
            Ok(raw) => raw,
            Err(_) => return CacheFile::default(),
        };

        CacheFile {
            hosts: raw.hosts.into_iter().map(migrate_host).collect(),
        }
    }

    fn save(&self, cache: &CacheFile) -> Result<()> {
        let data = serde_json::to_string_pretty(cache)
            .map_err(|e| Error::CacheIo(e.to_string()))?;
        std::fs::write(&self.path, data).map_err(|e| Error::CacheIo(e.to_string()))
    }

    fn with_host<T>(
        &self,
        host: &str,
        mutate: impl FnOnce(&mut HostEntry) -> T,
    ) -> Result<T> {
        let mut cache = self.load();
        let host = normalize_host(host);

        let entry = match cache
            .hosts
            .iter_mut()
            .find(|e| normalize_host(&e.host) == host)
        {
            Some(entry) => entry,
            None => {
                cache.hosts.push(HostEntry {
                    host,
                    ..HostEntry::default()
                });
                cache.hosts.last_mut().expect("just pushed")
            }
        };

        let out = mutate(entry);
        self.save(&cache)?;
        Ok(out)
    }

    fn read_host<T>(&self, host: &str, read: impl FnOnce(&HostEntry) -> T) -> Option<T> {
        let cache = self.load();
        let host = normalize_host(host);
        cache
            .hosts
            .iter()
            .find(|e| normalize_host(&e.host) == host)
            .map(read)
    }

    /// Cached engine kind and version for a host.
    pub fn database(&self, host: &str) -> Option<(String, String)> {
        self.read_host(host, |e| {
            (
                e.database.clone().unwrap_or_default(),
                e.version.clone().unwrap_or_default(),
            )
        })
        .filter(|(db, _)| !db.is_empty())
    }

    pub fn save_database(&self, host: &str, database: &str, version: &str) -> Result<()> {
        self.with_host(host, |entry| {
            entry.database = Some(database.to_string());
            entry.version = if version.is_empty() {
                None
            } else {
                Some(version.to_string())
            };
        })
    }

    /// All cached tables for a host, empty when nothing is known.
    pub fn tables(&self, host: &str) -> BTreeMap<String, TableCache> {
        self.read_host(host, |e| e.tables.clone()).unwrap_or_default()
    }

    pub fn save_tables(&self, host: &str, tables: BTreeMap<String, TableCache>) -> Result<()> {
        self.with_host(host, |entry| {
            entry.tables = tables;
        })
    }

    pub fn table_columns(&self, host: &str, table: &str) -> Vec<String> {
        self.read_host(host, |e| {
            e.tables.get(table).map(|t| t.columns.clone()).unwrap_or_default()
        })
        .unwrap_or_default()
    }

    pub fn table_rows(&self, host: &str, table: &str) -> Vec<BTreeMap<String, String>> {
        self.read_host(host, |e| {
            e.tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
        })
        .unwrap_or_default()
    }

    /// Append a column to a table, deduplicating case-sensitively and
    /// preserving discovery order. An empty name only ensures the table
    /// entry exists.
    pub fn add_table_column(&self, host: &str, table: &str, column: &str) -> Result<()> {
        self.with_host(host, |entry| {
            let cache = entry.tables.entry(table.to_string()).or_default();
            if !column.is_empty() && !cache.columns.iter().any(|c| c == column) {
                cache.columns.push(column.to_string());
            }
        })
    }

    /// Append a row to a table. Rows are append-only, never deduplicated.
    pub fn add_table_row(
        &self,
        host: &str,
        table: &str,
        row: BTreeMap<String, String>,
    ) -> Result<()> {
        self.with_host(host, |entry| {
            entry.tables.entry(table.to_string()).or_default().rows.push(row);
        })
    }

    pub fn known_strings(&self, host: &str) -> Vec<String> {
        self.read_host(host, |e| e.known_strings.clone())
            .unwrap_or_default()
    }

    /// Remember an extracted string for future prefix prediction.
    pub fn add_known_string(&self, host: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        self.with_host(host, |entry| {
            if !entry.known_strings.iter().any(|s| s == value) {
                entry.known_strings.push(value.to_string());
            }
        })
    }
}

fn migrate_host(raw: RawHostEntry) -> HostEntry {
    let mut entry = HostEntry {
        host: raw.host,
        database: raw.database,
        version: raw.version,
        tables: raw.tables,
        known_strings: raw.known_strings,
    };

    for (_, finder_entry) in raw.finder {
        for (table, value) in finder_entry.tables {
            let cache = entry.tables.entry(table).or_default();
            let columns: Vec<String> = match value {
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
                serde_json::Value::Object(map) => map
                    .get("columns")
                    .and_then(|c| c.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
                _ => Vec::new(),
            };
            for column in columns {
                if !cache.columns.iter().any(|c| *c == column) {
                    cache.columns.push(column);
                }
            }
        }
    }

    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> CacheStore {
        let path = std::env::temp_dir().join(format!("blindsight-test-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_file(&path);
        CacheStore::with_path(path)
    }

    #[test]
    fn normalize_strips_port_and_lowercases() {
        assert_eq!(normalize_host("Example.COM:8080"), "example.com");
        assert_eq!(normalize_host("example.com"), "example.com");
        assert_eq!(normalize_host("[::1]:443"), "[::1]");
        // idempotent
        assert_eq!(normalize_host(&normalize_host("HOST:1")), "host");
    }

    #[test]
    fn round_trips_host_records() {
        let store = temp_store("roundtrip");
        store.save_database("Target.Example:443", "mysql", "8.0.32").unwrap();
        store.add_table_column("target.example", "users", "id").unwrap();
        store.add_table_column("target.example", "users", "password").unwrap();
        store
            .add_table_row(
                "target.example",
                "users",
                BTreeMap::from([("id".to_string(), "1".to_string())]),
            )
            .unwrap();
        store.add_known_string("target.example", "8.0.32").unwrap();

        assert_eq!(
            store.database("TARGET.example"),
            Some(("mysql".to_string(), "8.0.32".to_string()))
        );
        assert_eq!(store.table_columns("target.example", "users"), vec!["id", "password"]);
        assert_eq!(store.table_rows("target.example", "users").len(), 1);
        assert_eq!(store.known_strings("target.example"), vec!["8.0.32"]);
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn known_strings_deduplicate_but_never_shrink() {
        let store = temp_store("known");
        store.add_known_string("h", "alpha").unwrap();
        store.add_known_string("h", "alpha").unwrap();
        store.add_known_string("h", "beta").unwrap();
        store.add_known_string("h", "").unwrap();
        assert_eq!(store.known_strings("h"), vec!["alpha", "beta"]);
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn columns_deduplicate_case_sensitively() {
        let store = temp_store("columns");
        store.add_table_column("h", "t", "Name").unwrap();
        store.add_table_column("h", "t", "Name").unwrap();
        store.add_table_column("h", "t", "name").unwrap();
        assert_eq!(store.table_columns("h", "t"), vec!["Name", "name"]);
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn legacy_finder_format_is_migrated() {
        let store = temp_store("legacy");
        let legacy = r#"{
            "hosts": [{
                "host": "old.example",
                "database": "mysql",
                "finder": {
                    "pass,user": {
                        "tables": {
                            "USERS": ["col1", "col2"],
                            "LOGS": {"columns": ["entry"], "rows": []}
                        }
                    }
                },
                "known_strings": ["abc"]
            }]
        }"#;
        std::fs::write(store.path(), legacy).unwrap();

        assert_eq!(store.table_columns("old.example", "USERS"), vec!["col1", "col2"]);
        assert_eq!(store.table_columns("old.example", "LOGS"), vec!["entry"]);
        assert_eq!(store.known_strings("old.example"), vec!["abc"]);

        // Any write rewrites the file in the flat shape.
        store.add_known_string("old.example", "def").unwrap();
        let rewritten = std::fs::read_to_string(store.path()).unwrap();
        assert!(!rewritten.contains("finder"));
        assert!(rewritten.contains("USERS"));
        assert!(rewritten.contains("col2"));
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn corrupt_cache_reads_as_empty() {
        let store = temp_store("corrupt");
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.database("x").is_none());
        assert!(store.known_strings("x").is_empty());
        let _ = std::fs::remove_file(store.path());
    }
}
