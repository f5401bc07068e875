//! Test support: a scripted probe that answers boolean conditions the way a
//! vulnerable endpoint would, without a network.
//!
//! TRUE conditions answer with an "apple" page, FALSE with "banana", and
//! anything unparseable with a 500 error page, mirroring how a CASE WHEN
//! injection point bifurcates a response.

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::http::requester::{Probe, ProbeResponse};
use crate::oracle::calibrator::{CalibrationResult, Calibrator};
use crate::oracle::fingerprint::Fingerprint;
use crate::payloads::{detection_probes, DatabaseKind};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

const TRUE_CONSTANTS: [&str; 5] = ["3=3", "3=4-1", "'q'='q'", "1<4", "4>1"];
const FALSE_CONSTANTS: [&str; 4] = ["1=4", "'q'='b'", "1>4", "4<1"];
const ERROR_CONSTANTS: [&str; 4] = ["1='", "(1=3", "1=3)", "SELECT"];

pub struct MockProbe {
    kind: DatabaseKind,
    values: HashMap<String, String>,
    sent: Vec<String>,
    fail_after: Option<usize>,
    flat: bool,
}

impl MockProbe {
    fn for_kind(kind: DatabaseKind) -> Self {
        Self {
            kind,
            values: HashMap::new(),
            sent: Vec::new(),
            fail_after: None,
            flat: false,
        }
    }

    pub fn mysql() -> Self {
        Self::for_kind(DatabaseKind::MySQL)
    }

    pub fn mssql() -> Self {
        Self::for_kind(DatabaseKind::MSSQL)
    }

    pub fn postgres() -> Self {
        Self::for_kind(DatabaseKind::PostgreSQL)
    }

    /// A target whose engine matches none of the detection probes.
    pub fn undetectable() -> Self {
        Self::for_kind(DatabaseKind::Unknown)
    }

    /// Script the scalar result of a subquery. Unscripted queries behave as
    /// empty results.
    pub fn with_value(mut self, query: &str, value: &str) -> Self {
        self.values.insert(query.to_string(), value.to_string());
        self
    }

    /// Make every response identical, so calibration cannot differentiate.
    pub fn with_flat_responses(mut self) -> Self {
        self.flat = true;
        self
    }

    /// Fail with a transport error on every request after the first `total`.
    pub fn fail_after(&mut self, total: usize) {
        self.fail_after = Some(total);
    }

    pub fn request_count(&self) -> usize {
        self.sent.len()
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    fn value_of(&self, query: &str) -> &str {
        self.values.get(query).map(String::as_str).unwrap_or("")
    }

    /// Evaluate a boolean condition. `None` is a SQL syntax error.
    fn eval(&self, condition: &str) -> Option<bool> {
        if TRUE_CONSTANTS.contains(&condition) {
            return Some(true);
        }
        if FALSE_CONSTANTS.contains(&condition) {
            return Some(false);
        }
        if ERROR_CONSTANTS.contains(&condition) {
            return None;
        }

        for dp in detection_probes() {
            if condition == dp.true_condition {
                return if dp.kind == self.kind { Some(true) } else { None };
            }
            if condition == dp.false_condition {
                return if dp.kind == self.kind { Some(false) } else { None };
            }
        }

        if condition.starts_with("ASCII(") {
            return self.eval_ascii(condition);
        }

        for prefix in ["LENGTH((", "LEN(("] {
            if let Some(rest) = condition.strip_prefix(prefix) {
                let idx = rest.rfind("))>")?;
                let n: i64 = rest[idx + 3..].parse().ok()?;
                let value = self.value_of(&rest[..idx]);
                return Some(value.len() as i64 > n);
            }
        }

        if let Some(rest) = condition.strip_prefix('(') {
            let idx = rest.rfind(")>")?;
            let n: i64 = rest[idx + 2..].parse().ok()?;
            let value = self.value_of(&rest[..idx]);
            return match value.parse::<i64>() {
                Ok(v) => Some(v > n),
                Err(_) => Some(false),
            };
        }

        None
    }

    /// Parse `ASCII(SUBSTRING((Q),p,1))>n`, the SUBSTR variant, and the
    /// MSSQL CONVERT wrapper, with `>` or `=` comparisons.
    fn eval_ascii(&self, condition: &str) -> Option<bool> {
        let idx = condition.rfind("))")?;
        let op = condition.as_bytes().get(idx + 2).copied()?;
        let n: i64 = condition[idx + 3..].parse().ok()?;

        let head = condition[..idx].strip_suffix(",1")?;
        let comma = head.rfind(',')?;
        let pos: usize = head[comma + 1..].parse().ok()?;
        let head = &head[..comma];

        let query = if let Some(rest) = head.strip_prefix("ASCII(SUBSTRING(CONVERT(VARCHAR(8000),(")
        {
            rest.strip_suffix("))")?
        } else if let Some(rest) = head.strip_prefix("ASCII(SUBSTRING((") {
            rest.strip_suffix(')')?
        } else if let Some(rest) = head.strip_prefix("ASCII(SUBSTR((") {
            rest.strip_suffix(')')?
        } else {
            return None;
        };

        let value = self.value_of(query);
        let code = match value.as_bytes().get(pos - 1) {
            Some(&c) => c as i64,
            // Substring past the end is NULL; NULL comparisons are false.
            None => return Some(false),
        };

        match op {
            b'>' => Some(code > n),
            b'=' => Some(code == n),
            _ => None,
        }
    }

    fn respond(&self, verdict: Option<bool>) -> ProbeResponse {
        let (status, body): (u16, &str) = if self.flat {
            (200, "the same page every time")
        } else {
            match verdict {
                Some(true) => (200, "result: apple"),
                Some(false) => (200, "result: banana with extra words here"),
                None => (500, "syntax error near unexpected token"),
            }
        };

        ProbeResponse {
            status,
            fingerprint: Fingerprint::new(status, body.as_bytes(), None),
            elapsed: Duration::from_millis(1),
        }
    }
}

impl Probe for MockProbe {
    async fn send(&mut self, condition: &str) -> Result<ProbeResponse> {
        self.sent.push(condition.to_string());
        if let Some(limit) = self.fail_after {
            if self.sent.len() > limit {
                return Err(Error::Transport("connection reset by peer".into()));
            }
        }
        let verdict = self.eval(condition);
        Ok(self.respond(verdict))
    }
}

/// Run calibration against a mock and unwrap the result.
pub async fn calibrate(probe: &mut MockProbe) -> CalibrationResult {
    Calibrator::new(probe).calibrate().await.expect("calibration")
}

/// Guard that removes the backing file when dropped.
pub struct TempCacheGuard {
    path: PathBuf,
}

impl Drop for TempCacheGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A cache store backed by a unique temp file.
pub fn temp_cache(name: &str) -> (CacheStore, TempCacheGuard) {
    let path = std::env::temp_dir().join(format!(
        "blindsight-cache-{}-{name}.json",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    let store = CacheStore::with_path(&path);
    (store, TempCacheGuard { path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::dialect_for;

    #[test]
    fn mock_answers_probe_shapes() {
        let probe = MockProbe::mysql().with_value("SELECT x", "hi");
        let d = dialect_for(DatabaseKind::MySQL).unwrap();

        assert_eq!(probe.eval(&d.length_probe("SELECT x", 1)), Some(true));
        assert_eq!(probe.eval(&d.length_probe("SELECT x", 2)), Some(false));
        // 'h' is 104
        assert_eq!(probe.eval(&d.char_probe("SELECT x", 1, 103)), Some(true));
        assert_eq!(probe.eval(&d.char_probe("SELECT x", 1, 104)), Some(false));
        assert_eq!(probe.eval(&d.equality_probe("SELECT x", 2, b'i')), Some(true));
        // past the end behaves like NULL
        assert_eq!(probe.eval(&d.char_probe("SELECT x", 3, 32)), Some(false));
        // garbage is a syntax error
        assert_eq!(probe.eval("CASE WHEN"), None);
    }

    #[test]
    fn mock_answers_mssql_convert_shape() {
        let probe = MockProbe::mssql().with_value("SELECT @@version", "Micro");
        let d = dialect_for(DatabaseKind::MSSQL).unwrap();
        assert_eq!(
            probe.eval(&d.equality_probe("SELECT @@version", 1, b'M')),
            Some(true)
        );
        assert_eq!(probe.eval(&d.length_probe("SELECT @@version", 4)), Some(true));
    }

    #[test]
    fn mock_answers_numeric_comparison() {
        let probe = MockProbe::mysql().with_value("SELECT COUNT(*) FROM t", "247");
        let d = dialect_for(DatabaseKind::MySQL).unwrap();
        assert_eq!(probe.eval(&d.comparison_probe("SELECT COUNT(*) FROM t", 246)), Some(true));
        assert_eq!(probe.eval(&d.comparison_probe("SELECT COUNT(*) FROM t", 247)), Some(false));
    }
}
