//! Database engine detection.
//!
//! Walks an ordered list of engine-discriminating probe pairs. For each
//! pair the FALSE condition goes first: on the wrong engine it is a syntax
//! error, and an ERROR fingerprint rules the engine out without spending
//! the second probe.

use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::http::requester::Probe;
use crate::oracle::calibrator::CalibrationResult;
use crate::oracle::fingerprint::MatchKind;
use crate::payloads::{detection_probes, DatabaseKind};

// Version banners rarely exceed this; detection should not burn probes on
// a runaway length search.
const VERSION_MAX_LEN: usize = 64;
const VERSION_LENGTH_BOUND: usize = 256;

pub struct Detector<'a, P: Probe> {
    probe: &'a mut P,
    calibration: &'a CalibrationResult,
}

impl<'a, P: Probe> Detector<'a, P> {
    pub fn new(probe: &'a mut P, calibration: &'a CalibrationResult) -> Self {
        Self { probe, calibration }
    }

    /// Identify the engine and extract its version banner.
    pub async fn detect(&mut self) -> Result<(DatabaseKind, String)> {
        tracing::debug!("starting database detection");

        for dp in detection_probes() {
            tracing::debug!("testing {} using {}", dp.kind, dp.description);

            let false_resp = match self.probe.send(dp.false_condition).await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::debug!("request failed: {e}");
                    continue;
                }
            };

            let false_match = self.calibration.match_kind(&false_resp.fingerprint);
            if false_match == MatchKind::Error {
                tracing::debug!("FALSE probe errored, not {}", dp.kind);
                continue;
            }

            let true_resp = match self.probe.send(dp.true_condition).await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::debug!("request failed: {e}");
                    continue;
                }
            };

            let true_match = self.calibration.match_kind(&true_resp.fingerprint);
            if true_match == MatchKind::True && false_match == MatchKind::False {
                tracing::debug!("database detected as {}", dp.kind);

                let version = match self.extract_version(dp.kind).await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::debug!("could not extract version: {e}");
                        String::new()
                    }
                };
                return Ok((dp.kind, version));
            }

            tracing::debug!("TRUE={true_match}, FALSE={false_match}, not a match");
        }

        Err(Error::DetectionFailed)
    }

    async fn extract_version(&mut self, kind: DatabaseKind) -> Result<String> {
        let mut extractor = Extractor::new(&mut *self.probe, self.calibration, kind)?;
        extractor.set_max_len(VERSION_MAX_LEN);
        extractor.set_length_bound(VERSION_LENGTH_BOUND);
        extractor.extract_version().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{calibrate, MockProbe};

    #[tokio::test]
    async fn detects_mysql_and_extracts_version() {
        let mut probe = MockProbe::mysql().with_value("SELECT @@version", "8.0.32");
        let cal = calibrate(&mut probe).await;

        let (kind, version) = Detector::new(&mut probe, &cal).detect().await.unwrap();
        assert_eq!(kind, DatabaseKind::MySQL);
        assert_eq!(version, "8.0.32");
    }

    #[tokio::test]
    async fn detects_postgres_after_skipping_mysql() {
        let mut probe =
            MockProbe::postgres().with_value("SELECT version()", "PostgreSQL 16.2");
        let cal = calibrate(&mut probe).await;

        let (kind, version) = Detector::new(&mut probe, &cal).detect().await.unwrap();
        assert_eq!(kind, DatabaseKind::PostgreSQL);
        assert!(version.starts_with("PostgreSQL 16"));
    }

    #[tokio::test]
    async fn unknown_engine_fails_detection() {
        // The mock answers every detection condition with an error.
        let mut probe = MockProbe::undetectable();
        let cal = calibrate(&mut probe).await;

        let err = Detector::new(&mut probe, &cal).detect().await.unwrap_err();
        assert!(matches!(err, Error::DetectionFailed));
    }
}
