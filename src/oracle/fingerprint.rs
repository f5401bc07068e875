//! Response fingerprints.
//!
//! A fingerprint is a compact digest of one HTTP response, used only for
//! equality comparison against the calibrated TRUE/FALSE/ERROR references.

use sha2::{Digest, Sha256};

/// Digest of a single HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub status: u16,
    pub content_length: usize,
    pub word_count: usize,
    pub line_count: usize,
    pub body_hash: String,
    /// `Some(found)` when a signal string was configured, `None` otherwise.
    pub signal_match: Option<bool>,
}

impl Fingerprint {
    pub fn new(status: u16, body: &[u8], signal: Option<&str>) -> Self {
        let text = String::from_utf8_lossy(body);

        let mut hasher = Sha256::new();
        hasher.update(body);
        let body_hash = format!("{:x}", hasher.finalize());

        let signal_match = signal
            .filter(|s| !s.is_empty())
            .map(|s| text.contains(s));

        Self {
            status,
            content_length: body.len(),
            word_count: text.split_whitespace().count(),
            line_count: count_lines(&text),
            body_hash,
            signal_match,
        }
    }

    /// Whether two responses are effectively the same.
    ///
    /// Checked in order: signal string presence (decides alone when a signal
    /// string is in use), status code, then exact word count or a content
    /// length within 5% of the larger of the two lengths. The tolerance
    /// absorbs dynamic noise such as timestamps and CSRF tokens; taking the
    /// larger side keeps the predicate symmetric.
    pub fn equals(&self, other: &Fingerprint) -> bool {
        if self.signal_match.is_some() || other.signal_match.is_some() {
            return self.signal_match == other.signal_match;
        }

        if self.status != other.status {
            return false;
        }

        if self.word_count == other.word_count {
            return true;
        }

        let tolerance = self.content_length.max(other.content_length) as f64 * 0.05;
        let diff = (self.content_length as f64 - other.content_length as f64).abs();
        diff <= tolerance
    }

    /// Relaxed comparison, status code only. Diagnostic use.
    pub fn is_similar(&self, other: &Fingerprint) -> bool {
        self.status == other.status
    }

    /// Names the first differing fields, for human-readable error messages.
    pub fn diff(&self, other: &Fingerprint) -> String {
        let mut diffs = Vec::new();
        if self.status != other.status {
            diffs.push("status code");
        }
        if self.word_count != other.word_count {
            diffs.push("word count");
        }
        if self.content_length != other.content_length {
            diffs.push("content length");
        }
        if self.body_hash != other.body_hash {
            diffs.push("body content");
        }
        if diffs.is_empty() {
            "identical".to_string()
        } else {
            diffs.join(", ")
        }
    }
}

fn count_lines(s: &str) -> usize {
    if s.is_empty() {
        0
    } else {
        s.matches('\n').count() + 1
    }
}

/// How a response fingerprint relates to the calibrated references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    True,
    False,
    Error,
    Unknown,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKind::True => write!(f, "TRUE"),
            MatchKind::False => write!(f, "FALSE"),
            MatchKind::Error => write!(f, "ERROR"),
            MatchKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(status: u16, body: &str) -> Fingerprint {
        Fingerprint::new(status, body.as_bytes(), None)
    }

    #[test]
    fn equal_when_word_counts_match() {
        let a = fp(200, "one two three");
        let b = fp(200, "uno dos tres!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!");
        assert!(a.equals(&b));
    }

    #[test]
    fn unequal_on_status() {
        let a = fp(200, "same body");
        let b = fp(404, "same body");
        assert!(!a.equals(&b));
        assert!(!a.is_similar(&b));
    }

    #[test]
    fn length_tolerance_absorbs_small_noise() {
        // 100 bytes vs 103 bytes, different word counts, within 5%
        let a = fp(200, &"a ".repeat(50));
        let b = Fingerprint {
            word_count: a.word_count + 1,
            content_length: 103,
            ..a.clone()
        };
        assert!(a.equals(&b));

        // 100 vs 120 exceeds the 5% band
        let c = Fingerprint {
            word_count: a.word_count + 1,
            content_length: 120,
            ..a.clone()
        };
        assert!(!a.equals(&c));
    }

    #[test]
    fn equality_is_reflexive_and_symmetric() {
        // Differing word counts force the length-tolerance branch. The
        // 5-byte gap is exactly 5% of the larger length but more than 5%
        // of the smaller, so a bound computed from only one side would
        // answer differently depending on comparison order.
        let a = fp(200, &"a ".repeat(50));
        let b = Fingerprint {
            word_count: a.word_count + 1,
            content_length: 95,
            ..a.clone()
        };
        assert!(a.equals(&a));
        assert!(a.equals(&b));
        assert!(b.equals(&a));

        // Same both ways when the gap is out of tolerance.
        let c = Fingerprint {
            word_count: a.word_count + 1,
            content_length: 110,
            ..a.clone()
        };
        assert!(!a.equals(&c));
        assert!(!c.equals(&a));
    }

    #[test]
    fn signal_string_decides_alone() {
        let a = Fingerprint::new(200, b"welcome back admin", Some("admin"));
        let b = Fingerprint::new(500, b"totally different page but still admin here", Some("admin"));
        assert!(a.equals(&b));

        let c = Fingerprint::new(200, b"welcome back guest", Some("admin"));
        assert!(!a.equals(&c));
    }

    #[test]
    fn diff_names_differing_fields() {
        let a = fp(200, "one two");
        let b = fp(500, "one two");
        assert_eq!(a.diff(&b), "status code");
        assert_eq!(a.diff(&a), "identical");
    }

    #[test]
    fn line_count_of_empty_body_is_zero() {
        assert_eq!(fp(200, "").line_count, 0);
        assert_eq!(fp(200, "a\nb").line_count, 2);
    }
}
