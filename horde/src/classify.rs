//! Response classification.
//!
//! Whether a response counts as a success is decided per task. The default follows the
//! transport's notion (`[200, 400)`), but a task can declare other statuses as the expected
//! behavior of the system under test, e.g. a signup endpoint answering `422` for an email
//! that already exists.
use horde_core::DEFAULT_SUCCESS_STATUS;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failure(String),
}

impl Verdict {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }
}

pub trait Classifier: Send + Sync {
    fn classify(&self, status: u16, body: &[u8]) -> Verdict;
}

impl<F> Classifier for F
where
    F: Fn(u16, &[u8]) -> Verdict + Send + Sync,
{
    fn classify(&self, status: u16, body: &[u8]) -> Verdict {
        self(status, body)
    }
}

/// Success iff the status falls in the range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRange(pub Range<u16>);

impl Default for StatusRange {
    fn default() -> Self {
        Self(DEFAULT_SUCCESS_STATUS)
    }
}

impl Classifier for StatusRange {
    fn classify(&self, status: u16, _body: &[u8]) -> Verdict {
        if self.0.contains(&status) {
            Verdict::Success
        } else {
            Verdict::Failure(status_reason(status))
        }
    }
}

/// The default range plus a set of extra statuses that also count as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptStatus {
    base: StatusRange,
    accepted: Vec<u16>,
}

impl AcceptStatus {
    pub fn new(accepted: &[u16]) -> Self {
        Self {
            base: StatusRange::default(),
            accepted: accepted.to_vec(),
        }
    }
}

impl Classifier for AcceptStatus {
    fn classify(&self, status: u16, body: &[u8]) -> Verdict {
        if self.accepted.contains(&status) {
            Verdict::Success
        } else {
            self.base.classify(status, body)
        }
    }
}

pub(crate) fn status_reason(status: u16) -> String {
    format!("HTTP {status}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_range() {
        let c = StatusRange::default();
        assert_eq!(c.classify(200, b""), Verdict::Success);
        assert_eq!(c.classify(302, b""), Verdict::Success);
        assert_eq!(c.classify(399, b""), Verdict::Success);
        assert_eq!(c.classify(400, b""), Verdict::failure("HTTP 400"));
        assert_eq!(c.classify(503, b""), Verdict::failure("HTTP 503"));
        assert_eq!(c.classify(199, b""), Verdict::failure("HTTP 199"));
    }

    #[test]
    fn accept_expected_errors() {
        let c = AcceptStatus::new(&[400, 422]);
        assert!(c.classify(201, b"").is_success());
        assert!(c.classify(422, b"").is_success());
        assert!(c.classify(400, b"").is_success());
        assert_eq!(c.classify(500, b""), Verdict::failure("HTTP 500"));
    }

    #[test]
    fn closure_classifier() {
        let c = |status: u16, body: &[u8]| {
            if status == 200 && body.starts_with(b"[") {
                Verdict::Success
            } else {
                Verdict::failure("expected a JSON array")
            }
        };
        assert!(c.classify(200, b"[]").is_success());
        assert!(!c.classify(200, b"{}").is_success());
    }
}
