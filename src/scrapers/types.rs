use crate::models::Listing;
use std::fmt;

/// Result of one extraction attempt or of a whole platform strategy
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// At least one listing was extracted
    Success(Vec<Listing>),
    /// The site answered and there is nothing matching; not an error
    Empty,
    /// An anti-automation defense stopped us
    Blocked(String),
    /// Network, timeout or parse fault
    TransientError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    Empty,
    Blocked,
    TransientError,
}

impl ExtractionOutcome {
    /// `Success` never carries an empty list.
    pub fn from_listings(listings: Vec<Listing>) -> Self {
        if listings.is_empty() {
            ExtractionOutcome::Empty
        } else {
            ExtractionOutcome::Success(listings)
        }
    }

    pub fn transient(cause: impl fmt::Display) -> Self {
        ExtractionOutcome::TransientError(cause.to_string())
    }

    pub fn blocked(reason: impl fmt::Display) -> Self {
        ExtractionOutcome::Blocked(reason.to_string())
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            ExtractionOutcome::Success(_) => OutcomeKind::Success,
            ExtractionOutcome::Empty => OutcomeKind::Empty,
            ExtractionOutcome::Blocked(_) => OutcomeKind::Blocked,
            ExtractionOutcome::TransientError(_) => OutcomeKind::TransientError,
        }
    }

    /// Non-2xx answer from a platform API. Rate limiting and bot walls are
    /// `Blocked`; everything else may succeed on a later run.
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            403 | 429 | 503 => ExtractionOutcome::blocked(format!("HTTP {}", status)),
            _ => ExtractionOutcome::transient(format!("HTTP {}", status)),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ExtractionOutcome::Blocked(_) | ExtractionOutcome::TransientError(_)
        )
    }

    pub fn listing_count(&self) -> usize {
        match self {
            ExtractionOutcome::Success(listings) => listings.len(),
            _ => 0,
        }
    }

    pub fn into_listings(self) -> Vec<Listing> {
        match self {
            ExtractionOutcome::Success(listings) => listings,
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for ExtractionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionOutcome::Success(listings) => write!(f, "{} listing(s)", listings.len()),
            ExtractionOutcome::Empty => f.write_str("no results"),
            ExtractionOutcome::Blocked(reason) => write!(f, "blocked: {}", reason),
            ExtractionOutcome::TransientError(cause) => write!(f, "failed: {}", cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use reqwest::StatusCode;

    #[test]
    fn empty_list_is_not_success() {
        assert_eq!(ExtractionOutcome::from_listings(Vec::new()), ExtractionOutcome::Empty);
        let one = vec![Listing::new(Platform::Pap, "1", "T", 500, "https://www.pap.fr/annonces/r1")];
        assert_eq!(ExtractionOutcome::from_listings(one).kind(), OutcomeKind::Success);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ExtractionOutcome::from_status(StatusCode::FORBIDDEN).kind(), OutcomeKind::Blocked);
        assert_eq!(ExtractionOutcome::from_status(StatusCode::TOO_MANY_REQUESTS).kind(), OutcomeKind::Blocked);
        assert_eq!(
            ExtractionOutcome::from_status(StatusCode::INTERNAL_SERVER_ERROR).kind(),
            OutcomeKind::TransientError
        );
    }

    #[test]
    fn only_blocked_and_transient_are_failures() {
        assert!(ExtractionOutcome::blocked("datadome").is_failure());
        assert!(ExtractionOutcome::transient("timeout").is_failure());
        assert!(!ExtractionOutcome::Empty.is_failure());
    }
}
