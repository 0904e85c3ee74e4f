//! Error taxonomy for upstream calls.

use std::fmt;

/// The result type used throughout covet-resy.
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// The protocol step a network failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The password login call.
    Login,
    /// The venue search call.
    Search,
    /// The FIND slot-listing call.
    Find,
    /// The DETAIL book-token exchange.
    Detail,
    /// The BOOK commit call.
    Book,
}

impl Step {
    /// Returns the lowercase wire name of the step.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Search => "search",
            Self::Find => "find",
            Self::Detail => "detail",
            Self::Book => "book",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the protocol client.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The login endpoint rejected the credentials (HTTP 419).
    #[error("upstream rejected the login credentials")]
    LoginWrong,

    /// The account has no payment method on file.
    #[error("account has no payment method on file")]
    NoPaymentInfo,

    /// FIND returned zero venues for the requested day.
    #[error("no venues returned for the requested day")]
    NoOffer,

    /// Every candidate slot was exhausted without a confirmed booking.
    #[error("no bookable table matched the request")]
    NoTable,

    /// The WAF challenge persisted through the whole retry budget.
    #[error("WAF challenge unresolved after retries")]
    WafBlocked,

    /// Any other non-2xx or transport failure.
    #[error("{step} request failed (status {status}): {message}")]
    Network {
        /// The protocol step that failed.
        step: Step,
        /// The HTTP status, or 0 for transport and shape errors.
        status: u16,
        /// A short human-readable description.
        message: String,
    },
}

impl UpstreamError {
    /// Creates a network error for the given step.
    #[must_use]
    pub fn network(step: Step, status: u16, message: impl Into<String>) -> Self {
        Self::Network {
            step,
            status,
            message: message.into(),
        }
    }

    /// Creates a network error describing a response whose shape was not
    /// the one the protocol promises.
    #[must_use]
    pub fn invalid_response(step: Step, message: impl Into<String>) -> Self {
        Self::Network {
            step,
            status: 0,
            message: format!("invalid response: {}", message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_names_match_the_wire() {
        assert_eq!(Step::Login.to_string(), "login");
        assert_eq!(Step::Find.to_string(), "find");
        assert_eq!(Step::Detail.to_string(), "detail");
        assert_eq!(Step::Book.to_string(), "book");
    }

    #[test]
    fn network_error_carries_context() {
        let err = UpstreamError::network(Step::Find, 502, "bad gateway");
        assert_eq!(
            err.to_string(),
            "find request failed (status 502): bad gateway"
        );
    }
}
