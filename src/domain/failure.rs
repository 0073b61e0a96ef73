use crate::error::ClientError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// The fixed set of reasons a pipeline step can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    Timeout,
    Unauthorized,
    NotFound,
    MalformedGrant,
    UnexpectedInteractionRequired,
    GrantNotAccepted,
    GrantFinalizationFailed,
    TransportError,
    UnknownRemoteError,
}

/// GNAP error codes meaning the resource owner has not (yet) approved.
const NOT_ACCEPTED_CODES: [&str; 3] = ["user_denied", "request_denied", "too_fast"];

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => FailureKind::Unauthorized,
            404 | 410 => FailureKind::NotFound,
            _ => FailureKind::UnknownRemoteError,
        }
    }

    /// Operator-facing advice for this kind, if there is any beyond the message.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            FailureKind::Timeout | FailureKind::TransportError => Some(
                "The remote wallet servers may be unavailable, \
                 or there may be a network connectivity problem.",
            ),
            FailureKind::Unauthorized => Some(
                "Check the key id and private key configured for the payer wallet, \
                 and that the key is registered with the wallet.",
            ),
            FailureKind::NotFound => {
                Some("The wallet, authorization server or resource server URL may be wrong.")
            }
            FailureKind::GrantNotAccepted => Some(
                "Consent was declined or not completed at the redirect URL. \
                 Start a new transfer and accept the grant before confirming.",
            ),
            FailureKind::MalformedGrant | FailureKind::GrantFinalizationFailed => {
                Some("The authorization server returned a grant in an unexpected shape.")
            }
            FailureKind::UnexpectedInteractionRequired => Some(
                "The authorization server requires interactive consent \
                 for a grant that is normally issued directly.",
            ),
            FailureKind::UnknownRemoteError => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A classified step failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    /// The operation that failed, e.g. `quote grant`.
    pub label: String,
    pub detail: String,
    /// URI the failing operation targeted, when known.
    pub endpoint: Option<String>,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
}

impl Failure {
    pub fn new(kind: FailureKind, label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            detail: detail.into(),
            endpoint: None,
            status: None,
        }
    }

    pub fn timeout(label: impl Into<String>, deadline: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            label,
            format!("no response within {}ms", deadline.as_millis()),
        )
    }

    /// Maps a client error into the taxonomy. Checked in order: timeout
    /// marker, HTTP status, transport error, anything else.
    pub fn classify(label: impl Into<String>, error: &ClientError) -> Self {
        let (kind, status) = match error {
            ClientError::Timeout => (FailureKind::Timeout, None),
            ClientError::Status { status, .. } => {
                (FailureKind::from_status(*status), Some(*status))
            }
            ClientError::Transport(_) => (FailureKind::TransportError, None),
            ClientError::Protocol(_) => (FailureKind::UnknownRemoteError, None),
        };
        Self {
            status,
            ..Self::new(kind, label, error.to_string())
        }
    }

    /// Classification for errors returned by a grant continuation, where an
    /// explicit "not approved" answer is distinguished from other errors.
    pub fn classify_continuation(label: impl Into<String>, error: &ClientError) -> Self {
        let mut failure = Self::classify(label, error);
        if error
            .error_code()
            .is_some_and(|code| NOT_ACCEPTED_CODES.contains(&code))
        {
            failure.kind = FailureKind::GrantNotAccepted;
        }
        failure
    }

    pub fn at(mut self, endpoint: impl Into<String>) -> Self {
        if self.endpoint.is_none() {
            self.endpoint = Some(endpoint.into());
        }
        self
    }

    pub fn guidance(&self) -> Option<&'static str> {
        self.kind.guidance()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed with {}: {}", self.label, self.kind, self.detail)
    }
}

impl std::error::Error for Failure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(FailureKind::from_status(401), FailureKind::Unauthorized);
        assert_eq!(FailureKind::from_status(403), FailureKind::Unauthorized);
        assert_eq!(FailureKind::from_status(404), FailureKind::NotFound);
        assert_eq!(FailureKind::from_status(410), FailureKind::NotFound);
        assert_eq!(FailureKind::from_status(400), FailureKind::UnknownRemoteError);
        assert_eq!(FailureKind::from_status(500), FailureKind::UnknownRemoteError);
    }

    #[test]
    fn test_classification_order() {
        let timeout = Failure::classify("wallet", &ClientError::Timeout);
        assert_eq!(timeout.kind, FailureKind::Timeout);
        assert_eq!(timeout.status, None);

        let unauthorized =
            Failure::classify("quote grant", &ClientError::status(401, "invalid signature"));
        assert_eq!(unauthorized.kind, FailureKind::Unauthorized);
        assert_eq!(unauthorized.status, Some(401));
        assert_eq!(unauthorized.label, "quote grant");

        let transport =
            Failure::classify("wallet", &ClientError::Transport("dns error".to_string()));
        assert_eq!(transport.kind, FailureKind::TransportError);

        let protocol = Failure::classify("wallet", &ClientError::Protocol("not json".to_string()));
        assert_eq!(protocol.kind, FailureKind::UnknownRemoteError);
    }

    #[test]
    fn test_continuation_not_accepted_codes() {
        let denied = Failure::classify_continuation(
            "grant continuation",
            &ClientError::status_with_code(401, "request_denied", "grant not approved"),
        );
        assert_eq!(denied.kind, FailureKind::GrantNotAccepted);

        let signature = Failure::classify_continuation(
            "grant continuation",
            &ClientError::status_with_code(401, "invalid_client", "bad signature"),
        );
        assert_eq!(signature.kind, FailureKind::Unauthorized);

        // the same code outside a continuation is just a status
        let plain = Failure::classify(
            "quote grant",
            &ClientError::status_with_code(401, "request_denied", "nope"),
        );
        assert_eq!(plain.kind, FailureKind::Unauthorized);
    }

    #[test]
    fn test_guidance() {
        assert!(
            FailureKind::Unauthorized
                .guidance()
                .unwrap()
                .contains("private key")
        );
        assert!(FailureKind::Timeout.guidance().unwrap().contains("unavailable"));
        assert!(FailureKind::UnknownRemoteError.guidance().is_none());
    }

    #[test]
    fn test_endpoint_is_set_once() {
        let failure = Failure::timeout("quote", Duration::from_millis(5))
            .at("https://rs.test")
            .at("https://other.test");
        assert_eq!(failure.endpoint.as_deref(), Some("https://rs.test"));
        assert_eq!(failure.detail, "no response within 5ms");
    }
}
