use thiserror::Error;

/// Error taxonomy for the client library.
///
/// Cache and token-cache internals never surface these; they log and degrade
/// to `None`/`false`. Service calls log and propagate them so callers can
/// branch on the outcome (re-authenticate on `Unauthorized`, force sign-out
/// on `Forbidden`, fail fast on `MissingConfig`).
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration is absent. Fatal to the current operation only.
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    /// Network, TLS, or timeout failure from the HTTP layer.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the credential (401). The token cache has already
    /// been cleared; the next request re-runs the session bootstrap.
    #[error("authentication required")]
    Unauthorized,

    /// The credential was accepted but the operation is not permitted (403).
    #[error("access denied: {0}")]
    Forbidden(String),

    /// Role string matched neither the admin nor the superadmin route.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// Phone number failed E.164 normalization.
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    /// Any other non-success HTTP status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape.
    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Local persistence failure (preferences, stored session).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Classify a non-success response, preserving the body for diagnostics.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => Error::Unauthorized,
            403 => Error::Forbidden(if body.is_empty() {
                "forbidden".to_string()
            } else {
                body
            }),
            _ => Error::Status { status, body },
        }
    }

    /// True for faults worth retrying after a fresh sign-in.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert!(matches!(
            Error::from_status(401, String::new()),
            Error::Unauthorized
        ));
        assert!(matches!(
            Error::from_status(403, "nope".into()),
            Error::Forbidden(msg) if msg == "nope"
        ));
        assert!(matches!(
            Error::from_status(500, "boom".into()),
            Error::Status { status: 500, .. }
        ));
    }

    #[test]
    fn forbidden_falls_back_to_label() {
        match Error::from_status(403, String::new()) {
            Error::Forbidden(msg) => assert_eq!(msg, "forbidden"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn only_unauthorized_is_an_auth_fault() {
        assert!(Error::Unauthorized.is_auth());
        assert!(!Error::Forbidden("denied".into()).is_auth());
        assert!(!Error::from_status(500, "boom".into()).is_auth());
    }
}
