use thiserror::Error;

/// Errors surfaced by the conversation adapter.
///
/// Every variant carries the upstream message so callers can show it verbatim.
/// Use [`Error::kind`] to branch on the failure without inspecting text.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required credential was absent before any request was attempted.
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// The generic-http backend rejected the credential (HTTP 401).
    #[error("credential rejected: {0}")]
    AuthInvalid(String),

    /// The managed backend has no credential, or reports it (or the requested
    /// resource) as invalid or not found.
    #[error("credential missing or invalid: {0}")]
    AuthMissingOrInvalid(String),

    /// Rate limit or quota exhaustion reported by the backend.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The base URL or model id is probably wrong.
    #[error("endpoint or model not found: {0}")]
    EndpointOrModelNotFound(String),

    /// The host could not be reached at all.
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The history cannot be turned into a multi-turn session.
    #[error("invalid history state: {0}")]
    InvalidHistoryState(String),

    /// The configuration names a provider kind we do not know.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// A JSON-expecting generation call returned something else.
    #[error("malformed generation output: {0}")]
    MalformedGenerationOutput(String),

    /// Any other backend failure.
    #[error("provider error: {0}")]
    Unknown(String),
}

/// Discriminant of [`Error`], for matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingCredential,
    AuthInvalid,
    AuthMissingOrInvalid,
    QuotaExceeded,
    EndpointOrModelNotFound,
    NetworkUnreachable,
    InvalidHistoryState,
    UnsupportedProvider,
    MalformedGenerationOutput,
    Unknown,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential(_) => ErrorKind::MissingCredential,
            Self::AuthInvalid(_) => ErrorKind::AuthInvalid,
            Self::AuthMissingOrInvalid(_) => ErrorKind::AuthMissingOrInvalid,
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Self::EndpointOrModelNotFound(_) => ErrorKind::EndpointOrModelNotFound,
            Self::NetworkUnreachable(_) => ErrorKind::NetworkUnreachable,
            Self::InvalidHistoryState(_) => ErrorKind::InvalidHistoryState,
            Self::UnsupportedProvider(_) => ErrorKind::UnsupportedProvider,
            Self::MalformedGenerationOutput(_) => ErrorKind::MalformedGenerationOutput,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// The upstream message, without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::MissingCredential(m)
            | Self::AuthInvalid(m)
            | Self::AuthMissingOrInvalid(m)
            | Self::QuotaExceeded(m)
            | Self::EndpointOrModelNotFound(m)
            | Self::NetworkUnreachable(m)
            | Self::InvalidHistoryState(m)
            | Self::UnsupportedProvider(m)
            | Self::MalformedGenerationOutput(m)
            | Self::Unknown(m) => m,
        }
    }

    /// Whether the caller should prompt for a new credential.
    pub fn needs_credentials(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MissingCredential | ErrorKind::AuthInvalid | ErrorKind::AuthMissingOrInvalid
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_kinds_need_credentials() {
        assert!(Error::MissingCredential("x".into()).needs_credentials());
        assert!(Error::AuthInvalid("x".into()).needs_credentials());
        assert!(Error::AuthMissingOrInvalid("x".into()).needs_credentials());
        assert!(!Error::QuotaExceeded("x".into()).needs_credentials());
        assert!(!Error::NetworkUnreachable("x".into()).needs_credentials());
    }

    #[test]
    fn message_strips_prefix() {
        let err = Error::QuotaExceeded("slow down".into());
        assert_eq!(err.message(), "slow down");
        assert_eq!(err.to_string(), "quota exceeded: slow down");
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
    }
}
