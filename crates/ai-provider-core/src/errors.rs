use std::fmt;

/// Taxonomy of the internal error kinds the core classifies every provider
/// failure into (spec §7). The RPC dispatcher maps these to host-visible
/// status codes; providers and the manager never expose raw transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Transport,
    Timeout,
    RateLimit,
    ServerError,
    ClientError,
    BadResponse,
    BadRequest,
    ProviderNotFound,
    NoClientsAvailable,
    ManagerClosed,
    Canceled,
    Internal,
}

impl ProviderErrorKind {
    /// Whether the retry policy should attempt another call after an error
    /// of this kind (spec §4.D).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ProviderErrorKind::Transport | ProviderErrorKind::Timeout | ProviderErrorKind::RateLimit | ProviderErrorKind::ServerError
        )
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderErrorKind::Transport => "transport",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::RateLimit => "rate_limit",
            ProviderErrorKind::ServerError => "server_error",
            ProviderErrorKind::ClientError => "client_error",
            ProviderErrorKind::BadResponse => "bad_response",
            ProviderErrorKind::BadRequest => "bad_request",
            ProviderErrorKind::ProviderNotFound => "provider_not_found",
            ProviderErrorKind::NoClientsAvailable => "no_clients_available",
            ProviderErrorKind::ManagerClosed => "manager_closed",
            ProviderErrorKind::Canceled => "canceled",
            ProviderErrorKind::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// A classified core error: a taxonomy kind plus a scrubbed, human-readable
/// message. Never carries secrets (spec §7 user-visible behavior).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ServerError, message)
    }

    pub fn client_error(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ClientError, message)
    }

    pub fn bad_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::BadResponse, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::BadRequest, message)
    }

    pub fn provider_not_found(tag: &str) -> Self {
        Self::new(
            ProviderErrorKind::ProviderNotFound,
            format!("no provider registered for tag '{tag}'"),
        )
    }

    pub fn no_clients_available() -> Self {
        Self::new(
            ProviderErrorKind::NoClientsAvailable,
            "manager has zero configured clients",
        )
    }

    pub fn manager_closed() -> Self {
        Self::new(ProviderErrorKind::ManagerClosed, "manager is closed")
    }

    pub fn canceled() -> Self {
        Self::new(ProviderErrorKind::Canceled, "operation canceled")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Internal, message)
    }

    /// HTTP status codes that are explicitly non-retryable regardless of
    /// category (spec §4.D): 400, 401, 403, 404.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::rate_limit(message),
            400 | 401 | 403 | 404 => Self::client_error(message),
            s if (400..500).contains(&s) => Self::client_error(message),
            s if (500..600).contains(&s) => Self::server_error(message),
            _ => Self::internal(message),
        }
    }
}
