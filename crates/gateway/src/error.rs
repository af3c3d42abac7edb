//! Classified error types for the ledger gateway.
//!
//! Every failure that leaves this crate is a [`LedgerError`] carrying a
//! stable [`ErrorKind`]. Low-level connector failures
//! ([`GatewayError`](crate::GatewayError)) and wallet failures are folded
//! into this taxonomy by the [`classify`](crate::classify) module.
//!
//! # Error Kinds
//!
//! | Kind | Class | Evicts session |
//! |------|-------|----------------|
//! | `IdentityNotFound`, `ProfileNotFound`, `ProfileMalformed` | configuration | no |
//! | `ConnectFailed`, `DiscoveryFailed`, `ConnectivityLost` | connectivity | yes |
//! | `EndorsementFailed`, `ValidationFailed` | business outcome | no |
//! | `ContractNotFound`, `Timeout`, `UpstreamFailure` | other | no |

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Stable classification of ledger client failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The identity label is not present in the wallet.
    IdentityNotFound,
    /// No connection profile exists for the organization.
    ProfileNotFound,
    /// The organization's connection profile could not be parsed or validated.
    ProfileMalformed,
    /// A connection to the organization's peers could not be established.
    ConnectFailed,
    /// Peer discovery on the channel failed.
    DiscoveryFailed,
    /// The contract is not deployed on the channel.
    ContractNotFound,
    /// Peers did not produce the endorsements the transaction requires.
    EndorsementFailed,
    /// The ledger rejected the transaction after ordering (e.g. a conflicting write).
    ValidationFailed,
    /// The call exceeded its deadline.
    Timeout,
    /// A previously live session lost its connection.
    ConnectivityLost,
    /// Any failure not covered by another kind.
    UpstreamFailure,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 11] = [
        Self::IdentityNotFound,
        Self::ProfileNotFound,
        Self::ProfileMalformed,
        Self::ConnectFailed,
        Self::DiscoveryFailed,
        Self::ContractNotFound,
        Self::EndorsementFailed,
        Self::ValidationFailed,
        Self::Timeout,
        Self::ConnectivityLost,
        Self::UpstreamFailure,
    ];

    /// Returns the snake-case name used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdentityNotFound => "identity_not_found",
            Self::ProfileNotFound => "profile_not_found",
            Self::ProfileMalformed => "profile_malformed",
            Self::ConnectFailed => "connect_failed",
            Self::DiscoveryFailed => "discovery_failed",
            Self::ContractNotFound => "contract_not_found",
            Self::EndorsementFailed => "endorsement_failed",
            Self::ValidationFailed => "validation_failed",
            Self::Timeout => "timeout",
            Self::ConnectivityLost => "connectivity_lost",
            Self::UpstreamFailure => "upstream_failure",
        }
    }

    /// Returns `true` for failures that invalidate the session they occurred on.
    #[must_use]
    pub fn is_connectivity(self) -> bool {
        matches!(self, Self::ConnectFailed | Self::DiscoveryFailed | Self::ConnectivityLost)
    }

    /// Returns `true` for failures caused by local configuration
    /// (wallet or connection profile). These are never retried.
    #[must_use]
    pub fn is_configuration(self) -> bool {
        matches!(self, Self::IdentityNotFound | Self::ProfileNotFound | Self::ProfileMalformed)
    }

    /// Returns `true` for definitive answers from the ledger about the
    /// transaction itself, as opposed to transport failures.
    #[must_use]
    pub fn is_business_outcome(self) -> bool {
        matches!(self, Self::EndorsementFailed | Self::ValidationFailed)
    }

    /// Returns `true` for failures that a read-only call may reasonably retry.
    #[must_use]
    pub fn is_transient(self) -> bool {
        self.is_connectivity() || self == Self::Timeout
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified ledger client failure.
///
/// Carries the [`ErrorKind`], a human-readable message, the transaction ID
/// when the failure happened after one was assigned, and the underlying
/// error for source-chain inspection.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LedgerError {
    kind: ErrorKind,
    message: String,
    transaction_id: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl LedgerError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), transaction_id: None, source: None }
    }

    /// Creates an error of the given kind with a source error.
    #[must_use]
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { kind, message: message.into(), transaction_id: None, source: Some(Arc::new(source)) }
    }

    /// Attaches the transaction ID the failure belongs to.
    #[must_use]
    pub fn for_transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    /// Creates an `IdentityNotFound` error.
    #[must_use]
    pub fn identity_not_found(label: &str) -> Self {
        Self::new(
            ErrorKind::IdentityNotFound,
            format!("An identity for the user {label} does not exist in the wallet."),
        )
    }

    /// Creates a `ProfileNotFound` error.
    #[must_use]
    pub fn profile_not_found(org: impl std::fmt::Display, detail: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::ProfileNotFound,
            format!("Connection profile for organization {org} not found: {detail}"),
        )
    }

    /// Creates a `ProfileMalformed` error.
    #[must_use]
    pub fn profile_malformed(org: impl std::fmt::Display, detail: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::ProfileMalformed,
            format!("Connection profile for organization {org} is malformed: {detail}"),
        )
    }

    /// Creates a `Timeout` error for an operation that exceeded `limit`.
    #[must_use]
    pub fn timeout(operation: &str, limit: std::time::Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("{operation} timed out after {}ms", limit.as_millis()),
        )
    }

    /// Creates an `UpstreamFailure` error.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamFailure, message)
    }

    /// Returns the classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the transaction ID, if one had been assigned.
    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }
}

/// Errors that can occur when validating configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A value is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// The offending field.
        field: &'static str,
        /// The minimum allowed value.
        min: String,
        /// The rejected value.
        value: String,
    },

    /// A duration or count must be strictly positive.
    #[error("{field} must be positive, got {value}")]
    MustBePositive {
        /// The offending field.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A required value is missing or empty.
    #[error("{field} is required")]
    Missing {
        /// The offending field.
        field: &'static str,
    },

    /// A value is present but not usable.
    #[error("{field} is invalid: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn kinds_are_indexed_in_declaration_order() {
        for (i, kind) in ErrorKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn connectivity_and_business_classes_are_disjoint() {
        for kind in ErrorKind::ALL {
            assert!(!(kind.is_connectivity() && kind.is_business_outcome()), "{kind}");
            assert!(!(kind.is_configuration() && kind.is_transient()), "{kind}");
        }
    }

    #[test]
    fn timeout_is_transient_but_not_connectivity() {
        assert!(ErrorKind::Timeout.is_transient());
        assert!(!ErrorKind::Timeout.is_connectivity());
    }

    #[test]
    fn identity_not_found_message() {
        let err = LedgerError::identity_not_found("Admin@org2.example.com");
        assert_eq!(err.kind(), ErrorKind::IdentityNotFound);
        assert_eq!(
            err.to_string(),
            "An identity for the user Admin@org2.example.com does not exist in the wallet."
        );
        assert!(err.transaction_id().is_none());
    }

    #[test]
    fn source_chain_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = LedgerError::with_source(ErrorKind::ProfileNotFound, "no profile", io)
            .for_transaction("tx1");
        assert!(err.source().is_some());
        assert_eq!(err.transaction_id(), Some("tx1"));
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::BelowMinimum { field: "max_backoff", min: "1ms".into(), value: "0ms".into() };
        assert_eq!(err.to_string(), "max_backoff must be at least 1ms, got 0ms");
    }
}
