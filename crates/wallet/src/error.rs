//! Wallet error types and result alias.
//!
//! Every [`IdentityStore`](crate::IdentityStore) implementation maps its
//! internal failures to these variants.
//!
//! # Error Types
//!
//! - [`WalletError::NotFound`] - No identity is stored under the label
//! - [`WalletError::AlreadyExists`] - `put` found an existing record for the label
//! - [`WalletError::InvalidLabel`] - The label cannot be used as a wallet key
//! - [`WalletError::Io`] - The backing store could not be read or written
//! - [`WalletError::Serialization`] - A stored record could not be encoded or decoded
//!
//! # Example
//!
//! ```
//! use claimledger_wallet::{WalletError, WalletResult};
//!
//! fn lookup(label: &str) -> WalletResult<()> {
//!     Err(WalletError::not_found(label))
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for wallet operations.
pub type WalletResult<T> = Result<T, WalletError>;

/// Errors that can occur while reading or writing identities.
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum WalletError {
    /// No identity is stored under the label.
    #[error("An identity for the user {label} does not exist in the wallet")]
    NotFound {
        /// The label that was looked up.
        label: String,
    },

    /// An identity is already stored under the label.
    ///
    /// `put` is not an upsert; callers that want idempotent imports must
    /// check [`exists`](crate::IdentityStore::exists) first.
    #[error("Identity {label} already exists in the wallet")]
    AlreadyExists {
        /// The label that was already taken.
        label: String,
    },

    /// The label cannot be used as a wallet key.
    #[error("Invalid identity label {label:?}: {reason}")]
    InvalidLabel {
        /// The rejected label.
        label: String,
        /// Why the label was rejected.
        reason: &'static str,
    },

    /// The backing store could not be read or written.
    #[error("Wallet I/O error: {message}")]
    Io {
        /// Description of the failed operation.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: Option<BoxError>,
    },

    /// A stored record could not be encoded or decoded.
    #[error("Wallet serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl WalletError {
    /// Creates a new `NotFound` error for the given label.
    #[must_use]
    pub fn not_found(label: impl Into<String>) -> Self {
        Self::NotFound { label: label.into() }
    }

    /// Creates a new `AlreadyExists` error for the given label.
    #[must_use]
    pub fn already_exists(label: impl Into<String>) -> Self {
        Self::AlreadyExists { label: label.into() }
    }

    /// Creates a new `InvalidLabel` error.
    #[must_use]
    pub fn invalid_label(label: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidLabel { label: label.into(), reason }
    }

    /// Creates a new `Io` error with a message and source error.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` if the error reports a missing identity.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
