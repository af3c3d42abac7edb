//! Storage trait for identity lookup and import.
//!
//! The [`IdentityStore`] trait abstracts where identities live. Production
//! code uses [`FileSystemWallet`](crate::FileSystemWallet); tests can use
//! the in-memory double behind the `testutil` feature.
//!
//! # Usage
//!
//! ```no_run
//! use claimledger_wallet::{IdentityStore, WalletResult};
//!
//! async fn require_admin<S: IdentityStore>(store: &S) -> WalletResult<()> {
//!     let identity = store.get("Admin@org2.example.com").await?;
//!     println!("acting as {}", identity.msp_id());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::{error::WalletResult, identity::Identity};

/// Persistence layer for identity records.
///
/// Identities are read far more often than they are written: every ledger
/// call resolves its identity here, while writes only happen during a
/// one-shot import. Implementations must be safe under concurrent reads
/// and writes from many in-flight requests.
///
/// The ledger client never mutates or deletes an identity, so the trait
/// exposes no update or delete operation.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Returns `true` if an identity is stored under `label`.
    ///
    /// # Errors
    ///
    /// Returns an error if the label is invalid or the store cannot be read.
    async fn exists(&self, label: &str) -> WalletResult<bool>;

    /// Retrieves the identity stored under `label`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::NotFound`](crate::WalletError::NotFound) if no
    /// identity is stored under the label, or another variant if the
    /// record cannot be read or decoded.
    async fn get(&self, label: &str) -> WalletResult<Identity>;

    /// Stores `identity` under `label`.
    ///
    /// This is not an upsert: if a record is already present the call fails
    /// and the stored record is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::AlreadyExists`](crate::WalletError::AlreadyExists)
    /// if the label is taken, or another variant if the record cannot be
    /// written.
    async fn put(&self, label: &str, identity: &Identity) -> WalletResult<()>;
}

#[async_trait]
impl<S: IdentityStore + ?Sized> IdentityStore for Arc<S> {
    async fn exists(&self, label: &str) -> WalletResult<bool> {
        (**self).exists(label).await
    }

    async fn get(&self, label: &str) -> WalletResult<Identity> {
        (**self).get(label).await
    }

    async fn put(&self, label: &str, identity: &Identity) -> WalletResult<()> {
        (**self).put(label, identity).await
    }
}
