//! In-memory identity store for tests.
//!
//! [`MemoryWallet`] keeps identities in a [`HashMap`] behind a
//! [`parking_lot::RwLock`]. It is compiled only for tests or with the
//! `testutil` feature: production wallets must be durable.
//!
//! The wallet counts lookups so that tests can assert whether a code path
//! consulted the store at all.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::{WalletError, WalletResult},
    identity::{Identity, validate_label},
    store::IdentityStore,
};

/// In-memory [`IdentityStore`] test double.
///
/// `MemoryWallet` is cheaply cloneable; all clones share the same records.
#[derive(Clone, Default)]
pub struct MemoryWallet {
    records: Arc<RwLock<HashMap<String, Identity>>>,
    lookups: Arc<AtomicU64>,
}

impl std::fmt::Debug for MemoryWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWallet").field("len", &self.records.read().len()).finish()
    }
}

impl MemoryWallet {
    /// Creates an empty wallet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a wallet pre-populated with `identities`, keyed by their labels.
    #[must_use]
    pub fn with_identities(identities: impl IntoIterator<Item = Identity>) -> Self {
        let wallet = Self::new();
        {
            let mut records = wallet.records.write();
            for identity in identities {
                records.insert(identity.label().to_owned(), identity);
            }
        }
        wallet
    }

    /// Returns how many `exists`/`get` calls the wallet has served.
    #[must_use]
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IdentityStore for MemoryWallet {
    async fn exists(&self, label: &str) -> WalletResult<bool> {
        validate_label(label)?;
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.read().contains_key(label))
    }

    async fn get(&self, label: &str) -> WalletResult<Identity> {
        validate_label(label)?;
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.records.read().get(label).cloned().ok_or_else(|| WalletError::not_found(label))
    }

    async fn put(&self, label: &str, identity: &Identity) -> WalletResult<()> {
        validate_label(label)?;
        let mut records = self.records.write();
        if records.contains_key(label) {
            return Err(WalletError::already_exists(label));
        }
        records.insert(label.to_owned(), identity.relabel(label));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn identity(label: &str) -> Identity {
        Identity::x509(label, "Org1MSP", "cert", "key").unwrap()
    }

    #[tokio::test]
    async fn put_is_not_an_upsert() {
        let wallet = MemoryWallet::new();
        wallet.put("user", &identity("user")).await.unwrap();

        let err = wallet.put("user", &identity("user")).await.unwrap_err();
        assert!(matches!(err, WalletError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn clones_share_records() {
        let wallet = MemoryWallet::with_identities([identity("user")]);
        let clone = wallet.clone();

        assert!(clone.exists("user").await.unwrap());
        assert_eq!(wallet.lookup_count(), 1);
    }

    #[tokio::test]
    async fn missing_label_is_not_found() {
        let wallet = MemoryWallet::new();
        assert!(wallet.get("nobody").await.unwrap_err().is_not_found());
    }
}
