//! Identity wallet for ledger network clients.
//!
//! This crate provides the [`IdentityStore`] trait and its durable
//! [`FileSystemWallet`] implementation. An identity pairs an X.509
//! certificate and private key with the MSP identifier of the organization
//! that issued it; the ledger client resolves one before every session it
//! opens.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Ledger gateway (session manager)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 IdentityStore trait                         │
//! │                 (exists, get, put)                          │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │ FileSystemWallet (production)│ MemoryWallet (testutil)      │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use claimledger_wallet::{FileSystemWallet, Identity, IdentityStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let wallet = FileSystemWallet::open("wallet").await?;
//!
//!     if !wallet.exists("Admin@org2.example.com").await? {
//!         let admin = Identity::x509(
//!             "Admin@org2.example.com",
//!             "Org2MSP",
//!             std::fs::read("signcerts/cert.pem")?,
//!             std::fs::read("keystore/priv_sk")?,
//!         )?;
//!         wallet.put("Admin@org2.example.com", &admin).await?;
//!     }
//!
//!     let admin = wallet.get("Admin@org2.example.com").await?;
//!     println!("{} belongs to {}", admin.label(), admin.msp_id());
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables [`MemoryWallet`] and the `testutil` module with test identities.
//! - **`failpoints`**: Activates `fail` injection points in the file-system wallet.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
mod filesystem;
mod identity;
#[cfg(any(test, feature = "testutil"))]
mod memory;
mod store;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
mod types;

pub use error::{BoxError, WalletError, WalletResult};
pub use filesystem::FileSystemWallet;
pub use identity::{Identity, IdentityKind, MAX_LABEL_LEN, validate_label};
#[cfg(any(test, feature = "testutil"))]
pub use memory::MemoryWallet;
pub use store::IdentityStore;
pub use types::{MspId, OrgId};
pub use zeroize::Zeroizing;
