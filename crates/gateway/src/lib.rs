//! Session-caching client for a permissioned ledger network.
//!
//! A caller names an organization, a wallet identity, a contract, a
//! function with ordered string arguments, and a [`Mode`]. The gateway
//! resolves the identity, loads the organization's connection profile,
//! reuses or establishes a discovery-enabled session for the pair, runs the
//! transaction, and classifies any failure into an [`ErrorKind`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 LedgerGateway::execute                      │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │ SessionManager::acquire      │ ContractInvoker::invoke      │
//! │ (wallet, profiles, cache)    │ (evaluate | endorse/submit)  │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                 LedgerConnector / LedgerConnection          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 classify: GatewayError → ErrorKind          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! # async fn run(connector: std::sync::Arc<dyn claimledger_gateway::LedgerConnector>)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! use claimledger_gateway::{GatewayConfig, LedgerGateway, Mode, TransactionRequest};
//!
//! let config = GatewayConfig::builder().profile_dir("profiles").build()?;
//! let gateway = LedgerGateway::open(&config, connector).await?;
//!
//! let request = TransactionRequest::builder()
//!     .org("org2")
//!     .identity("Admin@org2.example.com")
//!     .contract("registration")
//!     .function("QueryPolicy")
//!     .args(["POL1"])
//!     .mode(Mode::Evaluate)
//!     .build()?;
//! let result = gateway.execute(&request).await?;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with [`testutil::MockLedger`]
//!   and profile helpers.
//! - **`failpoints`**: Activates `fail` injection points in session
//!   establishment and evaluate retry.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classify;
pub mod config;
pub mod connector;
pub mod error;
mod gateway;
mod invoker;
mod manager;
mod metrics;
pub mod profile;
mod retry;
mod session;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

pub use classify::classify;
pub use config::{DiscoveryConfig, GatewayConfig, RetryConfig, TimeoutConfig};
pub use connector::{
    CommitStatus, ConnectRequest, EndorsedTransaction, EndorsementDetail, GatewayError,
    LedgerConnection, LedgerConnector, Proposal,
};
pub use error::{BoxError, ConfigError, ErrorKind, LedgerError, Result};
pub use gateway::LedgerGateway;
pub use invoker::{
    ContractInvoker, EvaluateResult, Mode, SubmitConfirmation, TransactionRequest,
    TransactionResult, new_transaction_id,
};
pub use manager::SessionManager;
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use profile::{ConnectionProfile, ProfileLoader};
pub use session::{Acquired, Session, SessionCache, SessionKey};
