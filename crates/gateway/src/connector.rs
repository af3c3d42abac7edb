//! The seam between the gateway and a ledger network SDK.
//!
//! A [`LedgerConnector`] opens an authenticated [`LedgerConnection`] to an
//! organization's peers using an [`Identity`] and a
//! [`ConnectionProfile`]. The connection speaks the ledger's
//! evaluate/endorse/submit/commit-status protocol and reports failures as
//! unclassified [`GatewayError`] values; the gateway classifies them into
//! [`ErrorKind`](crate::ErrorKind)s.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use claimledger_wallet::Identity;
use thiserror::Error;

use crate::{config::DiscoveryConfig, profile::ConnectionProfile};

/// Validation code reported for a committed, valid transaction.
pub const VALID_CODE: &str = "VALID";

/// A peer's rejection recorded during endorsement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndorsementDetail {
    /// The peer that rejected the proposal.
    pub peer: String,
    /// The peer's MSP identifier.
    pub msp_id: String,
    /// The rejection message.
    pub message: String,
}

/// A low-level failure reported by a [`LedgerConnection`].
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The peer endpoint could not be reached or refused the handshake.
    #[error("failed to connect to {endpoint}: {message}")]
    Connection {
        /// The endpoint that failed.
        endpoint: String,
        /// Transport detail.
        message: String,
    },

    /// Service discovery for a channel failed.
    #[error("discovery on channel {channel} failed: {message}")]
    Discovery {
        /// The channel being discovered.
        channel: String,
        /// Discovery detail.
        message: String,
    },

    /// The contract is not installed or committed on the channel.
    #[error("contract {contract} is not deployed on channel {channel}")]
    ContractNotFound {
        /// The requested contract.
        contract: String,
        /// The channel searched.
        channel: String,
    },

    /// The contract function returned an error.
    #[error("chaincode returned status {status}: {message}")]
    Chaincode {
        /// The chaincode response status.
        status: i32,
        /// The chaincode error message.
        message: String,
    },

    /// The proposal did not collect the endorsements the policy requires.
    #[error("endorsement of transaction {tx_id} failed: {message}")]
    Endorsement {
        /// The transaction ID.
        tx_id: String,
        /// Summary message.
        message: String,
        /// Per-peer rejections.
        details: Vec<EndorsementDetail>,
    },

    /// The ordering service rejected the transaction.
    #[error("ordering of transaction {tx_id} failed: {message}")]
    Ordering {
        /// The transaction ID.
        tx_id: String,
        /// Orderer detail.
        message: String,
    },

    /// The transaction was ordered but marked invalid at commit.
    #[error("transaction {tx_id} failed to commit with status code {validation_code}")]
    Commit {
        /// The transaction ID.
        tx_id: String,
        /// The validation code, e.g. `MVCC_READ_CONFLICT`.
        validation_code: String,
    },

    /// A call exceeded its deadline.
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline in milliseconds.
        duration_ms: u64,
    },

    /// A gRPC status returned by a peer or orderer.
    #[error("rpc failed with {code:?}: {message}")]
    Rpc {
        /// The status code.
        code: tonic::Code,
        /// The status message.
        message: String,
    },

    /// An established connection dropped.
    #[error("connection lost: {message}")]
    Disconnected {
        /// Transport detail.
        message: String,
    },

    /// The peer answered with something the client could not interpret.
    #[error("malformed response: {message}")]
    MalformedResponse {
        /// Parse detail.
        message: String,
    },

    /// The connection was closed locally.
    #[error("connection is closed")]
    Shutdown,
}

impl GatewayError {
    /// Creates a timeout error for `operation`.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns the transaction ID carried by the error, if any.
    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            Self::Endorsement { tx_id, .. }
            | Self::Ordering { tx_id, .. }
            | Self::Commit { tx_id, .. } => Some(tx_id),
            _ => None,
        }
    }
}

impl From<tonic::Status> for GatewayError {
    fn from(status: tonic::Status) -> Self {
        Self::Rpc { code: status.code(), message: status.message().to_owned() }
    }
}

/// A transaction proposal addressed to one contract function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Client-generated transaction ID.
    pub transaction_id: String,
    /// Target channel.
    pub channel: String,
    /// Contract name.
    pub contract: String,
    /// Function name.
    pub function: String,
    /// Ordered string arguments.
    pub args: Vec<String>,
}

/// An endorsed transaction ready for ordering.
#[derive(Debug, Clone)]
pub struct EndorsedTransaction {
    /// The transaction ID.
    pub transaction_id: String,
    /// The contract function's return value.
    pub result: Bytes,
    /// Opaque signed envelope passed back to [`LedgerConnection::submit`].
    pub envelope: Bytes,
}

/// Final status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitStatus {
    /// The transaction ID.
    pub transaction_id: String,
    /// Block containing the transaction.
    pub block_number: u64,
    /// Validation code assigned by the committing peers.
    pub validation_code: String,
}

impl CommitStatus {
    /// Returns `true` if the transaction committed successfully.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validation_code == VALID_CODE
    }
}

/// Everything a connector needs to open a connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest<'a> {
    /// The signing identity.
    pub identity: &'a Identity,
    /// The organization's network profile.
    pub profile: &'a ConnectionProfile,
    /// Discovery options.
    pub discovery: &'a DiscoveryConfig,
    /// Deadline for the handshake.
    pub timeout: Duration,
}

/// Opens connections to a ledger network.
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    /// Connects to the peers in `request.profile` as `request.identity`.
    async fn connect(
        &self,
        request: ConnectRequest<'_>,
    ) -> Result<Arc<dyn LedgerConnection>, GatewayError>;
}

/// An authenticated connection to an organization's peers.
///
/// Implementations must be safe to share across concurrent invocations.
#[async_trait]
pub trait LedgerConnection: Send + Sync + std::fmt::Debug {
    /// Runs service discovery for `channel`.
    async fn discover(&self, channel: &str) -> Result<(), GatewayError>;

    /// Evaluates a proposal on a single peer without ordering it.
    async fn evaluate(&self, proposal: &Proposal) -> Result<Bytes, GatewayError>;

    /// Collects endorsements for a proposal.
    async fn endorse(&self, proposal: &Proposal) -> Result<EndorsedTransaction, GatewayError>;

    /// Sends an endorsed transaction to the ordering service.
    async fn submit(&self, transaction: &EndorsedTransaction) -> Result<(), GatewayError>;

    /// Waits for the commit status of a submitted transaction.
    async fn commit_status(
        &self,
        channel: &str,
        transaction_id: &str,
    ) -> Result<CommitStatus, GatewayError>;

    /// Closes the connection. Later calls fail with [`GatewayError::Shutdown`].
    async fn close(&self);
}
