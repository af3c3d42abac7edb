//! Contract invocation.
//!
//! [`ContractInvoker::invoke`] runs one contract function through a
//! [`Session`] in one of two [`Mode`]s:
//!
//! - **Submit**: endorse on the peers the endorsement policy requires, hand
//!   the endorsed transaction to the ordering service, then wait for its
//!   commit status. Returns only once the transaction is committed or has
//!   definitively failed.
//! - **Evaluate**: run the function on a single peer without ordering it.
//!   The payload is decoded as JSON when possible; undecodable payloads are
//!   returned raw with a warning.
//!
//! Every phase has its own deadline. A connectivity failure retires the
//! session so the next acquire reconnects.

use std::{sync::Arc, time::Instant};

use bytes::Bytes;
use claimledger_wallet::OrgId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::TimeoutConfig,
    connector::{GatewayError, Proposal},
    error::{ConfigError, LedgerError, Result},
    metrics::GatewayMetrics,
    session::{Session, SessionCache},
};

/// How a transaction is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Endorsed, ordered and committed; changes ledger state.
    Submit,
    /// Read-only, single peer.
    Evaluate,
}

impl Mode {
    /// Returns `"submit"` or `"evaluate"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Evaluate => "evaluate",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully addressed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    org: OrgId,
    identity: String,
    contract: String,
    function: String,
    args: Vec<String>,
    mode: Mode,
}

#[bon::bon]
impl TransactionRequest {
    /// Creates a request.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if the organization, identity,
    /// contract or function name is empty.
    #[builder]
    pub fn new(
        #[builder(into)] org: OrgId,
        #[builder(into)] identity: String,
        #[builder(into)] contract: String,
        #[builder(into)] function: String,
        #[builder(default, with = |iter: impl IntoIterator<Item = impl Into<String>>| {
            iter.into_iter().map(Into::into).collect()
        })]
        args: Vec<String>,
        mode: Mode,
    ) -> std::result::Result<Self, ConfigError> {
        for (field, value) in [
            ("org", org.as_str()),
            ("identity", identity.as_str()),
            ("contract", contract.as_str()),
            ("function", function.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing { field });
            }
        }
        Ok(Self { org, identity, contract, function, args, mode })
    }

    /// Target organization.
    #[must_use]
    pub fn org(&self) -> &OrgId {
        &self.org
    }

    /// Wallet label of the signing identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Contract name.
    #[must_use]
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Function name.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Ordered string arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Submit or evaluate.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

/// Acknowledgement of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitConfirmation {
    /// The transaction ID.
    pub transaction_id: String,
    /// Always `true`: failed commits are errors.
    pub committed: bool,
    /// Block the transaction was committed in.
    pub block_number: u64,
    /// The contract function's return value.
    pub result: Bytes,
}

/// Payload of an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateResult {
    /// Bytes as returned by the peer.
    pub raw: Bytes,
    /// Decoded JSON, when the payload is non-empty JSON.
    pub json: Option<Value>,
    /// Set when the payload is non-empty but not JSON.
    pub warning: Option<String>,
}

impl EvaluateResult {
    /// Decodes `raw` as JSON. Empty payloads decode to nothing, without a warning.
    #[must_use]
    pub fn decode(raw: Bytes) -> Self {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Self { raw, json: None, warning: None };
        }
        match serde_json::from_slice(&raw) {
            Ok(json) => Self { raw, json: Some(json), warning: None },
            Err(err) => Self {
                raw,
                json: None,
                warning: Some(format!("response is not valid JSON: {err}")),
            },
        }
    }

    /// The payload as lossy UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

/// Outcome of an invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionResult {
    /// A committed submit.
    Submitted(SubmitConfirmation),
    /// An evaluation.
    Evaluated(EvaluateResult),
}

impl TransactionResult {
    /// The submit confirmation, if this was a submit.
    #[must_use]
    pub fn as_submitted(&self) -> Option<&SubmitConfirmation> {
        match self {
            Self::Submitted(confirmation) => Some(confirmation),
            Self::Evaluated(_) => None,
        }
    }

    /// The evaluation payload, if this was an evaluate.
    #[must_use]
    pub fn as_evaluated(&self) -> Option<&EvaluateResult> {
        match self {
            Self::Evaluated(result) => Some(result),
            Self::Submitted(_) => None,
        }
    }
}

/// Generates a transaction ID: 32 random bytes, hex encoded.
#[must_use]
pub fn new_transaction_id() -> String {
    let nonce: [u8; 32] = rand::rng().random();
    hex::encode(nonce)
}

/// Runs submits and evaluates through sessions.
#[derive(Debug, Clone)]
pub struct ContractInvoker {
    cache: SessionCache,
    timeouts: TimeoutConfig,
    metrics: GatewayMetrics,
}

impl ContractInvoker {
    /// Creates an invoker that retires failed sessions from `cache`.
    #[must_use]
    pub fn new(cache: SessionCache, timeouts: TimeoutConfig, metrics: GatewayMetrics) -> Self {
        Self { cache, timeouts, metrics }
    }

    /// Invokes `contract.function(args)` through `session`.
    ///
    /// # Errors
    ///
    /// Any classified [`LedgerError`]. Typical kinds are
    /// `ContractNotFound`, `EndorsementFailed`, `ValidationFailed`,
    /// `Timeout`, `ConnectivityLost` and `UpstreamFailure` (contract
    /// errors). Connectivity-class failures also retire `session`.
    #[tracing::instrument(
        skip(self, session, args),
        fields(session_id = session.id(), org = %session.org(), mode = %mode)
    )]
    pub async fn invoke(
        &self,
        session: &Arc<Session>,
        contract: &str,
        function: &str,
        args: &[String],
        mode: Mode,
    ) -> Result<TransactionResult> {
        if !session.is_alive() {
            return Err(LedgerError::from(GatewayError::Shutdown));
        }

        let proposal = Proposal {
            transaction_id: new_transaction_id(),
            channel: session.channel().to_owned(),
            contract: contract.to_owned(),
            function: function.to_owned(),
            args: args.to_vec(),
        };
        let started = Instant::now();

        let outcome = match mode {
            Mode::Evaluate => self.evaluate(session, &proposal).await.map(TransactionResult::Evaluated),
            Mode::Submit => self.submit(session, &proposal).await.map(TransactionResult::Submitted),
        };

        match outcome {
            Ok(result) => {
                match mode {
                    Mode::Evaluate => self.metrics.record_evaluate(started.elapsed()),
                    Mode::Submit => self.metrics.record_submit(started.elapsed()),
                }
                Ok(result)
            },
            Err(err) => {
                self.metrics.record_failure(err.kind());
                if err.kind().is_connectivity() && self.cache.retire(session).await {
                    self.metrics.record_session_evicted();
                }
                tracing::debug!(kind = %err.kind(), error = %err, "invocation failed");
                Err(err)
            },
        }
    }

    async fn evaluate(&self, session: &Session, proposal: &Proposal) -> Result<EvaluateResult> {
        let limit = self.timeouts.evaluate;
        let raw = within("evaluate", limit, session.connection().evaluate(proposal)).await?;

        let result = EvaluateResult::decode(raw);
        if let Some(warning) = &result.warning {
            self.metrics.record_decode_warning();
            tracing::warn!(bytes = result.raw.len(), warning = %warning, "evaluate returned non-JSON payload");
        }
        Ok(result)
    }

    async fn submit(&self, session: &Session, proposal: &Proposal) -> Result<SubmitConfirmation> {
        let tx_id = proposal.transaction_id.as_str();
        let connection = session.connection();

        let endorsed = within("endorse", self.timeouts.endorse, connection.endorse(proposal))
            .await
            .map_err(|e| e.for_transaction(tx_id))?;
        within("submit", self.timeouts.submit, connection.submit(&endorsed))
            .await
            .map_err(|e| e.for_transaction(tx_id))?;
        let status = within(
            "commit status",
            self.timeouts.commit_status,
            connection.commit_status(session.channel(), &endorsed.transaction_id),
        )
        .await
        .map_err(|e| e.for_transaction(tx_id))?;

        if !status.is_valid() {
            return Err(LedgerError::from(GatewayError::Commit {
                tx_id: status.transaction_id,
                validation_code: status.validation_code,
            }));
        }

        tracing::debug!(tx_id, block = status.block_number, "transaction committed");
        Ok(SubmitConfirmation {
            transaction_id: endorsed.transaction_id,
            committed: true,
            block_number: status.block_number,
            result: endorsed.result,
        })
    }
}

async fn within<T>(
    operation: &'static str,
    limit: std::time::Duration,
    call: impl std::future::Future<Output = std::result::Result<T, GatewayError>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(LedgerError::from),
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "ledger call timed out");
            Err(LedgerError::from(GatewayError::timeout(operation, limit)))
        },
    }
}
