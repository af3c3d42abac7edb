//! The ledger gateway façade.
//!
//! [`LedgerGateway`] wires the wallet, profile loader, session manager and
//! contract invoker together and runs a [`TransactionRequest`] end to end:
//! acquire a session for the request's organization and identity, invoke
//! the contract function, and classify any failure.

use std::sync::Arc;

use claimledger_wallet::{FileSystemWallet, IdentityStore};

use crate::{
    config::{GatewayConfig, RetryConfig},
    connector::LedgerConnector,
    error::{LedgerError, Result},
    invoker::{ContractInvoker, Mode, TransactionRequest, TransactionResult},
    manager::SessionManager,
    metrics::GatewayMetrics,
    profile::ProfileLoader,
    retry::retry_evaluate,
    session::SessionCache,
};

/// Runs transactions against a ledger network on one channel.
#[derive(Debug)]
pub struct LedgerGateway {
    manager: SessionManager,
    invoker: ContractInvoker,
    channel: String,
    retry: RetryConfig,
    metrics: GatewayMetrics,
}

impl LedgerGateway {
    /// Creates a gateway with a fresh session cache.
    #[must_use]
    pub fn new(
        config: &GatewayConfig,
        wallet: Arc<dyn IdentityStore>,
        connector: Arc<dyn LedgerConnector>,
    ) -> Self {
        Self::with_cache(config, wallet, connector, SessionCache::new())
    }

    /// Creates a gateway around an existing session cache.
    #[must_use]
    pub fn with_cache(
        config: &GatewayConfig,
        wallet: Arc<dyn IdentityStore>,
        connector: Arc<dyn LedgerConnector>,
        cache: SessionCache,
    ) -> Self {
        let metrics = GatewayMetrics::new();
        let profiles =
            ProfileLoader::with_pattern(config.profile_dir(), config.profile_file_pattern());
        let manager = SessionManager::builder()
            .wallet(wallet)
            .profiles(profiles)
            .connector(connector)
            .cache(cache.clone())
            .discovery(config.discovery().clone())
            .connect_timeout(config.timeouts().connect())
            .metrics(metrics.clone())
            .build();
        let invoker = ContractInvoker::new(cache, *config.timeouts(), metrics.clone());

        Self {
            manager,
            invoker,
            channel: config.channel().to_owned(),
            retry: config.evaluate_retry().clone(),
            metrics,
        }
    }

    /// Opens the file-system wallet named by `config` and creates a gateway.
    ///
    /// # Errors
    ///
    /// Returns an `UpstreamFailure` if the wallet directory cannot be opened.
    pub async fn open(config: &GatewayConfig, connector: Arc<dyn LedgerConnector>) -> Result<Self> {
        let wallet = FileSystemWallet::open(config.wallet_dir()).await.map_err(LedgerError::from)?;
        Ok(Self::new(config, Arc::new(wallet), connector))
    }

    /// Executes `request`.
    ///
    /// Evaluations are retried on transient failures according to the
    /// configured retry policy, re-acquiring a session for every attempt.
    /// Submits run exactly once.
    ///
    /// # Errors
    ///
    /// Returns the classified [`LedgerError`] of the failing step.
    #[tracing::instrument(
        skip(self, request),
        fields(
            org = %request.org(),
            identity = request.identity(),
            contract = request.contract(),
            function = request.function(),
            mode = %request.mode(),
            channel = %self.channel,
        )
    )]
    pub async fn execute(&self, request: &TransactionRequest) -> Result<TransactionResult> {
        match request.mode() {
            Mode::Submit => self.execute_once(request).await,
            Mode::Evaluate => {
                retry_evaluate(&self.retry, &self.metrics, || self.execute_once(request)).await
            },
        }
    }

    async fn execute_once(&self, request: &TransactionRequest) -> Result<TransactionResult> {
        let session = self
            .manager
            .acquire(request.org(), request.identity(), &self.channel)
            .await
            .inspect_err(|err| self.metrics.record_failure(err.kind()))?;

        self.invoker
            .invoke(&session, request.contract(), request.function(), request.args(), request.mode())
            .await
    }

    /// Closes every cached session. Returns how many were closed.
    pub async fn shutdown(&self) -> usize {
        self.manager.shutdown().await
    }

    /// The channel every session binds to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The session manager.
    #[must_use]
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Shared counters.
    #[must_use]
    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }
}
