//! Network session manager.
//!
//! [`SessionManager::acquire`] turns `(organization, identity, channel)`
//! into a live [`Session`]: it resolves the identity from the wallet,
//! loads the organization's connection profile, and returns the cached
//! session for the pair or establishes a new one. Establishment connects
//! with the identity's credentials, runs discovery for the channel, and
//! only then publishes the session to the cache.

use std::{sync::Arc, time::Duration};

use claimledger_wallet::{Identity, IdentityStore, OrgId};
use fail::fail_point;

use crate::{
    config::{DEFAULT_CONNECT_TIMEOUT, DiscoveryConfig},
    connector::{ConnectRequest, LedgerConnector},
    error::{ErrorKind, LedgerError, Result},
    metrics::GatewayMetrics,
    profile::{ConnectionProfile, ProfileLoader},
    session::{Session, SessionCache, SessionKey},
};

/// Rounds of "found a retired or mis-bound session, replace it" before
/// `acquire` gives up.
const MAX_ACQUIRE_ROUNDS: usize = 3;

/// Produces and caches sessions per `(organization, identity)`.
pub struct SessionManager {
    wallet: Arc<dyn IdentityStore>,
    profiles: ProfileLoader,
    connector: Arc<dyn LedgerConnector>,
    cache: SessionCache,
    discovery: DiscoveryConfig,
    connect_timeout: Duration,
    metrics: GatewayMetrics,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("profiles", &self.profiles)
            .field("cache", &self.cache)
            .field("discovery", &self.discovery)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl SessionManager {
    /// Creates a session manager.
    ///
    /// # Arguments
    ///
    /// * `wallet` - Identity store consulted before every acquire.
    /// * `profiles` - Connection profile loader.
    /// * `connector` - Opens connections to the ledger network.
    ///
    /// # Optional Fields
    ///
    /// * `cache` - Session cache (default: a fresh, empty cache).
    /// * `discovery` - Discovery options (default: enabled, as localhost).
    /// * `connect_timeout` - Deadline for connect and discovery (default: 5 seconds).
    /// * `metrics` - Shared counters (default: new counters).
    #[builder]
    pub fn new(
        wallet: Arc<dyn IdentityStore>,
        profiles: ProfileLoader,
        connector: Arc<dyn LedgerConnector>,
        #[builder(default)] cache: SessionCache,
        #[builder(default)] discovery: DiscoveryConfig,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(default)] metrics: GatewayMetrics,
    ) -> Self {
        Self { wallet, profiles, connector, cache, discovery, connect_timeout, metrics }
    }

    /// Returns a live session for `(org, identity_label)` bound to `channel`.
    ///
    /// The identity is checked first: an unknown label fails without
    /// loading a profile or touching the network. Concurrent calls for the
    /// same pair share one establishment and receive the same session.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::IdentityNotFound`] if the wallet has no such label
    /// - [`ErrorKind::ProfileNotFound`] / [`ErrorKind::ProfileMalformed`]
    /// - [`ErrorKind::ConnectFailed`] if the connection cannot be opened in time
    /// - [`ErrorKind::DiscoveryFailed`] if discovery for `channel` fails
    #[tracing::instrument(skip(self), fields(org = %org, identity = identity_label))]
    pub async fn acquire(&self, org: &OrgId, identity_label: &str, channel: &str) -> Result<Arc<Session>> {
        let identity = self.wallet.get(identity_label).await.map_err(LedgerError::from)?;
        let profile = self.profiles.load(org).await?;
        let key = SessionKey::new(org.clone(), identity_label);

        for _ in 0..MAX_ACQUIRE_ROUNDS {
            let acquired = self
                .cache
                .get_or_establish(key.clone(), self.establish(&key, &identity, &profile, channel))
                .await?;
            let session = acquired.session;

            if acquired.established {
                self.metrics.record_cache_miss();
                return Ok(session);
            }
            if !session.is_alive() {
                // Retired but not yet evicted by its retirer.
                self.cache.evict(&session).await;
                continue;
            }
            if session.channel() != channel {
                tracing::info!(
                    session_id = session.id(),
                    bound = session.channel(),
                    requested = channel,
                    "replacing session bound to another channel",
                );
                self.retire(&session).await;
                continue;
            }

            self.metrics.record_cache_hit();
            tracing::debug!(session_id = session.id(), "session cache hit");
            return Ok(session);
        }

        Err(LedgerError::new(
            ErrorKind::ConnectivityLost,
            format!("session for {key} was retired repeatedly while being acquired"),
        ))
    }

    async fn establish(
        &self,
        key: &SessionKey,
        identity: &Identity,
        profile: &ConnectionProfile,
        channel: &str,
    ) -> Result<Arc<Session>> {
        fail_point!("session-before-connect", |_| {
            Err(LedgerError::new(ErrorKind::ConnectFailed, "injected connect failure"))
        });

        if identity.msp_id() != profile.msp_id() {
            tracing::warn!(
                identity_msp = %identity.msp_id(),
                profile_msp = %profile.msp_id(),
                "identity belongs to a different MSP than the connection profile",
            );
        }

        let request = ConnectRequest {
            identity,
            profile,
            discovery: &self.discovery,
            timeout: self.connect_timeout,
        };
        let connection =
            match tokio::time::timeout(self.connect_timeout, self.connector.connect(request)).await {
                Ok(Ok(connection)) => connection,
                Ok(Err(err)) => {
                    return Err(LedgerError::with_source(
                        ErrorKind::ConnectFailed,
                        format!("failed to connect to organization {}: {err}", key.org),
                        err,
                    ));
                },
                Err(_) => {
                    tracing::warn!(timeout_ms = self.connect_timeout.as_millis() as u64, "connect timed out");
                    return Err(LedgerError::new(
                        ErrorKind::ConnectFailed,
                        format!(
                            "connecting to organization {} timed out after {}ms",
                            key.org,
                            self.connect_timeout.as_millis()
                        ),
                    ));
                },
            };

        if self.discovery.enabled {
            let discovered =
                tokio::time::timeout(self.connect_timeout, connection.discover(channel)).await;
            let failure = match discovered {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(LedgerError::with_source(
                    ErrorKind::DiscoveryFailed,
                    format!("discovery on channel {channel} failed: {err}"),
                    err,
                )),
                Err(_) => Some(LedgerError::new(
                    ErrorKind::DiscoveryFailed,
                    format!(
                        "discovery on channel {channel} timed out after {}ms",
                        self.connect_timeout.as_millis()
                    ),
                )),
            };
            if let Some(err) = failure {
                connection.close().await;
                return Err(err);
            }
        }

        let session =
            Arc::new(Session::new(key.clone(), identity.msp_id().clone(), channel, connection));
        self.metrics.record_session_established();
        tracing::info!(
            session_id = session.id(),
            org = %key.org,
            identity = %key.identity,
            msp_id = %session.msp_id(),
            channel,
            "established session",
        );
        Ok(session)
    }

    /// Retires `session` after a connectivity failure: marks it dead,
    /// evicts it if it is still the cached instance, and closes it.
    ///
    /// Returns `true` if this call retired it.
    pub async fn retire(&self, session: &Arc<Session>) -> bool {
        let retired = self.cache.retire(session).await;
        if retired {
            self.metrics.record_session_evicted();
        }
        retired
    }

    /// Closes and removes every cached session.
    pub async fn shutdown(&self) -> usize {
        self.cache.shutdown().await
    }

    /// Number of cached sessions.
    pub async fn session_count(&self) -> u64 {
        self.cache.len().await
    }

    /// The session cache.
    #[must_use]
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// The profile loader.
    #[must_use]
    pub fn profiles(&self) -> &ProfileLoader {
        &self.profiles
    }

    /// Shared counters.
    #[must_use]
    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }
}
