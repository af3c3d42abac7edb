//! Network sessions and the session cache.
//!
//! A [`Session`] is a live connection to one organization's peers,
//! authenticated as one identity and bound to one channel. Sessions are
//! shared read-only between concurrent invocations; only the liveness flag
//! ever changes.
//!
//! The [`SessionCache`] holds at most one session per
//! `(organization, identity)` pair. Concurrent requests for a missing pair
//! coalesce on a single establishment, and eviction only removes the exact
//! session instance that failed, never a newer replacement.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use claimledger_wallet::{MspId, OrgId};
use moka::{future::Cache, ops::compute::Op};

use crate::{connector::LedgerConnection, error::LedgerError};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Cache key: one session per organization and identity label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    /// Organization the session connects to.
    pub org: OrgId,
    /// Wallet label of the signing identity.
    pub identity: String,
}

impl SessionKey {
    /// Creates a key.
    #[must_use]
    pub fn new(org: impl Into<OrgId>, identity: impl Into<String>) -> Self {
        Self { org: org.into(), identity: identity.into() }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.org, self.identity)
    }
}

/// A live, discovery-enabled connection bound to one channel.
pub struct Session {
    id: u64,
    key: SessionKey,
    msp_id: MspId,
    channel: String,
    established_at: DateTime<Utc>,
    alive: AtomicBool,
    connection: Arc<dyn LedgerConnection>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("msp_id", &self.msp_id)
            .field("channel", &self.channel)
            .field("established_at", &self.established_at)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Wraps an established connection.
    #[must_use]
    pub fn new(
        key: SessionKey,
        msp_id: MspId,
        channel: impl Into<String>,
        connection: Arc<dyn LedgerConnection>,
    ) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            key,
            msp_id,
            channel: channel.into(),
            established_at: Utc::now(),
            alive: AtomicBool::new(true),
            connection,
        }
    }

    /// Process-unique session number.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The `(organization, identity)` pair this session serves.
    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Organization the session connects to.
    #[must_use]
    pub fn org(&self) -> &OrgId {
        &self.key.org
    }

    /// Wallet label of the signing identity.
    #[must_use]
    pub fn identity_label(&self) -> &str {
        &self.key.identity
    }

    /// MSP of the signing identity.
    #[must_use]
    pub fn msp_id(&self) -> &MspId {
        &self.msp_id
    }

    /// The channel this session is bound to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// When the connection was established.
    #[must_use]
    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    /// Returns `false` once the session has been retired.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Marks the session dead. Returns `true` if this call changed the flag.
    pub fn mark_dead(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn connection(&self) -> &Arc<dyn LedgerConnection> {
        &self.connection
    }
}

/// Result of [`SessionCache::get_or_establish`].
#[derive(Debug, Clone)]
pub struct Acquired {
    /// The cached or newly established session.
    pub session: Arc<Session>,
    /// `true` if this call's initializer produced the session.
    pub established: bool,
}

/// The `(organization, identity)` → [`Session`] cache.
///
/// Cloning shares the underlying cache. The cache is unbounded: sessions
/// leave it only through [`evict`](Self::evict),
/// [`retire`](Self::retire) or [`shutdown`](Self::shutdown), so a
/// connection is never dropped without being closed.
#[derive(Clone)]
pub struct SessionCache {
    sessions: Cache<SessionKey, Arc<Session>>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache").field("entries", &self.sessions.entry_count()).finish()
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self { sessions: Cache::builder().build() }
    }

    /// Returns the cached session for `key`, if any.
    pub async fn get(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.get(key).await
    }

    /// Returns the cached session for `key`, or runs `establish` to create
    /// one.
    ///
    /// Concurrent callers for the same key wait on a single `establish`
    /// future and all receive its session. Nothing is cached when it fails.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `establish`.
    pub async fn get_or_establish<F>(&self, key: SessionKey, establish: F) -> Result<Acquired, LedgerError>
    where
        F: Future<Output = Result<Arc<Session>, LedgerError>>,
    {
        let entry = self
            .sessions
            .entry(key)
            .or_try_insert_with(establish)
            .await
            .map_err(|err| (*err).clone())?;
        let established = entry.is_fresh();
        Ok(Acquired { session: entry.into_value(), established })
    }

    /// Removes `session` if it is still the cached instance for its key.
    ///
    /// Returns `true` if the entry was removed. A stale eviction never
    /// removes a newer session for the same pair.
    pub async fn evict(&self, session: &Arc<Session>) -> bool {
        let target = Arc::clone(session);
        let result = self
            .sessions
            .entry(session.key().clone())
            .and_compute_with(|current| {
                let op = match current {
                    Some(entry) if Arc::ptr_eq(entry.value(), &target) => Op::Remove,
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
        matches!(result, moka::ops::compute::CompResult::Removed(_))
    }

    /// Marks `session` dead, evicts it and closes its connection.
    ///
    /// Returns `true` if this call retired the session; later calls for
    /// the same session are no-ops.
    pub async fn retire(&self, session: &Arc<Session>) -> bool {
        let first = session.mark_dead();
        let evicted = self.evict(session).await;
        if first {
            session.connection().close().await;
            tracing::info!(
                session_id = session.id(),
                org = %session.org(),
                identity = session.identity_label(),
                evicted,
                "retired session",
            );
        }
        first
    }

    /// Closes and removes every cached session.
    ///
    /// Returns the number of sessions closed.
    pub async fn shutdown(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self.sessions.iter().map(|(_, s)| s).collect();
        self.sessions.invalidate_all();
        self.sessions.run_pending_tasks().await;

        let mut closed = 0;
        for session in sessions {
            if session.mark_dead() {
                session.connection().close().await;
                closed += 1;
            }
        }
        tracing::info!(closed, "session cache shut down");
        closed
    }

    /// Number of cached sessions.
    pub async fn len(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }

    /// Returns `true` if no sessions are cached.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::connector::{CommitStatus, EndorsedTransaction, GatewayError, Proposal};

    #[derive(Debug, Default)]
    struct CountingConnection {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl LedgerConnection for CountingConnection {
        async fn discover(&self, _channel: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn evaluate(&self, _proposal: &Proposal) -> Result<Bytes, GatewayError> {
            Ok(Bytes::new())
        }

        async fn endorse(&self, _proposal: &Proposal) -> Result<EndorsedTransaction, GatewayError> {
            Err(GatewayError::Shutdown)
        }

        async fn submit(&self, _transaction: &EndorsedTransaction) -> Result<(), GatewayError> {
            Err(GatewayError::Shutdown)
        }

        async fn commit_status(&self, _channel: &str, _tx: &str) -> Result<CommitStatus, GatewayError> {
            Err(GatewayError::Shutdown)
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn key() -> SessionKey {
        SessionKey::new("org2", "Admin@org2.example.com")
    }

    fn session(connection: &Arc<CountingConnection>) -> Arc<Session> {
        let connection: Arc<dyn LedgerConnection> = connection.clone();
        Arc::new(Session::new(key(), MspId::from("Org2MSP"), "mychannel", connection))
    }

    #[tokio::test]
    async fn establishes_once_then_hits() {
        let cache = SessionCache::new();
        let conn = Arc::new(CountingConnection::default());

        let first = cache.get_or_establish(key(), async { Ok(session(&conn)) }).await.unwrap();
        let second = cache
            .get_or_establish(key(), async { Err(LedgerError::upstream("initializer ran on a hit")) })
            .await
            .unwrap();

        assert!(first.established);
        assert!(!second.established);
        assert!(Arc::ptr_eq(&first.session, &second.session));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn failed_establishment_caches_nothing() {
        let cache = SessionCache::new();
        let err = cache
            .get_or_establish(key(), async { Err(LedgerError::upstream("refused")) })
            .await
            .unwrap_err();

        assert_eq!(err.message(), "refused");
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn stale_eviction_keeps_newer_session() {
        let cache = SessionCache::new();
        let conn = Arc::new(CountingConnection::default());
        let old = cache.get_or_establish(key(), async { Ok(session(&conn)) }).await.unwrap().session;

        assert!(cache.evict(&old).await);
        let new = cache.get_or_establish(key(), async { Ok(session(&conn)) }).await.unwrap().session;

        assert!(!cache.evict(&old).await, "stale eviction must be a no-op");
        let current = cache.get(&key()).await.expect("newer session stays cached");
        assert!(Arc::ptr_eq(&current, &new));
    }

    #[tokio::test]
    async fn retire_closes_exactly_once() {
        let cache = SessionCache::new();
        let conn = Arc::new(CountingConnection::default());
        let s = cache.get_or_establish(key(), async { Ok(session(&conn)) }).await.unwrap().session;

        assert!(cache.retire(&s).await);
        assert!(!cache.retire(&s).await);

        assert!(!s.is_alive());
        assert_eq!(conn.closes.load(Ordering::SeqCst), 1);
        assert!(cache.get(&key()).await.is_none());
    }

    #[tokio::test]
    async fn shutdown_closes_every_session() {
        let cache = SessionCache::new();
        let conn = Arc::new(CountingConnection::default());
        cache.get_or_establish(key(), async { Ok(session(&conn)) }).await.unwrap();
        let other = SessionKey::new("org1", "Admin@org1.example.com");
        let c2: Arc<dyn LedgerConnection> = conn.clone();
        cache
            .get_or_establish(other.clone(), async {
                Ok(Arc::new(Session::new(other, MspId::from("Org1MSP"), "mychannel", c2)))
            })
            .await
            .unwrap();

        assert_eq!(cache.shutdown().await, 2);
        assert_eq!(conn.closes.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty().await);
    }

    #[test]
    fn session_ids_are_unique() {
        let conn = Arc::new(CountingConnection::default());
        let a = session(&conn);
        let b = session(&conn);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.key().to_string(), "org2/Admin@org2.example.com");
    }
}
