//! Shared test utilities for gateway consumers.
//!
//! [`MockLedger`] is a scripted, in-process ledger network implementing
//! [`LedgerConnector`]. Contract functions are plain closures over a
//! versioned world state; submits go through endorse, order and commit with
//! read-set validation, so conflicting submits fail with
//! `MVCC_READ_CONFLICT` just as they would on a real network. Failures and
//! latency can be injected per [`Phase`].
//!
//! Enable the `testutil` feature in `[dev-dependencies]`:
//!
//! ```toml
//! [dev-dependencies]
//! claimledger-gateway = { path = "../gateway", features = ["testutil"] }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use claimledger_wallet::OrgId;
use parking_lot::Mutex;

use crate::{
    config::{GatewayConfig, TimeoutConfig},
    connector::{
        CommitStatus, ConnectRequest, EndorsedTransaction, GatewayError, LedgerConnection,
        LedgerConnector, Proposal, VALID_CODE,
    },
};

pub use claimledger_wallet::testutil::{admin_wallet, test_identity};

/// Validation code for a read set invalidated by a concurrent commit.
pub const MVCC_READ_CONFLICT: &str = "MVCC_READ_CONFLICT";

/// A contract function: reads and writes through the context, returns the
/// payload or a chaincode error message.
pub type Handler = Arc<dyn Fn(&mut TxContext<'_>, &[String]) -> Result<Vec<u8>, String> + Send + Sync>;

/// Protocol steps at which failures and delays can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Opening a connection.
    Connect,
    /// Channel discovery.
    Discover,
    /// Read-only evaluation.
    Evaluate,
    /// Endorsement.
    Endorse,
    /// Hand-off to ordering.
    Submit,
    /// Commit status wait.
    CommitStatus,
}

/// A recorded connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRecord {
    /// Organization of the profile used.
    pub org: OrgId,
    /// Wallet label of the identity.
    pub identity: String,
    /// MSP of the identity.
    pub msp_id: String,
    /// Whether discovery was enabled.
    pub discovery: bool,
    /// Whether discovery was asked to rewrite addresses to localhost.
    pub as_localhost: bool,
}

#[derive(Debug, Clone)]
struct Versioned {
    value: Vec<u8>,
    version: u64,
}

#[derive(Debug, Default)]
struct ReadWriteSet {
    reads: BTreeMap<String, u64>,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

/// Transaction context handed to contract functions.
pub struct TxContext<'a> {
    world: &'a BTreeMap<String, Versioned>,
    creator_msp: &'a str,
    rwset: ReadWriteSet,
}

impl TxContext<'_> {
    /// Reads a key, observing this transaction's own writes.
    pub fn get_state(&mut self, key: &str) -> Option<Vec<u8>> {
        if let Some(pending) = self.rwset.writes.get(key) {
            return pending.clone();
        }
        let current = self.world.get(key);
        self.rwset.reads.insert(key.to_owned(), current.map_or(0, |v| v.version));
        current.map(|v| v.value.clone())
    }

    /// Writes a key at commit.
    pub fn put_state(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.rwset.writes.insert(key.into(), Some(value.into()));
    }

    /// Deletes a key at commit.
    pub fn delete_state(&mut self, key: impl Into<String>) {
        self.rwset.writes.insert(key.into(), None);
    }

    /// Returns committed entries whose keys start with `prefix`, in key order.
    pub fn range(&mut self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        let entries: Vec<_> = self
            .world
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries
            .into_iter()
            .map(|(k, v)| {
                self.rwset.reads.insert(k.clone(), v.version);
                (k, v.value)
            })
            .collect()
    }

    /// MSP of the submitting identity.
    #[must_use]
    pub fn creator_msp(&self) -> &str {
        self.creator_msp
    }
}

#[derive(Default)]
struct LedgerState {
    channels: BTreeSet<String>,
    contracts: HashMap<String, HashMap<String, Handler>>,
    world: BTreeMap<String, Versioned>,
    pending: HashMap<String, (ReadWriteSet, String)>,
    statuses: HashMap<String, CommitStatus>,
    height: u64,
    failures: HashMap<Phase, VecDeque<GatewayError>>,
    invalid_commits: VecDeque<String>,
    delays: HashMap<Phase, Duration>,
    connects: Vec<ConnectRecord>,
    calls: HashMap<Phase, u64>,
}

impl LedgerState {
    fn enter(&mut self, phase: Phase) -> Result<(), GatewayError> {
        *self.calls.entry(phase).or_default() += 1;
        match self.failures.get_mut(&phase).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn handler(&self, channel: &str, contract: &str, function: &str) -> Result<Handler, GatewayError> {
        let functions = self.contracts.get(contract).ok_or_else(|| GatewayError::ContractNotFound {
            contract: contract.to_owned(),
            channel: channel.to_owned(),
        })?;
        functions.get(function).cloned().ok_or_else(|| GatewayError::Chaincode {
            status: 500,
            message: format!("You've asked to invoke a function that does not exist: {function}"),
        })
    }

    fn run(&self, proposal: &Proposal, msp_id: &str) -> Result<(Vec<u8>, ReadWriteSet), GatewayError> {
        let handler = self.handler(&proposal.channel, &proposal.contract, &proposal.function)?;
        let mut ctx = TxContext { world: &self.world, creator_msp: msp_id, rwset: ReadWriteSet::default() };
        match handler(&mut ctx, &proposal.args) {
            Ok(payload) => Ok((payload, ctx.rwset)),
            Err(message) => Err(GatewayError::Chaincode { status: 500, message }),
        }
    }

    fn commit(&mut self, tx_id: &str, rwset: ReadWriteSet) -> CommitStatus {
        self.height += 1;
        let stale = rwset
            .reads
            .iter()
            .any(|(key, version)| self.world.get(key).map_or(0, |v| v.version) != *version);
        let validation_code = match self.invalid_commits.pop_front() {
            Some(code) => code,
            None if stale => MVCC_READ_CONFLICT.to_owned(),
            None => {
                for (key, value) in rwset.writes {
                    match value {
                        Some(value) => {
                            let version = self.world.get(&key).map_or(0, |v| v.version) + 1;
                            self.world.insert(key, Versioned { value, version });
                        },
                        None => {
                            self.world.remove(&key);
                        },
                    }
                }
                VALID_CODE.to_owned()
            },
        };
        let status = CommitStatus {
            transaction_id: tx_id.to_owned(),
            block_number: self.height,
            validation_code,
        };
        self.statuses.insert(tx_id.to_owned(), status.clone());
        status
    }
}

struct Inner {
    state: Mutex<LedgerState>,
    generation: AtomicU64,
    connections: AtomicU64,
    closes: AtomicU64,
}

/// Scripted in-process ledger network.
///
/// Clones share the same network.
#[derive(Clone)]
pub struct MockLedger {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MockLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLedger")
            .field("connections", &self.connect_count())
            .field("closes", &self.close_count())
            .finish_non_exhaustive()
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// Creates a network with the single channel `mychannel` and no contracts.
    #[must_use]
    pub fn new() -> Self {
        let mut state = LedgerState::default();
        state.channels.insert(crate::config::DEFAULT_CHANNEL.to_owned());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                generation: AtomicU64::new(0),
                connections: AtomicU64::new(0),
                closes: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the network as a connector.
    #[must_use]
    pub fn connector(&self) -> Arc<dyn LedgerConnector> {
        Arc::new(self.clone())
    }

    /// Adds a channel.
    pub fn add_channel(&self, channel: impl Into<String>) {
        self.inner.state.lock().channels.insert(channel.into());
    }

    /// Registers `contract.function`.
    pub fn register<F>(&self, contract: &str, function: &str, handler: F)
    where
        F: Fn(&mut TxContext<'_>, &[String]) -> Result<Vec<u8>, String> + Send + Sync + 'static,
    {
        self.inner
            .state
            .lock()
            .contracts
            .entry(contract.to_owned())
            .or_default()
            .insert(function.to_owned(), Arc::new(handler));
    }

    /// Makes the next call at `phase` fail with `err`. Calls queue up.
    pub fn fail_next(&self, phase: Phase, err: GatewayError) {
        self.inner.state.lock().failures.entry(phase).or_default().push_back(err);
    }

    /// Makes the next committed transaction fail validation with `code`.
    pub fn invalidate_next_commit(&self, code: impl Into<String>) {
        self.inner.state.lock().invalid_commits.push_back(code.into());
    }

    /// Delays every call at `phase` by `delay`.
    pub fn set_delay(&self, phase: Phase, delay: Duration) {
        self.inner.state.lock().delays.insert(phase, delay);
    }

    /// Drops every open connection; later calls on them fail with
    /// [`GatewayError::Disconnected`].
    pub fn disconnect_all(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Connections opened so far.
    #[must_use]
    pub fn connect_count(&self) -> u64 {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Connections closed so far.
    #[must_use]
    pub fn close_count(&self) -> u64 {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Calls observed at `phase`, including injected failures.
    #[must_use]
    pub fn call_count(&self, phase: Phase) -> u64 {
        self.inner.state.lock().calls.get(&phase).copied().unwrap_or(0)
    }

    /// Every connection attempt that reached the network, in order.
    #[must_use]
    pub fn connects(&self) -> Vec<ConnectRecord> {
        self.inner.state.lock().connects.clone()
    }

    /// Committed value of `key`.
    #[must_use]
    pub fn state(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.state.lock().world.get(key).map(|v| v.value.clone())
    }

    /// Current block height.
    #[must_use]
    pub fn height(&self) -> u64 {
        self.inner.state.lock().height
    }

    async fn pause(&self, phase: Phase) {
        let delay = self.inner.state.lock().delays.get(&phase).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl LedgerConnector for MockLedger {
    async fn connect(
        &self,
        request: ConnectRequest<'_>,
    ) -> Result<Arc<dyn LedgerConnection>, GatewayError> {
        self.pause(Phase::Connect).await;
        {
            let mut state = self.inner.state.lock();
            state.enter(Phase::Connect)?;
            state.connects.push(ConnectRecord {
                org: request.profile.org().clone(),
                identity: request.identity.label().to_owned(),
                msp_id: request.identity.msp_id().to_string(),
                discovery: request.discovery.enabled,
                as_localhost: request.discovery.as_localhost,
            });
        }
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection {
            ledger: self.clone(),
            generation: self.inner.generation.load(Ordering::SeqCst),
            msp_id: request.identity.msp_id().to_string(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A connection to a [`MockLedger`].
#[derive(Debug)]
pub struct MockConnection {
    ledger: MockLedger,
    generation: u64,
    msp_id: String,
    closed: AtomicBool,
}

impl MockConnection {
    fn check(&self) -> Result<(), GatewayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::Shutdown);
        }
        if self.ledger.inner.generation.load(Ordering::SeqCst) != self.generation {
            return Err(GatewayError::Disconnected { message: "connection reset by peer".into() });
        }
        Ok(())
    }

    async fn begin(&self, phase: Phase) -> Result<parking_lot::MutexGuard<'_, LedgerState>, GatewayError> {
        self.ledger.pause(phase).await;
        self.check()?;
        let mut state = self.ledger.inner.state.lock();
        state.enter(phase)?;
        Ok(state)
    }
}

#[async_trait]
impl LedgerConnection for MockConnection {
    async fn discover(&self, channel: &str) -> Result<(), GatewayError> {
        let state = self.begin(Phase::Discover).await?;
        if state.channels.contains(channel) {
            Ok(())
        } else {
            Err(GatewayError::Discovery {
                channel: channel.to_owned(),
                message: "channel does not exist".into(),
            })
        }
    }

    async fn evaluate(&self, proposal: &Proposal) -> Result<Bytes, GatewayError> {
        let state = self.begin(Phase::Evaluate).await?;
        let (payload, _) = state.run(proposal, &self.msp_id)?;
        Ok(Bytes::from(payload))
    }

    async fn endorse(&self, proposal: &Proposal) -> Result<EndorsedTransaction, GatewayError> {
        let mut state = self.begin(Phase::Endorse).await?;
        let (payload, rwset) = state.run(proposal, &self.msp_id)?;
        state
            .pending
            .insert(proposal.transaction_id.clone(), (rwset, proposal.channel.clone()));
        Ok(EndorsedTransaction {
            transaction_id: proposal.transaction_id.clone(),
            result: Bytes::from(payload),
            envelope: Bytes::from(proposal.transaction_id.clone().into_bytes()),
        })
    }

    async fn submit(&self, transaction: &EndorsedTransaction) -> Result<(), GatewayError> {
        let mut state = self.begin(Phase::Submit).await?;
        let tx_id = transaction.transaction_id.as_str();
        let (rwset, _channel) = state.pending.remove(tx_id).ok_or_else(|| GatewayError::Ordering {
            tx_id: tx_id.to_owned(),
            message: "transaction was never endorsed".into(),
        })?;
        state.commit(tx_id, rwset);
        Ok(())
    }

    async fn commit_status(&self, _channel: &str, transaction_id: &str) -> Result<CommitStatus, GatewayError> {
        let state = self.begin(Phase::CommitStatus).await?;
        state.statuses.get(transaction_id).cloned().ok_or_else(|| GatewayError::Rpc {
            code: tonic::Code::Unknown,
            message: format!("no status for transaction {transaction_id}"),
        })
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.ledger.inner.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ── Profiles and configuration ─────────────────────────────────────────

/// Writes a minimal connection profile for `org` (e.g. `org2` with MSP
/// `Org2MSP`) into `dir` and returns its path.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_profile(dir: &Path, org: &str, msp_id: &str) -> PathBuf {
    let org_name = msp_id.trim_end_matches("MSP");
    let peer = format!("peer0.{org}.example.com");
    let ca = format!("ca.{org}.example.com");
    let profile = serde_json::json!({
        "name": format!("test-network-{org}"),
        "version": "1.0.0",
        "client": {"organization": org_name},
        "organizations": {org_name: {
            "mspid": msp_id,
            "peers": [peer.clone()],
            "certificateAuthorities": [ca.clone()]
        }},
        "peers": {peer.clone(): {
            "url": "grpcs://localhost:7051",
            "tlsCACerts": {"pem": "-----BEGIN CERTIFICATE-----\ntest\n-----END CERTIFICATE-----\n"},
            "grpcOptions": {"ssl-target-name-override": peer}
        }},
        "certificateAuthorities": {ca: {
            "url": "https://localhost:7054",
            "caName": format!("ca-{org}"),
            "httpOptions": {"verify": false}
        }}
    });
    let path = dir.join(format!("connection-{org}.json"));
    std::fs::write(&path, profile.to_string()).expect("write connection profile");
    path
}

/// Writes profiles for `org1` (`Org1MSP`) and `org2` (`Org2MSP`).
pub fn write_test_profiles(dir: &Path) {
    write_profile(dir, "org1", "Org1MSP");
    write_profile(dir, "org2", "Org2MSP");
}

/// A gateway configuration reading profiles from `profile_dir`, with short
/// timeouts suited to tests.
///
/// # Panics
///
/// Panics if the configuration is invalid.
pub fn test_config(profile_dir: &Path) -> GatewayConfig {
    let timeouts = TimeoutConfig::builder()
        .connect(Duration::from_secs(1))
        .evaluate(Duration::from_secs(1))
        .endorse(Duration::from_secs(1))
        .submit(Duration::from_secs(1))
        .commit_status(Duration::from_secs(2))
        .build()
        .expect("valid timeouts");
    GatewayConfig::builder()
        .profile_dir(profile_dir)
        .timeouts(timeouts)
        .build()
        .expect("valid gateway config")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn proposal(function: &str, args: &[&str]) -> Proposal {
        Proposal {
            transaction_id: crate::invoker::new_transaction_id(),
            channel: "mychannel".into(),
            contract: "kv".into(),
            function: function.into(),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
        }
    }

    fn kv_ledger() -> MockLedger {
        let ledger = MockLedger::new();
        ledger.register("kv", "Put", |ctx, args| {
            let current = ctx.get_state(&args[0]);
            ctx.put_state(args[0].clone(), args[1].clone());
            Ok(current.unwrap_or_default())
        });
        ledger.register("kv", "Get", |ctx, args| {
            ctx.get_state(&args[0]).ok_or_else(|| format!("{} does not exist", args[0]))
        });
        ledger
    }

    fn connection(ledger: &MockLedger) -> MockConnection {
        MockConnection {
            ledger: ledger.clone(),
            generation: ledger.inner.generation.load(Ordering::SeqCst),
            msp_id: "Org1MSP".into(),
            closed: AtomicBool::new(false),
        }
    }

    async fn submit(conn: &MockConnection, p: &Proposal) -> CommitStatus {
        let endorsed = conn.endorse(p).await.unwrap();
        conn.submit(&endorsed).await.unwrap();
        conn.commit_status("mychannel", &p.transaction_id).await.unwrap()
    }

    #[tokio::test]
    async fn committed_writes_are_visible_to_evaluate() {
        let ledger = kv_ledger();
        let conn = connection(&ledger);

        let status = submit(&conn, &proposal("Put", &["a", "1"])).await;
        assert!(status.is_valid());
        assert_eq!(conn.evaluate(&proposal("Get", &["a"])).await.unwrap(), Bytes::from_static(b"1"));
        assert_eq!(ledger.height(), 1);
    }

    #[tokio::test]
    async fn stale_read_set_fails_validation() {
        let ledger = kv_ledger();
        let conn = connection(&ledger);

        let first = proposal("Put", &["a", "1"]);
        let second = proposal("Put", &["a", "2"]);
        let e1 = conn.endorse(&first).await.unwrap();
        let e2 = conn.endorse(&second).await.unwrap();
        conn.submit(&e1).await.unwrap();
        conn.submit(&e2).await.unwrap();

        let status = conn.commit_status("mychannel", &second.transaction_id).await.unwrap();
        assert_eq!(status.validation_code, MVCC_READ_CONFLICT);
        assert_eq!(ledger.state("a"), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn unknown_contract_and_function() {
        let ledger = kv_ledger();
        let conn = connection(&ledger);

        let mut p = proposal("Get", &["a"]);
        p.contract = "missing".into();
        assert!(matches!(conn.evaluate(&p).await, Err(GatewayError::ContractNotFound { .. })));
        assert!(matches!(
            conn.evaluate(&proposal("Nope", &[])).await,
            Err(GatewayError::Chaincode { .. })
        ));
    }

    #[tokio::test]
    async fn disconnect_and_close() {
        let ledger = kv_ledger();
        let conn = connection(&ledger);

        ledger.disconnect_all();
        assert!(matches!(conn.discover("mychannel").await, Err(GatewayError::Disconnected { .. })));

        conn.close().await;
        conn.close().await;
        assert!(matches!(conn.discover("mychannel").await, Err(GatewayError::Shutdown)));
        assert_eq!(ledger.close_count(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let ledger = kv_ledger();
        let conn = connection(&ledger);
        ledger.fail_next(Phase::Evaluate, GatewayError::Timeout { operation: "x".into(), duration_ms: 1 });

        assert!(conn.evaluate(&proposal("Get", &["a"])).await.is_err());
        assert!(matches!(
            conn.evaluate(&proposal("Get", &["a"])).await,
            Err(GatewayError::Chaincode { ref message, .. }) if message == "a does not exist"
        ));
        assert_eq!(ledger.call_count(Phase::Evaluate), 2);
    }
}
