//! Connection profiles and their loader.
//!
//! Each organization publishes a common connection profile: a JSON
//! document naming its MSP, its peers, the orderers and its certificate
//! authorities, with the TLS roots needed to reach them. The
//! [`ProfileLoader`] reads `<profile_dir>/connection-<org>.json` on first
//! use, validates it into a [`ConnectionProfile`] and caches it for the
//! life of the process.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use claimledger_wallet::{MspId, OrgId};
use moka::future::Cache;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::DEFAULT_PROFILE_FILE_PATTERN,
    error::{ErrorKind, LedgerError},
};

/// Why a connection profile could not be loaded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProfileError {
    /// No profile file exists for the organization.
    #[error("no profile at {path}")]
    NotFound {
        /// The path that was tried.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file path.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid profile JSON.
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document parsed but is inconsistent.
    #[error("{0}")]
    Invalid(String),
}

impl ProfileError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Classifies the failure for `org`.
    #[must_use]
    pub fn into_ledger_error(self, org: &OrgId) -> LedgerError {
        let (kind, message) = match &self {
            Self::NotFound { .. } => (
                ErrorKind::ProfileNotFound,
                LedgerError::profile_not_found(org, &self).message().to_owned(),
            ),
            Self::Read { .. } | Self::Parse(_) | Self::Invalid(_) => (
                ErrorKind::ProfileMalformed,
                LedgerError::profile_malformed(org, &self).message().to_owned(),
            ),
        };
        LedgerError::with_source(kind, message, self)
    }
}

/// A network endpoint with its TLS trust roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Logical name, e.g. `peer0.org2.example.com`.
    pub name: String,
    /// URL, e.g. `grpcs://localhost:9051`.
    pub url: String,
    /// PEM-encoded TLS CA certificates.
    pub tls_ca_certs: Vec<String>,
    /// TLS server name override.
    pub ssl_target_name_override: Option<String>,
}

/// A certificate authority endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateAuthority {
    /// Endpoint details.
    pub endpoint: Endpoint,
    /// The CA's registered name, e.g. `ca-org2`.
    pub ca_name: Option<String>,
}

/// A validated connection profile for one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    org: OrgId,
    name: Option<String>,
    msp_id: MspId,
    peers: Vec<Endpoint>,
    orderers: Vec<Endpoint>,
    certificate_authorities: Vec<CertificateAuthority>,
}

impl ConnectionProfile {
    /// Parses and validates a profile document for `org`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Parse`] for invalid JSON and
    /// [`ProfileError::Invalid`] when the document is inconsistent.
    pub fn from_json(org: &OrgId, bytes: &[u8]) -> Result<Self, ProfileError> {
        let raw: RawProfile = serde_json::from_slice(bytes)?;
        raw.validate(org)
    }

    /// The organization this profile was loaded for.
    #[must_use]
    pub fn org(&self) -> &OrgId {
        &self.org
    }

    /// The profile's `name` field.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The organization's MSP identifier.
    #[must_use]
    pub fn msp_id(&self) -> &MspId {
        &self.msp_id
    }

    /// Peers, in the order the organization lists them.
    #[must_use]
    pub fn peers(&self) -> &[Endpoint] {
        &self.peers
    }

    /// Orderers, ordered by name.
    #[must_use]
    pub fn orderers(&self) -> &[Endpoint] {
        &self.orderers
    }

    /// Certificate authorities, ordered by name.
    #[must_use]
    pub fn certificate_authorities(&self) -> &[CertificateAuthority] {
        &self.certificate_authorities
    }
}

// ── Wire format ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProfile {
    name: Option<String>,
    client: Option<RawClient>,
    #[serde(default)]
    organizations: BTreeMap<String, RawOrganization>,
    #[serde(default)]
    peers: BTreeMap<String, RawEndpoint>,
    #[serde(default)]
    orderers: BTreeMap<String, RawEndpoint>,
    #[serde(default)]
    certificate_authorities: BTreeMap<String, RawCertificateAuthority>,
}

#[derive(Debug, Deserialize)]
struct RawClient {
    organization: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrganization {
    mspid: String,
    #[serde(default)]
    peers: Vec<String>,
    #[serde(default)]
    certificate_authorities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    #[serde(default)]
    url: String,
    #[serde(rename = "tlsCACerts")]
    tls_ca_certs: Option<RawTls>,
    #[serde(rename = "grpcOptions", default)]
    grpc_options: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawCertificateAuthority {
    #[serde(default)]
    url: String,
    #[serde(rename = "caName")]
    ca_name: Option<String>,
    #[serde(rename = "tlsCACerts")]
    tls_ca_certs: Option<RawTls>,
}

#[derive(Debug, Deserialize)]
struct RawTls {
    pem: Option<PemList>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PemList {
    One(String),
    Many(Vec<String>),
}

fn pems(tls: Option<RawTls>) -> Vec<String> {
    match tls.and_then(|t| t.pem) {
        Some(PemList::One(pem)) => vec![pem],
        Some(PemList::Many(pems)) => pems,
        None => Vec::new(),
    }
}

fn endpoint(kind: &str, name: String, raw: RawEndpoint) -> Result<Endpoint, ProfileError> {
    if raw.url.trim().is_empty() {
        return Err(ProfileError::invalid(format!("{kind} {name} has no url")));
    }
    let ssl_target_name_override = raw
        .grpc_options
        .get("ssl-target-name-override")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);
    Ok(Endpoint { name, url: raw.url, tls_ca_certs: pems(raw.tls_ca_certs), ssl_target_name_override })
}

impl RawProfile {
    fn validate(mut self, org: &OrgId) -> Result<ConnectionProfile, ProfileError> {
        let org_name = match self.client.and_then(|c| c.organization) {
            Some(name) => name,
            None if self.organizations.len() == 1 => {
                self.organizations.keys().next().cloned().unwrap_or_default()
            },
            None => {
                return Err(ProfileError::invalid(
                    "client.organization is required when the profile lists several organizations",
                ));
            },
        };
        let organization = self.organizations.remove(&org_name).ok_or_else(|| {
            ProfileError::invalid(format!("organization {org_name} is not defined"))
        })?;
        if organization.mspid.trim().is_empty() {
            return Err(ProfileError::invalid(format!("organization {org_name} has no mspid")));
        }
        if organization.peers.is_empty() {
            return Err(ProfileError::invalid(format!("organization {org_name} lists no peers")));
        }

        let mut peers = Vec::with_capacity(organization.peers.len());
        for name in organization.peers {
            let raw = self
                .peers
                .remove(&name)
                .ok_or_else(|| ProfileError::invalid(format!("peer {name} is not defined")))?;
            peers.push(endpoint("peer", name, raw)?);
        }

        let orderers = self
            .orderers
            .into_iter()
            .map(|(name, raw)| endpoint("orderer", name, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut listed_cas = organization.certificate_authorities;
        listed_cas.sort();
        let mut certificate_authorities = Vec::with_capacity(listed_cas.len());
        for name in listed_cas {
            let raw = self.certificate_authorities.remove(&name).ok_or_else(|| {
                ProfileError::invalid(format!("certificate authority {name} is not defined"))
            })?;
            let ca_name = raw.ca_name;
            let endpoint = endpoint(
                "certificate authority",
                name,
                RawEndpoint { url: raw.url, tls_ca_certs: raw.tls_ca_certs, grpc_options: BTreeMap::new() },
            )?;
            certificate_authorities.push(CertificateAuthority { endpoint, ca_name });
        }

        Ok(ConnectionProfile {
            org: org.clone(),
            name: self.name,
            msp_id: MspId::from(organization.mspid),
            peers,
            orderers,
            certificate_authorities,
        })
    }
}

// ── Loader ─────────────────────────────────────────────────────────────

/// Loads and caches connection profiles by organization.
///
/// Concurrent first loads for one organization coalesce into a single
/// read. Failures are not cached, so a fixed profile is picked up by the
/// next call.
#[derive(Clone)]
pub struct ProfileLoader {
    dir: PathBuf,
    pattern: String,
    cache: Cache<OrgId, Arc<ConnectionProfile>>,
    reads: Arc<AtomicU64>,
}

impl std::fmt::Debug for ProfileLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileLoader")
            .field("dir", &self.dir)
            .field("pattern", &self.pattern)
            .field("cached", &self.cache.entry_count())
            .finish()
    }
}

impl ProfileLoader {
    /// Creates a loader reading `connection-{org}.json` files from `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_pattern(dir, DEFAULT_PROFILE_FILE_PATTERN)
    }

    /// Creates a loader with a custom file name template.
    #[must_use]
    pub fn with_pattern(dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            pattern: pattern.into(),
            cache: Cache::builder().build(),
            reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The profile directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the profile file for `org`.
    #[must_use]
    pub fn path_for(&self, org: &OrgId) -> PathBuf {
        self.dir.join(self.pattern.replace("{org}", org.as_str()))
    }

    /// Number of profile files read from disk.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the profile for `org`, reading it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ProfileNotFound`] when no file exists and
    /// [`ErrorKind::ProfileMalformed`] when it cannot be read or validated.
    #[tracing::instrument(skip(self), fields(org = %org))]
    pub async fn load(&self, org: &OrgId) -> Result<Arc<ConnectionProfile>, LedgerError> {
        if let Some(profile) = self.cache.get(org).await {
            tracing::debug!("profile cache hit");
            return Ok(profile);
        }

        self.cache
            .try_get_with(org.clone(), self.read(org))
            .await
            .map_err(|err| (*err).clone())
    }

    async fn read(&self, org: &OrgId) -> Result<Arc<ConnectionProfile>, LedgerError> {
        let org_str = org.as_str();
        if org_str.is_empty() || org_str.contains(['/', '\\', '\0']) || org_str.contains("..") {
            return Err(LedgerError::profile_not_found(org, "invalid organization id"));
        }

        let path = self.path_for(org);
        self.reads.fetch_add(1, Ordering::Relaxed);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProfileError::NotFound { path }.into_ledger_error(org));
            },
            Err(source) => return Err(ProfileError::Read { path, source }.into_ledger_error(org)),
        };

        let profile =
            ConnectionProfile::from_json(org, &bytes).map_err(|err| err.into_ledger_error(org))?;
        tracing::info!(
            path = %path.display(),
            msp_id = %profile.msp_id(),
            peers = profile.peers().len(),
            "loaded connection profile",
        );
        Ok(Arc::new(profile))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn org2_profile() -> serde_json::Value {
        json!({
            "name": "test-network-org2",
            "version": "1.0.0",
            "client": {"organization": "Org2", "connection": {"timeout": {"peer": {"endorser": "300"}}}},
            "organizations": {"Org2": {
                "mspid": "Org2MSP",
                "peers": ["peer1.org2.example.com", "peer0.org2.example.com"],
                "certificateAuthorities": ["ca.org2.example.com"]
            }},
            "peers": {
                "peer0.org2.example.com": {
                    "url": "grpcs://localhost:9051",
                    "tlsCACerts": {"pem": "-----BEGIN CERTIFICATE-----\nA\n-----END CERTIFICATE-----\n"},
                    "grpcOptions": {"ssl-target-name-override": "peer0.org2.example.com", "hostnameOverride": "peer0.org2.example.com"}
                },
                "peer1.org2.example.com": {"url": "grpcs://localhost:10051"}
            },
            "certificateAuthorities": {"ca.org2.example.com": {
                "url": "https://localhost:8054",
                "caName": "ca-org2",
                "tlsCACerts": {"pem": ["-----BEGIN CERTIFICATE-----\nB\n-----END CERTIFICATE-----\n"]},
                "httpOptions": {"verify": false}
            }}
        })
    }

    fn parse(value: &serde_json::Value) -> Result<ConnectionProfile, ProfileError> {
        ConnectionProfile::from_json(&OrgId::from("org2"), value.to_string().as_bytes())
    }

    #[test]
    fn parses_common_connection_profile() {
        let profile = parse(&org2_profile()).unwrap();

        assert_eq!(profile.org().as_str(), "org2");
        assert_eq!(profile.name(), Some("test-network-org2"));
        assert_eq!(profile.msp_id().as_str(), "Org2MSP");
        let names: Vec<_> = profile.peers().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["peer1.org2.example.com", "peer0.org2.example.com"]);
        assert_eq!(profile.peers()[1].tls_ca_certs.len(), 1);
        assert_eq!(
            profile.peers()[1].ssl_target_name_override.as_deref(),
            Some("peer0.org2.example.com")
        );
        assert!(profile.orderers().is_empty());
        let ca = &profile.certificate_authorities()[0];
        assert_eq!(ca.ca_name.as_deref(), Some("ca-org2"));
        assert_eq!(ca.endpoint.tls_ca_certs.len(), 1);
    }

    #[test]
    fn single_organization_is_used_without_client_section() {
        let mut value = org2_profile();
        value.as_object_mut().unwrap().remove("client");
        assert_eq!(parse(&value).unwrap().msp_id().as_str(), "Org2MSP");
    }

    #[test]
    fn orderers_are_sorted_by_name() {
        let mut value = org2_profile();
        value["orderers"] = json!({
            "orderer2.example.com": {"url": "grpcs://localhost:8050"},
            "orderer1.example.com": {"url": "grpcs://localhost:7050"}
        });
        let profile = parse(&value).unwrap();
        let names: Vec<_> = profile.orderers().iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["orderer1.example.com", "orderer2.example.com"]);
    }

    #[rstest]
    #[case::unknown_client_org(json!({"client": {"organization": "Org9"}}), "Org9")]
    #[case::dangling_peer(json!({"organizations": {"Org2": {"mspid": "Org2MSP", "peers": ["ghost"]}}}), "ghost")]
    #[case::no_peers(json!({"organizations": {"Org2": {"mspid": "Org2MSP", "peers": []}}}), "no peers")]
    #[case::empty_url(json!({"peers": {"peer1.org2.example.com": {"url": ""}}}), "no url")]
    #[case::dangling_ca(json!({"certificateAuthorities": {}}), "ca.org2.example.com")]
    fn inconsistent_profiles_are_invalid(#[case] patch: serde_json::Value, #[case] needle: &str) {
        let mut value = org2_profile();
        for (key, field) in patch.as_object().unwrap() {
            value[key] = field.clone();
        }
        let err = parse(&value).unwrap_err();
        assert!(matches!(err, ProfileError::Invalid(ref m) if m.contains(needle)), "{err}");
    }

    #[test]
    fn non_json_is_a_parse_error() {
        let err = ConnectionProfile::from_json(&OrgId::from("org2"), b"not json").unwrap_err();
        assert!(matches!(err, ProfileError::Parse(_)));
    }

    #[tokio::test]
    async fn missing_file_is_profile_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ProfileLoader::new(dir.path());

        let err = loader.load(&OrgId::from("org3")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProfileNotFound);
    }

    #[tokio::test]
    async fn path_traversal_is_rejected_without_reading() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ProfileLoader::new(dir.path());

        let err = loader.load(&OrgId::from("../org2")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProfileNotFound);
        assert_eq!(loader.read_count(), 0);
    }

    #[tokio::test]
    async fn successful_load_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("connection-org2.json"), org2_profile().to_string()).unwrap();
        let loader = ProfileLoader::new(dir.path());
        let org = OrgId::from("org2");

        let first = loader.load(&org).await.unwrap();
        std::fs::remove_file(dir.path().join("connection-org2.json")).unwrap();
        let second = loader.load(&org).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.read_count(), 1);
    }

    #[tokio::test]
    async fn malformed_profile_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connection-org2.json");
        std::fs::write(&path, "{").unwrap();
        let loader = ProfileLoader::new(dir.path());
        let org = OrgId::from("org2");

        let err = loader.load(&org).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProfileMalformed);

        std::fs::write(&path, org2_profile().to_string()).unwrap();
        assert!(loader.load(&org).await.is_ok());
        assert_eq!(loader.read_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_loads_read_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("connection-org2.json"), org2_profile().to_string()).unwrap();
        let loader = ProfileLoader::new(dir.path());

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let loader = loader.clone();
            set.spawn(async move { loader.load(&OrgId::from("org2")).await.unwrap() });
        }
        let profiles = set.join_all().await;

        for profile in &profiles {
            assert!(Arc::ptr_eq(profile, &profiles[0]));
        }
        assert_eq!(loader.read_count(), 1);
    }
}
