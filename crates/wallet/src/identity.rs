//! Identity records and their on-disk representation.
//!
//! An [`Identity`] is the credential material (certificate plus private key)
//! that authorizes actions on behalf of a user or administrator within one
//! organization. Identities are produced by an out-of-band import step and
//! are immutable once stored.
//!
//! # Wire Format
//!
//! Identities are persisted in the ledger platform's wallet format so that
//! wallets written by the platform's own import tooling can be read as-is:
//!
//! ```json
//! {
//!   "credentials": { "certificate": "-----BEGIN CERTIFICATE-----...", "privateKey": "..." },
//!   "mspId": "Org2MSP",
//!   "type": "X.509",
//!   "version": 1
//! }
//! ```

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    error::{WalletError, WalletResult},
    types::MspId,
};

/// Maximum label length in bytes: a 255-byte file name less the `.id`
/// extension.
pub const MAX_LABEL_LEN: usize = 252;

/// Current version of the identity record format.
const RECORD_VERSION: u32 = 1;

/// The credential scheme of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IdentityKind {
    /// X.509 certificate with an accompanying private key.
    #[default]
    #[serde(rename = "X.509")]
    X509,
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X509 => write!(f, "X.509"),
        }
    }
}

/// Credential material for one member of an organization.
///
/// The private key is held in a [`Zeroizing`] buffer and is never printed
/// by the `Debug` implementation.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    label: String,
    msp_id: MspId,
    certificate: Vec<u8>,
    private_key: Zeroizing<Vec<u8>>,
    kind: IdentityKind,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("label", &self.label)
            .field("msp_id", &self.msp_id)
            .field("kind", &self.kind)
            .field("certificate_len", &self.certificate.len())
            .finish_non_exhaustive()
    }
}

impl Identity {
    /// Creates an X.509 identity.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidLabel`] if the label is not a valid
    /// wallet key (see [`validate_label`]).
    pub fn x509(
        label: impl Into<String>,
        msp_id: impl Into<MspId>,
        certificate: impl Into<Vec<u8>>,
        private_key: impl Into<Vec<u8>>,
    ) -> WalletResult<Self> {
        let label = label.into();
        validate_label(&label)?;
        Ok(Self {
            label,
            msp_id: msp_id.into(),
            certificate: certificate.into(),
            private_key: Zeroizing::new(private_key.into()),
            kind: IdentityKind::X509,
        })
    }

    /// Returns the wallet label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the MSP identifier of the owning organization.
    #[must_use]
    pub fn msp_id(&self) -> &MspId {
        &self.msp_id
    }

    /// Returns the PEM-encoded certificate.
    #[must_use]
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Returns the PEM-encoded private key.
    #[must_use]
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// Returns the credential scheme.
    #[must_use]
    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    /// Returns a copy of this identity stored under a different label.
    pub(crate) fn relabel(&self, label: &str) -> Self {
        Self { label: label.to_owned(), ..self.clone() }
    }

    /// Encodes the identity in the wallet record format.
    pub(crate) fn to_record_bytes(&self) -> WalletResult<Zeroizing<Vec<u8>>> {
        let certificate = std::str::from_utf8(&self.certificate)
            .map_err(|e| WalletError::serialization("certificate is not valid PEM text", e))?;
        let private_key = std::str::from_utf8(&self.private_key)
            .map_err(|e| WalletError::serialization("private key is not valid PEM text", e))?;

        let record = IdentityRecord {
            credentials: Credentials {
                certificate: certificate.to_owned(),
                private_key: Zeroizing::new(private_key.to_owned()),
            },
            msp_id: self.msp_id.as_str().to_owned(),
            kind: self.kind,
            version: RECORD_VERSION,
        };

        serde_json::to_vec(&record)
            .map(Zeroizing::new)
            .map_err(|e| WalletError::serialization("encode identity record", e))
    }

    /// Decodes an identity from the wallet record format.
    pub(crate) fn from_record_bytes(label: &str, bytes: &[u8]) -> WalletResult<Self> {
        let record: IdentityRecord = serde_json::from_slice(bytes)
            .map_err(|e| WalletError::serialization(format!("decode identity {label}"), e))?;

        Ok(Self {
            label: label.to_owned(),
            msp_id: MspId::from(record.msp_id),
            certificate: record.credentials.certificate.into_bytes(),
            private_key: Zeroizing::new(record.credentials.private_key.as_bytes().to_vec()),
            kind: record.kind,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    credentials: Credentials,
    #[serde(rename = "mspId")]
    msp_id: String,
    #[serde(rename = "type")]
    kind: IdentityKind,
    #[serde(default = "default_record_version")]
    version: u32,
}

#[derive(Serialize, Deserialize)]
struct Credentials {
    certificate: String,
    #[serde(rename = "privateKey")]
    private_key: Zeroizing<String>,
}

fn default_record_version() -> u32 {
    RECORD_VERSION
}

/// Checks that a label can be used as a wallet key.
///
/// Labels name files in the file-system wallet, so they must be non-empty,
/// at most [`MAX_LABEL_LEN`] bytes, and free of path separators, `..` and
/// NUL bytes.
///
/// # Errors
///
/// Returns [`WalletError::InvalidLabel`] describing the first violation.
pub fn validate_label(label: &str) -> WalletResult<()> {
    if label.is_empty() {
        return Err(WalletError::invalid_label(label, "label is empty"));
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(WalletError::invalid_label(label, "label exceeds 252 bytes"));
    }
    if label.contains(['/', '\\', '\0']) {
        return Err(WalletError::invalid_label(label, "label contains a path separator or NUL"));
    }
    if label == "." || label.contains("..") {
        return Err(WalletError::invalid_label(label, "label contains a relative path component"));
    }
    Ok(())
}
