//! Insurance service configuration: which wallet identity acts for each
//! organization, and the deployed chaincode names.

use std::collections::BTreeMap;

use claimledger_gateway::ConfigError;
use claimledger_wallet::OrgId;
use serde::{Deserialize, Serialize};

use crate::routes::Contract;

/// Default chaincode name of the registration contract.
pub const DEFAULT_REGISTRATION_CONTRACT: &str = "registration";

/// Default chaincode name of the claims contract.
pub const DEFAULT_CLAIMS_CONTRACT: &str = "claims";

/// Organizations every route binding refers to.
const REQUIRED_ORGS: [(&str, &str); 2] = [("org1", "identities.org1"), ("org2", "identities.org2")];

fn default_identities() -> BTreeMap<OrgId, String> {
    BTreeMap::from([
        (OrgId::from("org1"), "Admin@org1.example.com".to_owned()),
        (OrgId::from("org2"), "Admin@org2.example.com".to_owned()),
    ])
}

fn default_registration_contract() -> String {
    DEFAULT_REGISTRATION_CONTRACT.to_owned()
}

fn default_claims_contract() -> String {
    DEFAULT_CLAIMS_CONTRACT.to_owned()
}

/// Route-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsuranceConfig {
    /// Wallet label used for each organization.
    #[serde(default = "default_identities")]
    identities: BTreeMap<OrgId, String>,

    /// Deployed name of the registration chaincode.
    #[serde(default = "default_registration_contract")]
    registration_contract: String,

    /// Deployed name of the claims chaincode.
    #[serde(default = "default_claims_contract")]
    claims_contract: String,
}

impl Default for InsuranceConfig {
    fn default() -> Self {
        Self {
            identities: default_identities(),
            registration_contract: default_registration_contract(),
            claims_contract: default_claims_contract(),
        }
    }
}

#[bon::bon]
impl InsuranceConfig {
    /// Creates a configuration.
    ///
    /// # Errors
    ///
    /// See [`InsuranceConfig::validate`].
    #[builder]
    pub fn new(
        #[builder(default = default_identities())] identities: BTreeMap<OrgId, String>,
        #[builder(into, default = default_registration_contract())] registration_contract: String,
        #[builder(into, default = default_claims_contract())] claims_contract: String,
    ) -> Result<Self, ConfigError> {
        let config = Self { identities, registration_contract, claims_contract };
        config.validate()?;
        Ok(config)
    }

    /// Checks that `org1` and `org2` have non-empty identity labels and
    /// both contract names are set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming the first absent setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (org, field) in REQUIRED_ORGS {
            match self.identities.get(&OrgId::from(org)) {
                Some(label) if !label.trim().is_empty() => {},
                _ => return Err(ConfigError::Missing { field }),
            }
        }
        if self.registration_contract.trim().is_empty() {
            return Err(ConfigError::Missing { field: "registration_contract" });
        }
        if self.claims_contract.trim().is_empty() {
            return Err(ConfigError::Missing { field: "claims_contract" });
        }
        Ok(())
    }

    /// Identity label acting for `org`.
    #[must_use]
    pub fn identity_for(&self, org: &str) -> Option<&str> {
        self.identities.get(&OrgId::from(org)).map(String::as_str)
    }

    /// Deployed name of `contract`.
    #[must_use]
    pub fn contract_name(&self, contract: Contract) -> &str {
        match contract {
            Contract::Registration => &self.registration_contract,
            Contract::Claims => &self.claims_contract,
        }
    }
}
