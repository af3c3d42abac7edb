//! The insurance route catalog.
//!
//! Every HTTP route of the insurance service maps to exactly one ledger
//! transaction: an organization, a contract, a function, an ordered
//! argument list and a [`Mode`]. [`Route::parse`] matches a method and path
//! (and decodes the JSON body of `POST` routes); [`Route::binding`] and
//! [`Route::args`] produce the transaction.
//!
//! Path parameters are percent-decoded before they reach a contract, so
//! `/claims/queryClaim/user%201` queries `user 1`. A `+` stays a `+`.

use std::{borrow::Cow, fmt};

use claimledger_gateway::Mode;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::Value;

/// HTTP method of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`: evaluations.
    Get,
    /// `POST`: submits.
    Post,
}

impl Method {
    /// Parses an HTTP method name, case-insensitively.
    #[must_use]
    pub fn parse(method: &str) -> Option<Self> {
        if method.eq_ignore_ascii_case("GET") {
            Some(Self::Get)
        } else if method.eq_ignore_ascii_case("POST") {
            Some(Self::Post)
        } else {
            None
        }
    }

    /// Upper-case method name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which chaincode a route invokes. Deployed names come from
/// [`InsuranceConfig`](crate::InsuranceConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contract {
    /// Policies, registrations and health records.
    Registration,
    /// Patient details and claims.
    Claims,
}

/// The ledger transaction a route runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Organization whose profile and identity are used.
    pub org: &'static str,
    /// Target chaincode.
    pub contract: Contract,
    /// Contract function name.
    pub function: &'static str,
    /// Submit or evaluate.
    pub mode: Mode,
}

/// Request parsing failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RouteError {
    /// No route matches the method and path.
    #[error("Cannot {method} {path}")]
    NotFound {
        /// Request method as received.
        method: String,
        /// Request path as received.
        path: String,
    },

    /// The body of a `POST` route is not the expected JSON.
    #[error("invalid request body for {route}: {source}")]
    InvalidBody {
        /// Route name.
        route: &'static str,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },

    /// A path parameter does not percent-decode to UTF-8.
    #[error("Failed to decode param '{param}'")]
    InvalidParam {
        /// The parameter as received.
        param: String,
    },
}

impl RouteError {
    /// HTTP status for this failure.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::InvalidBody { .. } | Self::InvalidParam { .. } => 400,
        }
    }
}

fn decode_param(raw: &str) -> Result<String, RouteError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| RouteError::InvalidParam { param: raw.to_owned() })
}

// ── Argument values ────────────────────────────────────────────────────

/// A JSON scalar forwarded to a contract as its string form.
///
/// Clients send amounts and flags either as JSON numbers and booleans or
/// as strings; both reach the contract as the same text (`500`, `true`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// `true` / `false`.
    Bool(bool),
    /// Any JSON number.
    Number(serde_json::Number),
    /// Passed through unchanged.
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            // Integral floats print without a fraction: `500.0` -> `500`.
            Self::Number(n) => match n.as_f64() {
                Some(v) if n.is_f64() => write!(f, "{v}"),
                _ => write!(f, "{n}"),
            },
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

/// A JSON document argument, accepted either as embedded JSON or as a
/// string that already holds JSON text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum JsonArg {
    /// Already serialized.
    Text(String),
    /// Serialized compactly before forwarding.
    Value(Value),
}

impl fmt::Display for JsonArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

// ── Request bodies ─────────────────────────────────────────────────────

/// Body of `POST /insurance/definePolicy`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinePolicy {
    /// Policy identifier.
    #[serde(rename = "policyID")]
    pub policy_id: String,
    /// Free-form policy type, e.g. `health`.
    pub policy_type: String,
    /// Maximum payout.
    pub cover_amount: Scalar,
    /// Required premium.
    pub premium: Scalar,
    /// First day of cover.
    pub start_date: String,
    /// Last day of cover.
    pub end_date: String,
    /// Eligibility criteria document.
    #[serde(rename = "criteriaJSON")]
    pub criteria_json: JsonArg,
    /// Covered diseases document.
    #[serde(rename = "diseasesJSON")]
    pub diseases_json: JsonArg,
}

/// Body of `POST /insurance/registerForPolicy`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForPolicy {
    /// Registering user.
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Policy to register for.
    #[serde(rename = "policyID")]
    pub policy_id: String,
    /// Premium the user paid.
    pub premium_paid: Scalar,
    /// Declared smoking status.
    pub is_non_smoker: Scalar,
    /// Declared disease status.
    pub has_disease: Scalar,
    /// Consent to query health records.
    pub consent: Scalar,
}

/// Body of `POST /insurance/uploadHealthRecords`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadHealthRecords {
    /// Patient identifier.
    pub id: String,
    /// Recorded smoking status.
    pub is_non_smoker: Scalar,
    /// Recorded disease status.
    pub has_disease: Scalar,
}

/// Body of `POST /claims/uploadPatientDetails`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPatientDetails {
    /// Patient identifier.
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Diagnosis.
    pub disease_diagnosis: String,
    /// Treatment plan.
    pub treatment_plan: String,
    /// Treating hospital.
    pub hospital_name: String,
    /// Admission date.
    pub admission_date: String,
    /// Discharge date.
    pub discharge_date: String,
}

/// Body of `POST /claims/processClaim`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessClaim {
    /// Claimant.
    #[serde(rename = "userID")]
    pub user_id: String,
}

// ── Routes ─────────────────────────────────────────────────────────────

/// A matched insurance route with its decoded parameters.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Route {
    /// `POST /insurance/definePolicy`
    DefinePolicy(DefinePolicy),
    /// `GET /insurance/queryPolicy/:policyID`
    QueryPolicy {
        /// Policy identifier.
        policy_id: String,
    },
    /// `POST /insurance/registerForPolicy`
    RegisterForPolicy(RegisterForPolicy),
    /// `GET /insurance/queryRegistration/:userId/:policyId`
    QueryRegistration {
        /// Registered user.
        user_id: String,
        /// Policy identifier.
        policy_id: String,
    },
    /// `POST /insurance/uploadHealthRecords`
    UploadHealthRecords(UploadHealthRecords),
    /// `GET /insurance/queryHealthRecords/:id`, as org2.
    QueryHealthRecords {
        /// Patient identifier.
        id: String,
    },
    /// `GET /insurance/queryHealthRecordsorg1/:id`, as org1.
    QueryHealthRecordsOrg1 {
        /// Patient identifier.
        id: String,
    },
    /// `GET /insurance/queryAllPolicies`
    QueryAllPolicies,
    /// `POST /claims/uploadPatientDetails`
    UploadPatientDetails(UploadPatientDetails),
    /// `POST /claims/processClaim`
    ProcessClaim(ProcessClaim),
    /// `GET /claims/queryClaim/:userID`
    QueryClaim {
        /// Claimant.
        user_id: String,
    },
}

const ORG1: &str = "org1";
const ORG2: &str = "org2";

impl Route {
    /// Matches `method` and `path` against the catalog.
    ///
    /// Literal path segments match case-insensitively; a query string and a
    /// trailing slash are ignored. `body` is decoded only for `POST` routes.
    ///
    /// # Errors
    ///
    /// - [`RouteError::NotFound`] if nothing matches
    /// - [`RouteError::InvalidBody`] if a `POST` body does not decode
    /// - [`RouteError::InvalidParam`] if a path parameter is not UTF-8 once decoded
    pub fn parse(method: Method, path: &str, body: &[u8]) -> Result<Self, RouteError> {
        let trimmed = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> =
            trimmed.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        let not_found = || RouteError::NotFound { method: method.to_string(), path: path.to_owned() };

        let is = |idx: usize, literal: &str| {
            segments.get(idx).is_some_and(|s| s.eq_ignore_ascii_case(literal))
        };
        let param = |idx: usize| decode_param(segments[idx]);

        let route = match (method, segments.len()) {
            (Method::Post, 2) if is(0, "insurance") && is(1, "definePolicy") => {
                Self::DefinePolicy(decode("definePolicy", body)?)
            },
            (Method::Post, 2) if is(0, "insurance") && is(1, "registerForPolicy") => {
                Self::RegisterForPolicy(decode("registerForPolicy", body)?)
            },
            (Method::Post, 2) if is(0, "insurance") && is(1, "uploadHealthRecords") => {
                Self::UploadHealthRecords(decode("uploadHealthRecords", body)?)
            },
            (Method::Post, 2) if is(0, "claims") && is(1, "uploadPatientDetails") => {
                Self::UploadPatientDetails(decode("uploadPatientDetails", body)?)
            },
            (Method::Post, 2) if is(0, "claims") && is(1, "processClaim") => {
                Self::ProcessClaim(decode("processClaim", body)?)
            },
            (Method::Get, 2) if is(0, "insurance") && is(1, "queryAllPolicies") => {
                Self::QueryAllPolicies
            },
            (Method::Get, 3) if is(0, "insurance") && is(1, "queryPolicy") => {
                Self::QueryPolicy { policy_id: param(2)? }
            },
            (Method::Get, 3) if is(0, "insurance") && is(1, "queryHealthRecords") => {
                Self::QueryHealthRecords { id: param(2)? }
            },
            (Method::Get, 3) if is(0, "insurance") && is(1, "queryHealthRecordsorg1") => {
                Self::QueryHealthRecordsOrg1 { id: param(2)? }
            },
            (Method::Get, 3) if is(0, "claims") && is(1, "queryClaim") => {
                Self::QueryClaim { user_id: param(2)? }
            },
            (Method::Get, 4) if is(0, "insurance") && is(1, "queryRegistration") => {
                Self::QueryRegistration { user_id: param(2)?, policy_id: param(3)? }
            },
            _ => return Err(not_found()),
        };
        Ok(route)
    }

    /// Route name, as used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DefinePolicy(_) => "definePolicy",
            Self::QueryPolicy { .. } => "queryPolicy",
            Self::RegisterForPolicy(_) => "registerForPolicy",
            Self::QueryRegistration { .. } => "queryRegistration",
            Self::UploadHealthRecords(_) => "uploadHealthRecords",
            Self::QueryHealthRecords { .. } => "queryHealthRecords",
            Self::QueryHealthRecordsOrg1 { .. } => "queryHealthRecordsOrg1",
            Self::QueryAllPolicies => "queryAllPolicies",
            Self::UploadPatientDetails(_) => "uploadPatientDetails",
            Self::ProcessClaim(_) => "processClaim",
            Self::QueryClaim { .. } => "queryClaim",
        }
    }

    /// The transaction this route runs.
    #[must_use]
    pub fn binding(&self) -> Binding {
        use Contract::{Claims, Registration};
        use Mode::{Evaluate, Submit};

        let (org, contract, function, mode) = match self {
            Self::DefinePolicy(_) => (ORG2, Registration, "DefinePolicy", Submit),
            Self::QueryPolicy { .. } => (ORG2, Registration, "QueryPolicy", Evaluate),
            Self::RegisterForPolicy(_) => (ORG2, Registration, "RegisterForPolicy", Submit),
            Self::QueryRegistration { .. } => (ORG2, Registration, "QueryRegistration", Evaluate),
            Self::UploadHealthRecords(_) => (ORG1, Registration, "UploadHealthRecords", Submit),
            Self::QueryHealthRecords { .. } => (ORG2, Registration, "QueryHealthRecords", Evaluate),
            Self::QueryHealthRecordsOrg1 { .. } => {
                (ORG1, Registration, "QueryHealthRecords", Evaluate)
            },
            Self::QueryAllPolicies => (ORG2, Registration, "QueryAllPolicies", Evaluate),
            Self::UploadPatientDetails(_) => (ORG1, Claims, "UploadPatientDetails", Submit),
            Self::ProcessClaim(_) => (ORG2, Claims, "ProcessClaim", Submit),
            Self::QueryClaim { .. } => (ORG2, Claims, "QueryClaim", Evaluate),
        };
        Binding { org, contract, function, mode }
    }

    /// Contract arguments, in the order the function declares them.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::DefinePolicy(b) => vec![
                b.policy_id.clone(),
                b.policy_type.clone(),
                b.cover_amount.to_string(),
                b.premium.to_string(),
                b.start_date.clone(),
                b.end_date.clone(),
                b.criteria_json.to_string(),
                b.diseases_json.to_string(),
            ],
            Self::RegisterForPolicy(b) => vec![
                b.user_id.clone(),
                b.policy_id.clone(),
                b.premium_paid.to_string(),
                b.is_non_smoker.to_string(),
                b.has_disease.to_string(),
                b.consent.to_string(),
            ],
            Self::UploadHealthRecords(b) => {
                vec![b.id.clone(), b.is_non_smoker.to_string(), b.has_disease.to_string()]
            },
            Self::UploadPatientDetails(b) => vec![
                b.user_id.clone(),
                b.disease_diagnosis.clone(),
                b.treatment_plan.clone(),
                b.hospital_name.clone(),
                b.admission_date.clone(),
                b.discharge_date.clone(),
            ],
            Self::ProcessClaim(b) => vec![b.user_id.clone()],
            Self::QueryPolicy { policy_id } => vec![policy_id.clone()],
            Self::QueryRegistration { user_id, policy_id } => {
                vec![user_id.clone(), policy_id.clone()]
            },
            Self::QueryHealthRecords { id } | Self::QueryHealthRecordsOrg1 { id } => vec![id.clone()],
            Self::QueryAllPolicies => Vec::new(),
            Self::QueryClaim { user_id } => vec![user_id.clone()],
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(route: &'static str, body: &[u8]) -> Result<T, RouteError> {
    serde_json::from_slice(body).map_err(|source| RouteError::InvalidBody { route, source })
}
