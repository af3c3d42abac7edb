//! Executes insurance routes through the ledger gateway.

use claimledger_gateway::{
    ConfigError, EvaluateResult, LedgerError, LedgerGateway, TransactionRequest, TransactionResult,
};
use serde_json::json;

use crate::{
    config::InsuranceConfig,
    response::ApiResponse,
    routes::{Method, Route},
};

/// The insurance service: route catalog plus gateway.
#[derive(Debug)]
pub struct InsuranceService {
    gateway: LedgerGateway,
    config: InsuranceConfig,
}

impl InsuranceService {
    /// Creates a service over `gateway`.
    #[must_use]
    pub fn new(gateway: LedgerGateway, config: InsuranceConfig) -> Self {
        Self { gateway, config }
    }

    /// Dispatches a raw HTTP request: the health probe, or a catalog route.
    pub async fn handle(&self, method: &str, path: &str, body: &[u8]) -> ApiResponse {
        let Some(parsed) = Method::parse(method) else {
            return ApiResponse::error(404, format!("Cannot {method} {path}"));
        };
        if parsed == Method::Get && is_health(path) {
            return ApiResponse::health();
        }
        match Route::parse(parsed, path, body) {
            Ok(route) => self.execute(&route).await,
            Err(err) => {
                tracing::debug!(method, path, error = %err, "request rejected");
                ApiResponse::from(&err)
            },
        }
    }

    /// The gateway request for `route`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if no identity is configured for the
    /// route's organization.
    pub fn request_for(&self, route: &Route) -> Result<TransactionRequest, ConfigError> {
        let binding = route.binding();
        let identity = self
            .config
            .identity_for(binding.org)
            .ok_or(ConfigError::Missing { field: "identities" })?;
        TransactionRequest::builder()
            .org(binding.org)
            .identity(identity)
            .contract(self.config.contract_name(binding.contract))
            .function(binding.function)
            .args(route.args())
            .mode(binding.mode)
            .build()
    }

    /// Runs `route` and renders its response.
    ///
    /// Submits answer with the route's confirmation, evaluates with the
    /// decoded JSON payload. Every failure answers `500` with
    /// `{"error": message}`.
    #[tracing::instrument(skip(self, route), fields(route = route.name()))]
    pub async fn execute(&self, route: &Route) -> ApiResponse {
        let request = match self.request_for(route) {
            Ok(request) => request,
            Err(err) => return ApiResponse::error(500, err.to_string()),
        };

        match self.gateway.execute(&request).await {
            Ok(TransactionResult::Submitted(confirmation)) => {
                tracing::info!(tx_id = %confirmation.transaction_id, "transaction committed");
                confirmation_for(route)
            },
            Ok(TransactionResult::Evaluated(result)) => evaluated(&result),
            Err(err) => failure(&err),
        }
    }

    /// The underlying gateway.
    #[must_use]
    pub fn gateway(&self) -> &LedgerGateway {
        &self.gateway
    }

    /// Closes every ledger session.
    pub async fn shutdown(&self) -> usize {
        self.gateway.shutdown().await
    }
}

fn is_health(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/').eq_ignore_ascii_case("/health")
}

fn confirmation_for(route: &Route) -> ApiResponse {
    match route {
        Route::DefinePolicy(b) => ApiResponse::text(format!("Policy {} defined successfully.", b.policy_id)),
        Route::RegisterForPolicy(b) => ApiResponse::text(format!(
            "User {} registered for policy {} successfully.",
            b.user_id, b.policy_id
        )),
        Route::UploadHealthRecords(b) => ApiResponse::json(json!({
            "message": format!("Health records uploaded successfully for ID: {}", b.id)
        })),
        Route::UploadPatientDetails(b) => {
            ApiResponse::text(format!("Patient details for {} uploaded successfully.", b.user_id))
        },
        Route::ProcessClaim(b) => {
            ApiResponse::text(format!("Claim for user {} processed successfully.", b.user_id))
        },
        other => ApiResponse::text(format!("{} completed successfully.", other.name())),
    }
}

fn evaluated(result: &EvaluateResult) -> ApiResponse {
    match (&result.json, &result.warning) {
        (Some(json), _) => ApiResponse::json(json.clone()),
        (None, Some(warning)) => ApiResponse::error(500, warning),
        (None, None) => ApiResponse::error(500, "contract returned an empty response"),
    }
}

fn failure(err: &LedgerError) -> ApiResponse {
    if err.kind().is_business_outcome() {
        tracing::info!(kind = %err.kind(), tx_id = err.transaction_id(), error = %err, "transaction rejected");
    } else {
        tracing::warn!(kind = %err.kind(), error = %err, "ledger request failed");
    }
    ApiResponse::from(err)
}
