//! Insurance claims service over the ledger gateway.
//!
//! Each HTTP route of the service (defining and querying policies,
//! registrations, health records, patient details and claims) maps to one
//! ledger transaction. [`InsuranceService::handle`] matches the route,
//! runs its transaction through a [`LedgerGateway`] and renders an
//! [`ApiResponse`]: `200` with the decoded JSON or a confirmation message,
//! or `500` with `{"error": message}` for any ledger failure.
//!
//! ```no_run
//! # async fn run(gateway: claimledger_gateway::LedgerGateway) {
//! use claimledger_insurance::{InsuranceConfig, InsuranceService};
//!
//! let service = InsuranceService::new(gateway, InsuranceConfig::default());
//! let response = service.handle("GET", "/insurance/queryPolicy/POL1", b"").await;
//! println!("{} {}", response.status, String::from_utf8_lossy(&response.body_bytes()));
//! # }
//! ```
//!
//! [`LedgerGateway`]: claimledger_gateway::LedgerGateway

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod response;
pub mod routes;
mod service;

pub use config::InsuranceConfig;
pub use response::{ApiResponse, ResponseBody};
pub use routes::{Binding, Contract, Method, Route, RouteError};
pub use service::InsuranceService;
