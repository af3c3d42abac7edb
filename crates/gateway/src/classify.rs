//! Maps connector failures into the stable [`ErrorKind`] taxonomy.

use claimledger_wallet::WalletError;

use crate::{
    connector::GatewayError,
    error::{ErrorKind, LedgerError},
};

/// Classifies a low-level failure.
///
/// Total over every [`GatewayError`] variant. gRPC status codes are mapped
/// by meaning; codes with no ledger-specific meaning become
/// [`ErrorKind::UpstreamFailure`].
#[must_use]
pub fn classify(err: &GatewayError) -> ErrorKind {
    match err {
        GatewayError::Connection { .. } => ErrorKind::ConnectFailed,
        GatewayError::Discovery { .. } => ErrorKind::DiscoveryFailed,
        GatewayError::ContractNotFound { .. } => ErrorKind::ContractNotFound,
        GatewayError::Endorsement { .. } => ErrorKind::EndorsementFailed,
        GatewayError::Commit { .. } => ErrorKind::ValidationFailed,
        GatewayError::Timeout { .. } => ErrorKind::Timeout,
        GatewayError::Disconnected { .. } | GatewayError::Shutdown => ErrorKind::ConnectivityLost,
        GatewayError::Chaincode { .. }
        | GatewayError::Ordering { .. }
        | GatewayError::MalformedResponse { .. } => ErrorKind::UpstreamFailure,
        GatewayError::Rpc { code, .. } => classify_code(*code),
    }
}

fn classify_code(code: tonic::Code) -> ErrorKind {
    use tonic::Code;

    match code {
        Code::Unavailable | Code::Cancelled => ErrorKind::ConnectivityLost,
        Code::DeadlineExceeded => ErrorKind::Timeout,
        Code::NotFound => ErrorKind::ContractNotFound,
        Code::Aborted => ErrorKind::EndorsementFailed,
        Code::FailedPrecondition => ErrorKind::ValidationFailed,
        _ => ErrorKind::UpstreamFailure,
    }
}

fn message_for(err: &GatewayError) -> String {
    match err {
        // Chaincode errors are surfaced exactly as the contract raised them.
        GatewayError::Chaincode { message, .. } => message.clone(),
        GatewayError::Endorsement { message, details, .. } if !details.is_empty() => {
            let peers = details
                .iter()
                .map(|d| format!("{} ({}): {}", d.peer, d.msp_id, d.message))
                .collect::<Vec<_>>()
                .join("; ");
            format!("{message}: {peers}")
        },
        other => other.to_string(),
    }
}

impl From<GatewayError> for LedgerError {
    fn from(err: GatewayError) -> Self {
        let kind = classify(&err);
        let message = message_for(&err);
        let transaction_id = err.transaction_id().map(str::to_owned);
        let classified = LedgerError::with_source(kind, message, err);
        match transaction_id {
            Some(tx_id) => classified.for_transaction(tx_id),
            None => classified,
        }
    }
}

impl From<WalletError> for LedgerError {
    fn from(err: WalletError) -> Self {
        match &err {
            // A label the wallet cannot even store is as absent as an unknown one.
            WalletError::NotFound { label } | WalletError::InvalidLabel { label, .. } => {
                let message = LedgerError::identity_not_found(label).message().to_owned();
                LedgerError::with_source(ErrorKind::IdentityNotFound, message, err)
            },
            _ => {
                let message = format!("wallet failure: {err}");
                LedgerError::with_source(ErrorKind::UpstreamFailure, message, err)
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;
    use tonic::Code;

    use super::*;
    use crate::connector::EndorsementDetail;

    #[rstest]
    #[case::connection(GatewayError::Connection { endpoint: "grpcs://localhost:9051".into(), message: "refused".into() }, ErrorKind::ConnectFailed)]
    #[case::discovery(GatewayError::Discovery { channel: "mychannel".into(), message: "no peers".into() }, ErrorKind::DiscoveryFailed)]
    #[case::contract(GatewayError::ContractNotFound { contract: "claims".into(), channel: "mychannel".into() }, ErrorKind::ContractNotFound)]
    #[case::chaincode(GatewayError::Chaincode { status: 500, message: "boom".into() }, ErrorKind::UpstreamFailure)]
    #[case::endorsement(GatewayError::Endorsement { tx_id: "t".into(), message: "policy".into(), details: vec![] }, ErrorKind::EndorsementFailed)]
    #[case::ordering(GatewayError::Ordering { tx_id: "t".into(), message: "bad".into() }, ErrorKind::UpstreamFailure)]
    #[case::commit(GatewayError::Commit { tx_id: "t".into(), validation_code: "MVCC_READ_CONFLICT".into() }, ErrorKind::ValidationFailed)]
    #[case::timeout(GatewayError::Timeout { operation: "evaluate".into(), duration_ms: 5 }, ErrorKind::Timeout)]
    #[case::disconnected(GatewayError::Disconnected { message: "reset".into() }, ErrorKind::ConnectivityLost)]
    #[case::shutdown(GatewayError::Shutdown, ErrorKind::ConnectivityLost)]
    #[case::malformed(GatewayError::MalformedResponse { message: "truncated".into() }, ErrorKind::UpstreamFailure)]
    fn classifies_variants(#[case] err: GatewayError, #[case] expected: ErrorKind) {
        assert_eq!(classify(&err), expected);
    }

    #[rstest]
    #[case(Code::Unavailable, ErrorKind::ConnectivityLost)]
    #[case(Code::Cancelled, ErrorKind::ConnectivityLost)]
    #[case(Code::DeadlineExceeded, ErrorKind::Timeout)]
    #[case(Code::NotFound, ErrorKind::ContractNotFound)]
    #[case(Code::Aborted, ErrorKind::EndorsementFailed)]
    #[case(Code::FailedPrecondition, ErrorKind::ValidationFailed)]
    #[case(Code::PermissionDenied, ErrorKind::UpstreamFailure)]
    #[case(Code::Internal, ErrorKind::UpstreamFailure)]
    #[case(Code::Unknown, ErrorKind::UpstreamFailure)]
    fn classifies_rpc_codes(#[case] code: Code, #[case] expected: ErrorKind) {
        let err = GatewayError::Rpc { code, message: "x".into() };
        assert_eq!(classify(&err), expected);
    }

    #[test]
    fn chaincode_message_is_preserved_verbatim() {
        let err: LedgerError = GatewayError::Chaincode {
            status: 500,
            message: "policy with ID POL_MISSING does not exist".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
        assert_eq!(err.message(), "policy with ID POL_MISSING does not exist");
    }

    #[test]
    fn endorsement_details_are_listed() {
        let err: LedgerError = GatewayError::Endorsement {
            tx_id: "tx9".into(),
            message: "endorsement policy not satisfied".into(),
            details: vec![EndorsementDetail {
                peer: "peer0.org2.example.com".into(),
                msp_id: "Org2MSP".into(),
                message: "access denied".into(),
            }],
        }
        .into();
        assert_eq!(err.transaction_id(), Some("tx9"));
        assert!(err.message().contains("peer0.org2.example.com (Org2MSP): access denied"));
    }

    #[test]
    fn wallet_not_found_is_identity_not_found() {
        let err: LedgerError = WalletError::not_found("appUser").into();
        assert_eq!(err.kind(), ErrorKind::IdentityNotFound);
        assert_eq!(err.message(), "An identity for the user appUser does not exist in the wallet.");
    }

    #[test]
    fn invalid_label_is_identity_not_found() {
        let err: LedgerError = WalletError::invalid_label("../etc", "path traversal").into();
        assert_eq!(err.kind(), ErrorKind::IdentityNotFound);
    }

    #[test]
    fn other_wallet_failures_are_upstream() {
        let io = std::io::Error::other("disk");
        let err: LedgerError = WalletError::io("read failed", io).into();
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
    }

    fn any_code() -> impl Strategy<Value = Code> {
        (0i32..=16).prop_map(Code::from_i32)
    }

    fn any_gateway_error() -> impl Strategy<Value = GatewayError> {
        prop_oneof![
            (".*", ".*").prop_map(|(endpoint, message)| GatewayError::Connection { endpoint, message }),
            (any::<i32>(), ".*").prop_map(|(status, message)| GatewayError::Chaincode { status, message }),
            (".*", ".*").prop_map(|(tx_id, validation_code)| GatewayError::Commit { tx_id, validation_code }),
            (any_code(), ".*").prop_map(|(code, message)| GatewayError::Rpc { code, message }),
            ".*".prop_map(|message| GatewayError::MalformedResponse { message }),
        ]
    }

    proptest! {
        #[test]
        fn classification_is_total_and_preserves_message(err in any_gateway_error()) {
            let kind = classify(&err);
            let classified = LedgerError::from(err.clone());
            prop_assert_eq!(classified.kind(), kind);
            if let GatewayError::Chaincode { message, .. } = &err {
                prop_assert_eq!(classified.message(), message.as_str());
            }
        }
    }
}
