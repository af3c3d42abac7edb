//! Property and tracing tests for the identity wallet.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};

use claimledger_wallet::{
    FileSystemWallet, IdentityStore, MAX_LABEL_LEN, testutil::test_identity, validate_label,
};
use proptest::prelude::*;
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

proptest! {
    #[test]
    fn labels_with_separators_are_always_rejected(
        prefix in "[A-Za-z0-9@._-]{0,20}",
        suffix in "[A-Za-z0-9@._-]{0,20}",
        sep in prop::sample::select(vec!['/', '\\', '\0']),
    ) {
        let label = format!("{prefix}{sep}{suffix}");
        prop_assert!(validate_label(&label).is_err());
    }

    #[test]
    fn simple_labels_are_accepted(label in "[A-Za-z0-9@_-][A-Za-z0-9@_-]{0,60}") {
        prop_assert!(validate_label(&label).is_ok());
    }

    #[test]
    fn label_length_bound_is_enforced(len in 1usize..400) {
        let label = "x".repeat(len);
        prop_assert_eq!(validate_label(&label).is_ok(), len <= MAX_LABEL_LEN);
    }
}

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }
}

#[tokio::test]
async fn wallet_operations_create_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = tempfile::tempdir().unwrap();
    let wallet = FileSystemWallet::open(dir.path()).await.unwrap();
    wallet.put("appUser", &test_identity("appUser", "Org1MSP")).await.unwrap();
    let _ = wallet.get("appUser").await.unwrap();
    let _ = wallet.exists("appUser").await.unwrap();

    let recorded = spans.lock().expect("lock poisoned");
    for name in ["put", "get", "exists"] {
        assert!(recorded.iter().any(|s| s == name), "expected a '{name}' span, got: {recorded:?}");
    }
}
