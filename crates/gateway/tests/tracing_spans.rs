//! Span coverage for the gateway's public async operations.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};

use claimledger_gateway::{
    LedgerGateway, Mode, TransactionRequest,
    testutil::{MockLedger, admin_wallet, test_config, write_test_profiles},
};
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

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
async fn execute_creates_nested_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = tempfile::tempdir().unwrap();
    write_test_profiles(dir.path());
    let ledger = MockLedger::new();
    ledger.register("registration", "QueryAllPolicies", |_, _| Ok(b"[]".to_vec()));
    let gateway =
        LedgerGateway::new(&test_config(dir.path()), Arc::new(admin_wallet()), ledger.connector());

    let request = TransactionRequest::builder()
        .org("org2")
        .identity("Admin@org2.example.com")
        .contract("registration")
        .function("QueryAllPolicies")
        .mode(Mode::Evaluate)
        .build()
        .unwrap();
    gateway.execute(&request).await.unwrap();

    let recorded = spans.lock().expect("lock poisoned");
    for name in ["execute", "retry_evaluate", "acquire", "load", "invoke"] {
        assert!(recorded.iter().any(|s| s == name), "expected a '{name}' span, got: {recorded:?}");
    }
}
