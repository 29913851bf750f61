//! Queue processor scenarios, driven over in-memory stores with a stub
//! analyzer and a recording notifier.

use std::sync::Arc;

use parcelwatch_model::{
    AnalyzedItem, EmailAnalysis, NotificationConfig, NotificationEvent, OrderStatus, QueueStatus,
};

use crate::analyzer::Analyzer;
use crate::database::ports::modules::ModuleStore;
use crate::modules::{Module, ModuleManifest, ModuleRegistry, NoHooks};
use crate::notifier::NotificationDispatcher;
use crate::orders::DefaultOrderMatcher;
use crate::processing::QueueProcessor;
use crate::tests::fixtures::{MemoryStore, RecordingNotifier, StubAnalyzer};

struct Pipeline {
    store: Arc<MemoryStore>,
    processor: QueueProcessor,
    notifier: Arc<RecordingNotifier>,
}

/// Wire a processor over the shared in-memory store. The analyzer module
/// is registered but only enabled when `analyzer_enabled` is set.
fn pipeline(analyzer: Arc<dyn Analyzer>, analyzer_enabled: bool) -> Pipeline {
    let store = MemoryStore::new();
    let notifier = Arc::new(RecordingNotifier::default());

    let mut registry = ModuleRegistry::new(store.clone() as Arc<dyn ModuleStore>);
    registry.register(
        Module::new(
            ModuleManifest {
                key: "llm",
                name: "LLM Analyzer",
                kind: parcelwatch_model::ModuleKind::Analyzer,
                version: "1.0.0",
                description: "stub analyzer",
                enabled_by_default: false,
            },
            Arc::new(NoHooks),
        )
        .with_analyzer(analyzer),
    );
    registry.register(
        Module::new(
            ModuleManifest {
                key: "webhook",
                name: "Webhook Notifier",
                kind: parcelwatch_model::ModuleKind::Notifier,
                version: "1.0.0",
                description: "recording notifier",
                enabled_by_default: false,
            },
            Arc::new(NoHooks),
        )
        .with_notifier(notifier.clone()),
    );
    let registry = Arc::new(registry);

    if analyzer_enabled {
        store.seed_module_enabled("llm");
    }
    store.seed_module_enabled("webhook");

    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::clone(&registry),
        store.clone(),
        store.clone(),
    ));
    let matcher = Arc::new(DefaultOrderMatcher::new(store.clone()));

    let processor = QueueProcessor::new(
        store.clone(),
        store.clone(),
        matcher,
        registry,
        dispatcher,
    );

    Pipeline {
        store,
        processor,
        notifier,
    }
}

fn subscribe_to_all_events(pipeline: &Pipeline, user_id: parcelwatch_model::UserId) {
    pipeline.store.seed_notification_config(NotificationConfig {
        user_id,
        module_key: "webhook".into(),
        enabled: true,
        events: None,
        config: None,
    });
}

fn order_confirmation_analysis() -> EmailAnalysis {
    EmailAnalysis {
        is_relevant: true,
        order_number: Some("ORD-500".into()),
        vendor_name: Some("Amazon".into()),
        status: Some(OrderStatus::Ordered),
        items: Some(vec![AnalyzedItem {
            name: "Keyboard".into(),
            quantity: 1,
            price: Some(59.99),
        }]),
        ..Default::default()
    }
}

#[tokio::test]
async fn a_new_order_is_created_from_a_confirmation_email() {
    let pipeline = pipeline(
        StubAnalyzer::returning(Some(order_confirmation_analysis())),
        true,
    );
    let user = pipeline.store.seed_user("jordan");
    subscribe_to_all_events(&pipeline, user.id);
    let item = pipeline.store.seed_queue_item(user.id, "<order-500>");

    pipeline.processor.tick().await.unwrap();

    let item = pipeline.store.queue_items()[0].clone();
    assert_eq!(item.status, QueueStatus::Completed);
    assert!(item.extracted_data.is_some());
    assert!(item.updated_at >= item.created_at);

    let orders = pipeline.store.orders();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.order_number.as_deref(), Some("ORD-500"));
    assert_eq!(order.status, OrderStatus::Ordered);
    assert_eq!(item.order_id, Some(order.id));

    let states = pipeline.store.states();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].status, OrderStatus::Ordered);
    assert_eq!(states[0].source_type.as_deref(), Some("email"));

    let deliveries = pipeline.notifier.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].1, NotificationEvent::NewOrder);
}

#[tokio::test]
async fn a_shipment_update_fills_blanks_and_appends_one_state() {
    let analysis = EmailAnalysis {
        is_relevant: true,
        order_number: Some("ORD-600".into()),
        tracking_number: Some("1Z999AA10123456784".into()),
        carrier: Some("UPS".into()),
        status: Some(OrderStatus::Shipped),
        ..Default::default()
    };
    let pipeline = pipeline(StubAnalyzer::returning(Some(analysis)), true);
    let user = pipeline.store.seed_user("jordan");
    subscribe_to_all_events(&pipeline, user.id);
    let existing = pipeline.store.seed_order(user.id, "ORD-600");
    pipeline.store.seed_queue_item(user.id, "<shipped-600>");

    pipeline.processor.tick().await.unwrap();

    let order = pipeline.store.orders()[0].clone();
    assert_eq!(order.id, existing.id);
    assert_eq!(order.tracking_number.as_deref(), Some("1Z999AA10123456784"));
    assert_eq!(order.carrier.as_deref(), Some("UPS"));
    assert_eq!(order.status, OrderStatus::Shipped);

    let states = pipeline.store.states();
    assert_eq!(states.len(), 2);
    assert_eq!(states.last().unwrap().status, OrderStatus::Shipped);

    let deliveries = pipeline.notifier.deliveries.lock().unwrap();
    assert_eq!(deliveries[0].1, NotificationEvent::TrackingUpdate);
}

#[tokio::test]
async fn without_an_available_analyzer_items_stay_queued() {
    let pipeline = pipeline(
        StubAnalyzer::returning(Some(order_confirmation_analysis())),
        false,
    );
    let user = pipeline.store.seed_user("jordan");
    for i in 0..3 {
        pipeline
            .store
            .seed_queue_item(user.id, &format!("<pending-{i}>"));
    }

    for _ in 0..10 {
        pipeline.processor.tick().await.unwrap();
    }

    let items = pipeline.store.queue_items();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|item| item.status == QueueStatus::Queued));
    assert!(pipeline.store.orders().is_empty());
}

#[tokio::test]
async fn irrelevant_analysis_completes_without_writing_an_order() {
    let pipeline = pipeline(StubAnalyzer::returning(None), true);
    let user = pipeline.store.seed_user("jordan");
    pipeline.store.seed_queue_item(user.id, "<newsletter>");

    pipeline.processor.tick().await.unwrap();

    let item = pipeline.store.queue_items()[0].clone();
    assert_eq!(item.status, QueueStatus::Completed);
    assert!(item.order_id.is_none());
    // The raw response is preserved even for irrelevant mail.
    assert_eq!(item.extracted_data.unwrap()["is_relevant"], false);
    assert!(pipeline.store.orders().is_empty());
}

#[tokio::test]
async fn analyzer_transport_failure_marks_the_item_failed() {
    let pipeline = pipeline(StubAnalyzer::failing("backend unreachable"), true);
    let user = pipeline.store.seed_user("jordan");
    pipeline.store.seed_queue_item(user.id, "<doomed>");

    pipeline.processor.tick().await.unwrap();

    let item = pipeline.store.queue_items()[0].clone();
    assert_eq!(item.status, QueueStatus::Failed);
    assert!(
        item.error_message
            .as_deref()
            .unwrap()
            .contains("backend unreachable")
    );
    assert!(item.updated_at >= item.created_at);
}

#[tokio::test]
async fn reapplying_the_same_analysis_is_a_no_op() {
    let pipeline = pipeline(
        StubAnalyzer::returning(Some(order_confirmation_analysis())),
        true,
    );
    let user = pipeline.store.seed_user("jordan");
    pipeline.store.seed_queue_item(user.id, "<first>");
    pipeline.store.seed_queue_item(user.id, "<second>");

    pipeline.processor.tick().await.unwrap();
    let after_first = pipeline.store.orders()[0].clone();

    pipeline.processor.tick().await.unwrap();
    let after_second = pipeline.store.orders()[0].clone();

    assert_eq!(pipeline.store.orders().len(), 1);
    assert_eq!(after_first.status, after_second.status);
    assert_eq!(after_first.tracking_number, after_second.tracking_number);
    // Unchanged status means no second audit entry.
    assert_eq!(pipeline.store.states().len(), 1);
}

#[tokio::test]
async fn delivery_of_an_existing_order_fires_package_delivered() {
    let analysis = EmailAnalysis {
        is_relevant: true,
        order_number: Some("ORD-700".into()),
        status: Some(OrderStatus::Delivered),
        ..Default::default()
    };
    let pipeline = pipeline(StubAnalyzer::returning(Some(analysis)), true);
    let user = pipeline.store.seed_user("jordan");
    subscribe_to_all_events(&pipeline, user.id);
    pipeline.store.seed_order(user.id, "ORD-700");
    pipeline.store.seed_queue_item(user.id, "<delivered-700>");

    pipeline.processor.tick().await.unwrap();

    let deliveries = pipeline.notifier.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].1, NotificationEvent::PackageDelivered);
    assert_eq!(deliveries[0].0, user.id);
}

#[tokio::test]
async fn disabled_notifier_module_suppresses_delivery() {
    let pipeline = pipeline(
        StubAnalyzer::returning(Some(order_confirmation_analysis())),
        true,
    );
    let user = pipeline.store.seed_user("jordan");
    subscribe_to_all_events(&pipeline, user.id);
    pipeline.store.seed_module_disabled("webhook");
    pipeline.store.seed_queue_item(user.id, "<muted>");

    pipeline.processor.tick().await.unwrap();

    // The order is still written; only the fan-out is suppressed.
    assert_eq!(pipeline.store.orders().len(), 1);
    assert!(pipeline.notifier.deliveries.lock().unwrap().is_empty());
}
