use secret_access::{
    AccessCredential, EventBus, EventKind, InMemorySecretCache, MockSecretProvider, Secret,
    SecretCache, SecretEvent, SecretManager, SecretMetadata, SecretReference, StoreType,
};
use std::sync::Arc;

struct Fixture {
    provider: Arc<MockSecretProvider>,
    cache: Arc<InMemorySecretCache>,
    events: Arc<EventBus>,
    manager: SecretManager,
    active_ref: SecretReference,
}

fn fixture() -> Fixture {
    let provider = Arc::new(MockSecretProvider::builder().build());
    provider.add_secret_with_hint("rot", "active-value", "active");
    provider.add_secret_with_hint("rot", "inactive-value", "inactive");

    let cache = Arc::new(InMemorySecretCache::new());
    let events = Arc::new(EventBus::new());

    let manager = SecretManager::builder()
        .with_provider(provider.clone())
        .with_cache(cache.clone())
        .with_event_bus(Arc::clone(&events))
        .build()
        .unwrap();

    let active_ref = SecretReference::new(StoreType::AwsSecretsManager, "rot")
        .unwrap()
        .with_version_hint("active")
        .unwrap();
    manager
        .register(
            "rot-active",
            active_ref.clone(),
            AccessCredential::cyberark_api_key("key").unwrap(),
            None,
        )
        .unwrap();

    Fixture {
        provider,
        cache,
        events,
        manager,
        active_ref,
    }
}

fn preload_inactive(f: &Fixture) {
    let inactive_ref = f.active_ref.inactive_sibling();
    let metadata = SecretMetadata::new(
        "old-inactive-version",
        StoreType::AwsSecretsManager,
        inactive_ref,
    );
    f.cache
        .put(Secret::new("rot", b"old-inactive".to_vec(), metadata));
}

#[test]
fn rotation_with_cached_sibling_is_detected_in_order() {
    let f = fixture();
    preload_inactive(&f);

    // First refresh establishes the baseline retrieval.
    f.manager.refresh("rot-active").unwrap();

    f.provider.perform_rollover("rot");
    let fresh = f.manager.refresh("rot-active").unwrap();

    let history = f.events.history();
    let tail: Vec<EventKind> = history[history.len() - 2..]
        .iter()
        .map(|event| event.kind())
        .collect();
    assert_eq!(tail, vec![EventKind::RolloverDetected, EventKind::Refreshed]);

    match &history[history.len() - 2] {
        SecretEvent::RolloverDetected(event) => {
            assert_eq!(event.active_reference(), &f.active_ref);
            assert_eq!(event.inactive_reference(), &f.active_ref.inactive_sibling());
            assert_eq!(event.new_active_version(), fresh.metadata().version());
        }
        other => panic!("expected rollover event, got {other:?}"),
    }
    match &history[history.len() - 1] {
        SecretEvent::Refreshed(event) => {
            assert_eq!(event.version(), fresh.metadata().version());
            assert!(event.value_changed());
        }
        other => panic!("expected refreshed event, got {other:?}"),
    }

    f.manager.close();
}

#[test]
fn rotation_without_cached_sibling_stays_silent() {
    let f = fixture();

    f.manager.refresh("rot-active").unwrap();
    f.provider.perform_rollover("rot");
    f.manager.refresh("rot-active").unwrap();

    assert!(
        f.events
            .history()
            .iter()
            .all(|event| event.kind() != EventKind::RolloverDetected)
    );
    f.manager.close();
}

#[test]
fn unrotated_refresh_does_not_report_rollover() {
    let f = fixture();
    preload_inactive(&f);

    f.manager.refresh("rot-active").unwrap();
    f.manager.refresh("rot-active").unwrap();

    assert!(
        f.events
            .history()
            .iter()
            .all(|event| event.kind() != EventKind::RolloverDetected)
    );
    f.manager.close();
}

#[test]
fn detection_does_not_touch_the_sibling_entry() {
    let f = fixture();
    preload_inactive(&f);

    f.manager.refresh("rot-active").unwrap();
    f.provider.perform_rollover("rot");
    f.manager.refresh("rot-active").unwrap();

    let sibling = f
        .cache
        .get(&f.active_ref.inactive_sibling())
        .expect("sibling entry untouched");
    assert_eq!(sibling.value(), b"old-inactive");
    assert_eq!(sibling.metadata().version(), "old-inactive-version");

    f.manager.close();
}
