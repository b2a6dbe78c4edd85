use secret_access::{
    AccessCredential, EventBus, InMemorySecretCache, MockSecretProvider, PollingRefreshPolicy,
    RefreshPolicy, SecretCache, SecretManager, SecretReference, StoreType,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn reference() -> SecretReference {
    SecretReference::new(StoreType::AwsSecretsManager, "db/creds").unwrap()
}

fn credential() -> AccessCredential {
    AccessCredential::cyberark_api_key("key").unwrap()
}

#[test]
fn get_as_string_copies_the_value() {
    let provider = Arc::new(MockSecretProvider::builder().build());
    provider.add_secret("db/creds", "abc");

    let manager = SecretManager::builder()
        .with_provider(provider)
        .with_cache(Arc::new(InMemorySecretCache::new()))
        .build()
        .unwrap();
    manager
        .register("db", reference(), credential(), None)
        .unwrap();

    assert_eq!(manager.get_as_string("db").unwrap(), "abc");

    // The cached copy is untouched by the scoped clearing.
    assert_eq!(manager.get("db").unwrap().value(), b"abc");
    manager.close();
}

#[test]
fn close_stops_background_refreshes() {
    let provider = Arc::new(MockSecretProvider::builder().build());
    provider.add_secret("db/creds", "abc");

    let cache = Arc::new(InMemorySecretCache::new());
    let events = Arc::new(EventBus::new());
    let policy = Arc::new(PollingRefreshPolicy::with_interval(
        Duration::from_millis(20),
        Arc::clone(&events),
    ));

    let manager = SecretManager::builder()
        .with_provider(provider)
        .with_cache(cache.clone())
        .with_event_bus(Arc::clone(&events))
        .with_default_refresh_policy(policy.clone())
        .with_sweep_interval(Duration::from_millis(20))
        .build()
        .unwrap();
    manager
        .register("db", reference(), credential(), None)
        .unwrap();

    // Keep entries perpetually stale so every tick has work to do.
    cache.set_default_ttl(Duration::from_millis(1));
    manager.get("db").unwrap();

    let mut waited = Duration::ZERO;
    while events.history().len() < 4 && waited < Duration::from_secs(2) {
        thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }
    assert!(events.history().len() >= 4, "background refreshes ran");

    manager.close();
    assert!(!policy.is_running());

    let settled = events.history().len();
    thread::sleep(Duration::from_millis(150));
    assert_eq!(events.history().len(), settled);
}

#[test]
fn close_is_idempotent() {
    let manager = SecretManager::builder()
        .with_cache(Arc::new(InMemorySecretCache::new()))
        .build()
        .unwrap();
    manager.close();
    manager.close();
}

#[test]
fn drop_closes_the_manager() {
    let events = Arc::new(EventBus::new());
    let provider = Arc::new(MockSecretProvider::builder().build());
    provider.add_secret("db/creds", "abc");

    {
        let manager = SecretManager::builder()
            .with_provider(provider)
            .with_cache(Arc::new(InMemorySecretCache::new()))
            .with_event_bus(Arc::clone(&events))
            .with_sweep_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        manager
            .register("db", reference(), credential(), None)
            .unwrap();
        manager.get("db").unwrap();
    }

    let settled = events.history().len();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(events.history().len(), settled);
}
