use serde_json::json;

use crate::storage::MockTableStore;

use super::*;

async fn cache_with_tables() -> (Arc<MockTableStore>, SchemaCache) {
    let store = Arc::new(MockTableStore::new());
    store.create_table("bookings", &["booking_id"]).await;
    store.create_table("seats", &["flight", "seat"]).await;
    let cache = SchemaCache::new(store.clone());
    (store, cache)
}

#[tokio::test]
async fn test_resolve_key_describes_once() {
    let (store, cache) = cache_with_tables().await;

    let first = cache.resolve_key("seats").await.unwrap();
    let second = cache.resolve_key("seats").await.unwrap();

    assert_eq!(&*first, &["flight".to_string(), "seat".to_string()]);
    assert_eq!(first, second);
    assert_eq!(store.describe_calls(), 1);
}

#[tokio::test]
async fn test_resolve_key_per_collection() {
    let (store, cache) = cache_with_tables().await;

    cache.resolve_key("seats").await.unwrap();
    cache.resolve_key("bookings").await.unwrap();
    cache.resolve_key("bookings").await.unwrap();

    assert_eq!(store.describe_calls(), 2);
}

#[tokio::test]
async fn test_concurrent_first_lookups_share_one_describe() {
    let (store, cache) = cache_with_tables().await;
    let cache = Arc::new(cache);

    let lookups = (0..8).map(|_| {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.resolve_key("bookings").await })
    });
    for result in futures::future::join_all(lookups).await {
        assert!(result.unwrap().is_ok());
    }

    assert_eq!(store.describe_calls(), 1);
}

#[tokio::test]
async fn test_unknown_collection_is_unavailable_and_not_cached() {
    let (store, cache) = cache_with_tables().await;

    let err = cache.resolve_key("ghosts").await.unwrap_err();
    assert_eq!(err.collection, "ghosts");
    assert!(matches!(err.source, StorageError::TableNotFound(_)));
    assert!(cache.cached("ghosts").is_none());

    // Table appears later: the failed lookup was not memoized
    store.create_table("ghosts", &["id"]).await;
    assert!(cache.resolve_key("ghosts").await.is_ok());
    assert_eq!(store.describe_calls(), 2);
}

#[test]
fn test_project_key_keeps_only_key_attributes() {
    let record = match json!({"flight": "SQ1", "seat": "3A", "name": "Ada"}) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };
    let schema = vec!["flight".to_string(), "seat".to_string()];

    let key = project_key(&schema, &record).unwrap();
    assert_eq!(serde_json::Value::Object(key), json!({"flight": "SQ1", "seat": "3A"}));
}

#[test]
fn test_project_key_reports_missing_attribute() {
    let record = match json!({"flight": "SQ1"}) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };
    let schema = vec!["flight".to_string(), "seat".to_string()];

    assert_eq!(project_key(&schema, &record), Err("seat".to_string()));
}
