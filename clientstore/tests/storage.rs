//! Integration tests for the ClientStorage facade on the in-memory engine
//!
//! The engine registry is process-wide and tests run in parallel, so every
//! test uses its own namespace and deletes it at the end.

#[macro_use]
extern crate hamcrest;

use clientstore::{storage_schema, ClientStorage, DbError, MemDb, DEFAULT_NAMESPACE};
use futures::future::join_all;
use hamcrest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct President {
    name: String,
    #[serde(rename = "lastName")]
    last_name: String,
    birth: i64,
}

fn president(name: &str, last_name: &str, birth: i64) -> President {
    President {
        name: name.to_string(),
        last_name: last_name.to_string(),
        birth,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Store with the four presidents, written concurrently
async fn presidents(namespace: &str) -> ClientStorage {
    init_tracing();
    let db = ClientStorage::new(Some(namespace));
    let records = [
        ("president1", president("Barack", "Obama", 1961)),
        ("president2", president("John F.", "Kennedy", 1917)),
        ("president3", president("John F.", "Kennedy another", 1917)),
        ("president4", president("Bill", "Clinton", 1946)),
    ];
    // Futures start in insertion order; the engine keeps that order
    let results = join_all(records.iter().map(|(key, value)| db.set(key, value))).await;
    for result in results {
        result.unwrap();
    }
    db
}

#[tokio::test]
async fn test_set_record() {
    init_tracing();
    let db = ClientStorage::new(Some("test-set"));

    let result = db
        .set("president1", &president("Barack", "Obama", 1961))
        .await;
    assert!(result.is_ok());

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_get_and_overwrite() {
    init_tracing();
    let db = ClientStorage::new(Some("test-get"));
    let records = [
        ("president1", president("Barack", "Obama", 1961)),
        ("president2", president("John F.", "Kennedy", 1917)),
        ("president2", president("John F.", "Kennedy another", 1917)),
        ("president3", president("Bill", "Clinton", 1946)),
    ];
    let writes = records.iter().map(|(key, value)| db.set(key, value));
    for result in join_all(writes).await {
        result.unwrap();
    }

    // A second handle on the same namespace sees the same data
    let other = ClientStorage::new(Some("test-get"));
    assert_that!(
        other.get::<President>("president1").await.unwrap(),
        equal_to(Some(president("Barack", "Obama", 1961)))
    );
    assert_that!(
        other.get::<President>("president2").await.unwrap(),
        equal_to(Some(president("John F.", "Kennedy another", 1917)))
    );
    assert_eq!(other.get::<President>("presidentX").await.unwrap(), None);
    assert_eq!(other.size().await.unwrap(), 3);

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_delete_existing_item_changes_size() {
    let db = presidents("test-delete-size").await;

    db.delete("president2").await.unwrap();
    assert_eq!(db.size().await.unwrap(), 3);

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_delete_existing_item_removes_it() {
    let db = presidents("test-delete-item").await;

    db.delete("president3").await.unwrap();
    assert_eq!(db.get::<President>("president3").await.unwrap(), None);
    assert!(!db.has("president3").await.unwrap());

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_delete_missing_item() {
    let db = presidents("test-delete-missing").await;

    db.delete("presidentX").await.unwrap();
    assert_eq!(db.size().await.unwrap(), 4);

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_clear() {
    let db = presidents("test-clear").await;

    db.clear().await.unwrap();
    assert_eq!(db.size().await.unwrap(), 0);
    for key in ["president1", "president2", "president3", "president4"] {
        assert!(!db.has(key).await.unwrap());
    }

    // The namespace survives a clear
    db.set("president5", &president("Joe", "Biden", 1942))
        .await
        .unwrap();
    assert_eq!(db.size().await.unwrap(), 1);

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_each_visits_every_value() {
    let db = presidents("test-each").await;

    let mut years = 0;
    let mut visits = 0;
    db.each(|record: President| {
        years += record.birth;
        visits += 1;
    })
    .await
    .unwrap();

    assert_eq!(years, 7741);
    assert_eq!(visits, 4);

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_some_stops_at_first_match() {
    let db = presidents("test-some").await;

    let mut years = 0;
    let found = db
        .some(|record: &President| {
            years += record.birth;
            record.birth == 1917
        })
        .await
        .unwrap();

    assert_eq!(years, 3878);
    assert_that!(found, equal_to(Some(president("John F.", "Kennedy", 1917))));

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_some_without_match() {
    let db = presidents("test-some-none").await;

    let found = db
        .some(|record: &President| record.birth == 1800)
        .await
        .unwrap();
    assert_eq!(found, None);

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_has() {
    let db = presidents("test-has").await;

    assert!(db.has("president1").await.unwrap());
    assert!(!db.has("presidentX").await.unwrap());

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_contains() {
    let db = presidents("test-contains").await;

    assert!(db
        .contains(&president("Bill", "Clinton", 1946))
        .await
        .unwrap());
    assert!(!db
        .contains(&president("Bill", "Clinton", 1900))
        .await
        .unwrap());
    // Field order is irrelevant, content is not
    assert!(db
        .contains(&json!({"birth": 1946, "lastName": "Clinton", "name": "Bill"}))
        .await
        .unwrap());
    assert!(!db
        .contains(&json!({"name": "Bill", "lastName": "Clinton"}))
        .await
        .unwrap());
    assert!(!db.contains(&json!("president4")).await.unwrap());

    db.delete_storage().await.unwrap();
}

#[derive(Serialize)]
struct FloatBirth {
    name: &'static str,
    #[serde(rename = "lastName")]
    last_name: &'static str,
    birth: f64,
}

#[tokio::test]
async fn test_contains_matches_numbers_by_value() {
    let db = presidents("test-contains-numbers").await;

    let clinton = FloatBirth {
        name: "Bill",
        last_name: "Clinton",
        birth: 1946.0,
    };
    assert_that!(db.contains(&clinton).await.unwrap(), equal_to(true));
    assert!(db
        .contains(&json!({"name": "Bill", "lastName": "Clinton", "birth": 1946.0}))
        .await
        .unwrap());
    assert!(!db
        .contains(&json!({"name": "Bill", "lastName": "Clinton", "birth": 1946.5}))
        .await
        .unwrap());

    db.set("float", &json!({"birth": 1917.0})).await.unwrap();
    assert!(db.contains(&json!({"birth": 1917})).await.unwrap());

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_size() {
    let db = presidents("test-size").await;
    assert_eq!(db.size().await.unwrap(), 4);
    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_overwrite_keeps_size() {
    init_tracing();
    let db = ClientStorage::new(Some("test-overwrite"));

    db.set("k", &json!(1)).await.unwrap();
    db.set("k", &json!({"nested": [1, 2]})).await.unwrap();

    assert_eq!(db.size().await.unwrap(), 1);
    assert_eq!(
        db.get::<Value>("k").await.unwrap(),
        Some(json!({"nested": [1, 2]}))
    );

    db.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    init_tracing();
    let left = ClientStorage::new(Some("test-iso-left"));
    let right = ClientStorage::new(Some("test-iso-right"));

    left.set("k", "left").await.unwrap();

    assert!(left.has("k").await.unwrap());
    assert!(!right.has("k").await.unwrap());
    assert_eq!(right.size().await.unwrap(), 0);

    left.delete_storage().await.unwrap();
    right.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_default_namespace() {
    assert_eq!(ClientStorage::new(None).namespace(), DEFAULT_NAMESPACE);
    assert_eq!(ClientStorage::new(Some("")).namespace(), DEFAULT_NAMESPACE);
}

#[tokio::test]
async fn test_from_database_takes_engine_namespace() {
    init_tracing();
    let engine = MemDb::open("test-from-database", &storage_schema());
    let db = ClientStorage::from_database(engine);
    let other = db.clone();
    assert_eq!(db.namespace(), "test-from-database");

    db.delete_storage().await.unwrap();

    assert_eq!(
        other.size().await,
        Err(DbError::Deleted(other.namespace().to_string()))
    );
}

#[tokio::test]
async fn test_delete_storage_destroys_other_handles() {
    let db = presidents("test-destroy").await;
    let other = db.clone();

    db.delete_storage().await.unwrap();

    let deleted = DbError::Deleted("test-destroy".to_string());
    assert_eq!(other.size().await, Err(deleted.clone()));
    assert_eq!(other.get::<Value>("president1").await, Err(deleted));

    // Opening the namespace again starts from scratch
    let fresh = ClientStorage::new(Some("test-destroy"));
    assert_eq!(fresh.size().await.unwrap(), 0);
    fresh.delete_storage().await.unwrap();
}

#[tokio::test]
async fn test_get_with_wrong_type_fails() {
    init_tracing();
    let db = ClientStorage::new(Some("test-wrong-type"));
    db.set("k", "not a president").await.unwrap();

    let result = db.get::<President>("k").await;
    assert!(matches!(result, Err(DbError::Serialization(_))));

    let result = db.each(|_: President| {}).await;
    assert!(matches!(result, Err(DbError::Serialization(_))));

    db.delete_storage().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_writes_from_tasks() {
    init_tracing();
    let db = ClientStorage::new(Some("test-tasks"));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let db = db.clone();
            tokio::spawn(async move {
                let key = format!("key{}", i % 4);
                db.set(&key, &json!(i)).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Same-key writes race; only the key set is deterministic
    assert_eq!(db.size().await.unwrap(), 4);
    for i in 0..4 {
        assert!(db.has(&format!("key{i}")).await.unwrap());
    }

    db.delete_storage().await.unwrap();
}
