//! Every driver, plain and encrypted, answers the storage contract the same way.

mod common;

use common::{MemoryClient, memory_pool};
use satchel_session::*;

async fn check_contract(driver: &mut dyn SessionDriver, save_path: &str) {
    assert!(driver.open(save_path, "SATCHELSESSID").await.unwrap());

    // Unknown and empty ids read as empty content.
    assert!(driver.read("").await.unwrap().is_empty());
    assert!(driver.read("does-not-exist").await.unwrap().is_empty());

    let id = driver.create_id().await.unwrap();
    assert_eq!(id.len(), 127);
    assert!(id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-'));
    assert!(!driver.validate_id(&id).await.unwrap());

    assert!(driver.write(&id, b"{\"a\":\"b\"}").await.unwrap());
    assert_eq!(driver.read(&id).await.unwrap(), b"{\"a\":\"b\"}");
    assert!(driver.validate_id(&id).await.unwrap());
    assert!(!driver.validate_id("kjlfez/fez").await.unwrap());
    assert!(!driver.validate_id(&id[..100]).await.unwrap());

    assert!(driver.update_timestamp(&id, b"{\"a\":\"c\"}").await.unwrap());
    assert_eq!(driver.read(&id).await.unwrap(), b"{\"a\":\"c\"}");

    // Writing under the empty id is allowed and reads back.
    driver.write("", b"").await.unwrap();
    assert!(driver.read("").await.unwrap().is_empty());

    assert!(driver.destroy(&id).await.unwrap());
    assert!(driver.destroy(&id).await.unwrap());
    assert!(driver.read(&id).await.unwrap().is_empty());
    assert!(!driver.validate_id(&id).await.unwrap());

    if driver.kind() != DriverKind::KeyValue {
        driver.write(&id, b"payload").await.unwrap();
        assert!(driver.gc(i64::MAX).await.unwrap());
        assert!(driver.validate_id(&id).await.unwrap());
        assert!(driver.gc(-1000).await.unwrap());
        assert!(!driver.validate_id(&id).await.unwrap());
    } else {
        assert!(driver.gc(-1000).await.unwrap());
    }

    assert!(driver.close().await.unwrap());
}

#[tokio::test]
async fn test_native_contract() {
    check_contract(&mut NativeStore::new(), "").await;
    check_contract(&mut Encrypted::new(NativeStore::new(), "randomKey"), "").await;
}

#[tokio::test]
async fn test_file_contract() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap();
    check_contract(&mut FileStore::new(), path).await;
    check_contract(&mut Encrypted::new(FileStore::new(), "randomKey"), path).await;
    check_contract(&mut FileStore::new().with_prefix("custom_"), path).await;
}

#[tokio::test]
async fn test_database_contract() {
    let pool = memory_pool().await;
    check_contract(&mut DatabaseStore::with_pool(pool.clone()), "").await;

    let mut store = Encrypted::new(DatabaseStore::with_pool(pool), "randomKey");
    store.set_method("aes-192-ofb").unwrap();
    check_contract(&mut store, "").await;
}

#[tokio::test]
async fn test_key_value_contract() {
    let client = MemoryClient::default();
    check_contract(&mut RedisStore::with_client(client.clone()), "").await;
    check_contract(&mut Encrypted::new(RedisStore::with_client(client), "randomKey"), "").await;
}

#[tokio::test]
async fn test_custom_id_length() {
    let mut native = NativeStore::new();
    native.set_length_session_id(32).unwrap();
    assert_eq!(native.create_id().await.unwrap().len(), 32);

    let mut file = FileStore::new();
    file.set_length_session_id(50).unwrap();
    assert_eq!(file.create_id().await.unwrap().len(), 50);

    let mut db = DatabaseStore::with_pool(memory_pool().await);
    db.set_length_session_id(64).unwrap();
    let id = db.create_id().await.unwrap();
    assert_eq!(id.len(), 64);
    db.write(&id, b"x").await.unwrap();
    assert!(db.validate_id(&id).await.unwrap());

    let mut kv = RedisStore::with_client(MemoryClient::default());
    let err = kv.set_length_session_id(31).unwrap_err();
    assert_eq!(err.to_string(), "could not set length session ID below 32");
    assert_eq!(kv.length_session_id(), 127);
}

#[tokio::test]
async fn test_encrypted_backends_hold_no_plaintext() {
    let plaintext = b"{\"credit_card\":\"4111111111111111\"}";
    let contains = |haystack: &[u8]| haystack.windows(16).any(|w| w == b"4111111111111111");

    let dir = tempfile::tempdir().unwrap();
    let mut file = Encrypted::new(FileStore::new(), "randomKey");
    file.open(dir.path().to_str().unwrap(), "n").await.unwrap();
    file.write("abc", plaintext).await.unwrap();
    assert!(!contains(&std::fs::read(dir.path().join("sess_abc")).unwrap()));

    let client = MemoryClient::default();
    let kv = Encrypted::new(RedisStore::with_client(client.clone()), "randomKey");
    kv.write("abc", plaintext).await.unwrap();
    assert!(!contains(&client.raw("abc").unwrap()));

    let pool = memory_pool().await;
    let db = Encrypted::new(DatabaseStore::with_pool(pool.clone()), "randomKey");
    db.write("abc", plaintext).await.unwrap();
    let stored = DatabaseStore::with_pool(pool).record("abc").await.unwrap().unwrap();
    assert!(!contains(&stored.content));
    assert_eq!(db.read("abc").await.unwrap(), plaintext);
}

#[tokio::test]
async fn test_encrypted_round_trip_every_method() {
    let backend = NativeStore::new();
    let methods = Encryption::new().available_methods();
    assert!(!methods.is_empty());

    for method in methods {
        let mut store = Encrypted::new(backend.clone(), "randomKey");
        store.set_method(method).unwrap();
        store.write(method, b"{\"k\":[1,2,3]}").await.unwrap();
        assert_eq!(store.read(method).await.unwrap(), b"{\"k\":[1,2,3]}", "{method}");
    }
}

#[tokio::test]
async fn test_missing_key_fails_reads_and_writes() {
    let store = Encrypted::new(NativeStore::new(), "");
    let err = store.write("abc", b"data").await.unwrap_err();
    assert!(matches!(err, SessionError::Crypto(_)));
    assert!(store.read("abc").await.is_err());
}

#[tokio::test]
async fn test_file_open_on_unwritable_path() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();

    let mut store = FileStore::new();
    let err = store
        .open(blocker.join("sessions").to_str().unwrap(), "n")
        .await
        .unwrap_err();
    assert_eq!(err.storage_op(), Some(StorageOp::Open));
}

// Requires a Redis server: cargo test -- --ignored

#[tokio::test]
#[ignore]
async fn test_redis_contract_live() {
    let mut store = RedisStore::connect("redis://localhost:6379").await.unwrap();
    store.set_lifetime(60);
    check_contract(&mut store, "").await;
}

#[tokio::test]
#[ignore]
async fn test_redis_encrypted_live() {
    let store = RedisStore::connect("redis://localhost:6379").await.unwrap();
    let mut store = Encrypted::new(store, "randomKey");
    check_contract(&mut store, "").await;
}
